//! Pacing for `all`-mode iteration over many targets.

use locus_common::NodeId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// When the snapshot is re-dumped between batch items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    #[default]
    Never,
    /// After an item reported that it changed the screen.
    OnMutation,
    /// Before every k-th item.
    EveryK(usize),
    Always,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Upper bound of the random delay added to each interval.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// Items executed before a cooldown is required. Zero means no cap.
    #[serde(default = "default_max_per_session")]
    pub max_per_session: usize,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            jitter_ms: default_jitter_ms(),
            max_per_session: default_max_per_session(),
            cooldown_ms: default_cooldown_ms(),
            continue_on_error: default_continue_on_error(),
            refresh_policy: RefreshPolicy::default(),
        }
    }
}

fn default_interval_ms() -> u64 {
    1500
}

fn default_jitter_ms() -> u64 {
    500
}

fn default_max_per_session() -> usize {
    10
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_continue_on_error() -> bool {
    true
}

const SAFE_MIN_INTERVAL_MS: u64 = 1000;
const SAFE_MIN_JITTER_MS: u64 = 200;
const SAFE_MAX_PER_SESSION: usize = 10;

impl BatchConfig {
    /// Same config with guard rails for a batch nobody explicitly asked for:
    /// a minimum pace, a session cap, and a refresh after mutations.
    pub fn batch_safe(&self) -> Self {
        let max_per_session = match self.max_per_session {
            0 => SAFE_MAX_PER_SESSION,
            n => n.min(SAFE_MAX_PER_SESSION),
        };
        let refresh_policy = match self.refresh_policy {
            RefreshPolicy::Never => RefreshPolicy::OnMutation,
            other => other,
        };
        Self {
            interval_ms: self.interval_ms.max(SAFE_MIN_INTERVAL_MS),
            jitter_ms: self.jitter_ms.max(SAFE_MIN_JITTER_MS),
            max_per_session,
            cooldown_ms: self.cooldown_ms,
            continue_on_error: true,
            refresh_policy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStep {
    Execute {
        node: NodeId,
        /// Wait before acting; zero for the first item of a session.
        delay_ms: u64,
        /// Re-dump the snapshot before acting.
        refresh_before: bool,
    },
    /// The session cap was reached; call `start_next_session` after waiting.
    Cooldown { ms: u64 },
    Done,
}

/// Iterator-like driver over batch targets. Timing is reported, not slept.
pub struct BatchSession {
    items: Vec<NodeId>,
    config: BatchConfig,
    next: usize,
    in_session: usize,
    since_refresh: usize,
    mutated: bool,
    stopped: bool,
    rng: StdRng,
}

impl BatchSession {
    pub fn new(items: Vec<NodeId>, config: BatchConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            items,
            config,
            next: 0,
            in_session: 0,
            since_refresh: 0,
            mutated: false,
            stopped: false,
            rng,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn remaining(&self) -> usize {
        if self.stopped {
            0
        } else {
            self.items.len() - self.next
        }
    }

    pub fn next_step(&mut self) -> BatchStep {
        if self.stopped || self.next >= self.items.len() {
            return BatchStep::Done;
        }
        let cap = self.config.max_per_session;
        if cap > 0 && self.in_session >= cap {
            debug!(executed = self.next, cap, "Batch session cap reached");
            return BatchStep::Cooldown {
                ms: self.config.cooldown_ms,
            };
        }

        let delay_ms = if self.in_session == 0 {
            0
        } else {
            self.config.interval_ms + self.rng.gen_range(0..=self.config.jitter_ms)
        };

        let refresh_before = self.next > 0
            && match self.config.refresh_policy {
                RefreshPolicy::Never => false,
                RefreshPolicy::Always => true,
                RefreshPolicy::OnMutation => self.mutated,
                RefreshPolicy::EveryK(k) => k > 0 && self.since_refresh >= k,
            };
        if refresh_before {
            self.since_refresh = 0;
            self.mutated = false;
        }

        let node = self.items[self.next];
        self.next += 1;
        self.in_session += 1;
        self.since_refresh += 1;
        BatchStep::Execute {
            node,
            delay_ms,
            refresh_before,
        }
    }

    /// Report how the last executed item went.
    pub fn record_result(&mut self, ok: bool, mutated_screen: bool) {
        self.mutated |= mutated_screen;
        if !ok && !self.config.continue_on_error {
            info!(at = self.next, "Stopping batch after failure");
            self.stopped = true;
        }
    }

    pub fn start_next_session(&mut self) {
        self.in_session = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<NodeId> {
        (1..=n).map(NodeId).collect()
    }

    #[test]
    fn test_cap_yields_exactly_max_then_cooldown() {
        let config = BatchConfig {
            max_per_session: 10,
            ..BatchConfig::default()
        };
        let mut session = BatchSession::new(items(20), config, Some(7));
        let mut executed = 0;
        loop {
            match session.next_step() {
                BatchStep::Execute { .. } => executed += 1,
                BatchStep::Cooldown { ms } => {
                    assert_eq!(ms, 60_000);
                    break;
                }
                BatchStep::Done => panic!("batch ended before the cap"),
            }
        }
        assert_eq!(executed, 10);
        assert_eq!(session.remaining(), 10);
        assert!(matches!(session.next_step(), BatchStep::Cooldown { .. }));

        session.start_next_session();
        assert!(matches!(
            session.next_step(),
            BatchStep::Execute { node: NodeId(11), delay_ms: 0, .. }
        ));
    }

    #[test]
    fn test_delay_includes_bounded_jitter() {
        let config = BatchConfig {
            interval_ms: 100,
            jitter_ms: 50,
            max_per_session: 0,
            ..BatchConfig::default()
        };
        let mut session = BatchSession::new(items(30), config, Some(1));
        let mut delays = Vec::new();
        while let BatchStep::Execute { delay_ms, .. } = session.next_step() {
            delays.push(delay_ms);
        }
        assert_eq!(delays.len(), 30);
        assert_eq!(delays[0], 0);
        assert!(delays[1..].iter().all(|d| (100..=150).contains(d)));
    }

    #[test]
    fn test_refresh_policies() {
        let run = |policy: RefreshPolicy, mutate_at: Option<usize>| {
            let config = BatchConfig {
                refresh_policy: policy,
                max_per_session: 0,
                ..BatchConfig::default()
            };
            let mut session = BatchSession::new(items(5), config, Some(3));
            let mut refreshes = Vec::new();
            let mut i = 0;
            while let BatchStep::Execute { refresh_before, .. } = session.next_step() {
                refreshes.push(refresh_before);
                session.record_result(true, mutate_at == Some(i));
                i += 1;
            }
            refreshes
        };
        assert_eq!(run(RefreshPolicy::Never, None), vec![false; 5]);
        assert_eq!(run(RefreshPolicy::Always, None), vec![false, true, true, true, true]);
        assert_eq!(run(RefreshPolicy::EveryK(2), None), vec![false, false, true, false, true]);
        assert_eq!(
            run(RefreshPolicy::OnMutation, Some(1)),
            vec![false, false, true, false, false]
        );
    }

    #[test]
    fn test_stop_on_error_when_configured() {
        let config = BatchConfig {
            continue_on_error: false,
            ..BatchConfig::default()
        };
        let mut session = BatchSession::new(items(3), config, Some(0));
        assert!(matches!(session.next_step(), BatchStep::Execute { .. }));
        session.record_result(false, false);
        assert_eq!(session.next_step(), BatchStep::Done);
        assert_eq!(session.remaining(), 0);
    }

    #[test]
    fn test_batch_safe_defaults() {
        let loose = BatchConfig {
            interval_ms: 0,
            jitter_ms: 0,
            max_per_session: 0,
            continue_on_error: false,
            ..BatchConfig::default()
        };
        let safe = loose.batch_safe();
        assert_eq!(safe.max_per_session, 10);
        assert_eq!(safe.interval_ms, 1000);
        assert!(safe.continue_on_error);
        assert_eq!(safe.refresh_policy, RefreshPolicy::OnMutation);
    }
}
