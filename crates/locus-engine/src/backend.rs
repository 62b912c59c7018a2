use crate::matcher::find_candidates;
use crate::xpath;
use async_trait::async_trait;
use locus_common::protocol::{DeviceResponse, MatchPreview, XPathRequest};
use locus_common::{MatchCriteria, UiTree};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Device connection failed: {0}")]
    Connection(String),

    #[error("Device call timed out")]
    Timeout,

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Device error: {0}")]
    Other(String),
}

/// The device-command boundary: where resolved criteria are confirmed or
/// executed against a live device.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Check the criteria against the current on-device hierarchy.
    async fn confirm(&mut self, criteria: &MatchCriteria) -> Result<DeviceResponse, BackendError>;

    /// Run an action on the first node matched by an XPath expression.
    async fn execute_xpath(&mut self, _request: &XPathRequest) -> Result<DeviceResponse, BackendError> {
        Err(BackendError::NotSupported("execute_xpath".into()))
    }
}

/// Answers confirmations from a local snapshot instead of a device.
pub struct SnapshotBackend {
    tree: UiTree,
    latency: Option<Duration>,
}

impl SnapshotBackend {
    pub fn new(tree: UiTree) -> Self {
        Self { tree, latency: None }
    }

    /// Simulate a device round-trip of `latency` on every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn tree(&self) -> &UiTree {
        &self.tree
    }

    async fn round_trip(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl DeviceBackend for SnapshotBackend {
    async fn confirm(&mut self, criteria: &MatchCriteria) -> Result<DeviceResponse, BackendError> {
        self.round_trip().await;
        let found = match find_candidates(&self.tree, criteria) {
            Ok(found) => found,
            Err(e) => return Ok(DeviceResponse::failed(e.kind().code(), e.to_string())),
        };
        debug!(strategy = %criteria.strategy, total = found.len(), "Snapshot confirm");

        let Some(first) = found.first().copied() else {
            return Ok(DeviceResponse::failed("NO_MATCH", "no node satisfies the criteria"));
        };
        let node = self.tree.node(first);
        let mut resp = DeviceResponse::ok(format!("matched {} node(s)", found.len()));
        resp.total = Some(found.len());
        resp.matched_index = Some(0);
        resp.preview = Some(MatchPreview {
            xpath: Some(xpath::absolute_xpath(&self.tree, first)),
            bounds: node.bounds_str().map(str::to_string),
        });
        Ok(resp)
    }

    async fn execute_xpath(&mut self, request: &XPathRequest) -> Result<DeviceResponse, BackendError> {
        self.round_trip().await;
        let found = match xpath::evaluate(&self.tree, &request.xpath_expr) {
            Ok(found) => found,
            Err(e) => return Ok(DeviceResponse::failed("INVALID_CRITERIA", e.to_string())),
        };
        let Some(first) = found.first().copied() else {
            return Ok(DeviceResponse::failed("NO_MATCH", "xpath matched nothing"));
        };
        let mut resp = DeviceResponse::ok(format!("{:?} on {}", request.action, request.xpath_expr));
        resp.total = Some(found.len());
        resp.matched_index = Some(0);
        resp.preview = Some(MatchPreview {
            xpath: Some(request.xpath_expr.clone()),
            bounds: self.tree.node(first).bounds_str().map(str::to_string),
        });
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_common::protocol::XPathAction;
    use locus_common::Strategy;

    fn tree() -> UiTree {
        let mut b = UiTree::builder("hierarchy");
        b.node(
            b.root(),
            &[
                ("text", "关注"),
                ("resource-id", "com.demo:id/btn_follow"),
                ("bounds", "[864,2240][1080,2358]"),
            ],
        );
        b.build()
    }

    #[tokio::test]
    async fn test_confirm_reports_preview_bounds_verbatim() {
        let mut backend = SnapshotBackend::new(tree());
        let mut criteria = MatchCriteria::new(Strategy::SelfAnchor);
        criteria.fields.push("text".into());
        criteria.values.insert("text".into(), "关注".into());

        let resp = backend.confirm(&criteria).await.unwrap();
        assert!(resp.ok);
        assert_eq!(resp.total, Some(1));
        assert_eq!(
            resp.preview.and_then(|p| p.bounds).as_deref(),
            Some("[864,2240][1080,2358]")
        );

        criteria.values.insert("text".into(), "取消".into());
        let resp = backend.confirm(&criteria).await.unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.code.as_deref(), Some("NO_MATCH"));
    }

    #[tokio::test]
    async fn test_execute_xpath() {
        let mut backend = SnapshotBackend::new(tree());
        let request = XPathRequest {
            device_id: "emulator-5554".into(),
            xpath_expr: "//node[@text='关注']".into(),
            action: XPathAction::Click,
        };
        assert!(backend.execute_xpath(&request).await.unwrap().ok);

        let bad = XPathRequest {
            xpath_expr: "//node[".into(),
            ..request
        };
        let resp = backend.execute_xpath(&bad).await.unwrap();
        assert_eq!(resp.code.as_deref(), Some("INVALID_CRITERIA"));
    }
}
