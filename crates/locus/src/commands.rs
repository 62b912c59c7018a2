use anyhow::{Context, Result, anyhow, bail};
use locus_common::dump::parse_dump;
use locus_common::formatter::{format_attempts, format_error, format_node, remedy_hints};
use locus_common::{FieldMatchMode, MatchCriteria, Strategy, UiTree};
use locus_engine::backend::SnapshotBackend;
use locus_engine::config::LocusConfig;
use locus_engine::hidden_parent;
use locus_engine::normalizer::{self, RawCriteria};
use locus_engine::resolution::{FallbackExecutor, FallbackPlan, LocalStrategyRunner, PlanEntry};
use locus_engine::scoring::{ScoringMode, StrategyScorer, id_stability};
use locus_engine::selection::{Selection, SelectionMode};
use locus_engine::xpath;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ResolveOptions {
    pub plan: Option<PathBuf>,
    pub mode: SelectionMode,
    pub budget_ms: u64,
    pub latency_ms: u64,
}

async fn load_tree(path: &Path) -> Result<UiTree> {
    let xml = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading dump {}", path.display()))?;
    let tree = parse_dump(&xml).with_context(|| format!("parsing dump {}", path.display()))?;
    info!(nodes = tree.len(), "Loaded hierarchy dump");
    Ok(tree)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn analyze(
    config: &LocusConfig,
    dump: &Path,
    node_expr: &str,
    mode: ScoringMode,
    strategy: Option<&str>,
) -> Result<()> {
    let tree = load_tree(dump).await?;
    let id = *xpath::evaluate(&tree, node_expr)?
        .first()
        .ok_or_else(|| anyhow!("'{}' matched no node", node_expr))?;
    let explicit = strategy.map(str::parse::<Strategy>).transpose()?;

    let applied = StrategyScorer::from_config(&config.scoring).apply(&tree, id, mode, explicit);
    let generated_id = id_stability::assess(tree.node(id).resource_id()).looks_generated();

    print_json(&json!({
        "node": format_node(&tree, id),
        "recommendations": applied.recommendations,
        "fellBack": applied.choice.map(|c| c.fell_back),
        "criteria": applied.criteria.to_json(),
        "hints": remedy_hints(&applied.criteria, generated_id),
    }))
}

pub async fn normalize(input: Option<&Path>) -> Result<()> {
    let raw = match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    let raw: RawCriteria = serde_json::from_str(&raw).context("parsing raw criteria")?;
    let criteria = normalizer::normalize(raw);

    let valid = match normalizer::validate(&criteria) {
        Ok(()) => true,
        Err(e) => {
            warn!("{}", e);
            false
        }
    };
    print_json(&json!({ "criteria": criteria.to_json(), "valid": valid }))
}

async fn load_plan(path: Option<&Path>, criteria: &MatchCriteria, budget_ms: u64) -> Result<FallbackPlan> {
    let Some(path) = path else {
        return Ok(FallbackPlan::starting_with(criteria.strategy, budget_ms));
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading plan {}", path.display()))?;
    let entries: Vec<PlanEntry> = serde_json::from_str(&raw).context("parsing plan")?;
    Ok(FallbackPlan::new(entries)?)
}

pub async fn resolve(config: &LocusConfig, dump: &Path, criteria_path: &Path, options: ResolveOptions) -> Result<()> {
    let tree = load_tree(dump).await?;
    let raw = tokio::fs::read_to_string(criteria_path)
        .await
        .with_context(|| format!("reading criteria {}", criteria_path.display()))?;
    let criteria = normalizer::normalize(serde_json::from_str::<RawCriteria>(&raw).context("parsing criteria")?);
    let plan = load_plan(options.plan.as_deref(), &criteria, options.budget_ms).await?;

    let backend = SnapshotBackend::new(tree.clone()).with_latency(Duration::from_millis(options.latency_ms));
    let runner = LocalStrategyRunner::new(config.hidden_parent.clone()).with_backend(Box::new(backend));
    let mut executor = FallbackExecutor::from_config(runner, config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match executor.execute(&plan, &criteria, &tree, &options.mode, &cancel).await {
        Ok(outcome) => {
            println!("Resolved by '{}' ({}), confidence {:.2}", outcome.entry_id, outcome.strategy, outcome.confidence);
            if outcome.semantic_retry {
                println!("(found on the semantic-only retry)");
            }
            match &outcome.selection {
                Selection::Single { node, degraded, .. } => {
                    let suffix = if *degraded { " [degraded]" } else { "" };
                    println!("  {}{}", format_node(&tree, *node), suffix);
                }
                Selection::Batch { nodes, batch } => {
                    println!(
                        "  {} targets, up to {} per session, {}ms apart",
                        nodes.len(),
                        batch.max_per_session,
                        batch.interval_ms
                    );
                    for node in nodes {
                        println!("  {}", format_node(&tree, *node));
                    }
                }
            }
            print!("{}", format_attempts(&outcome.attempts));
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format_error(&e));
            bail!("resolution failed: {}", e.kind())
        }
    }
}

pub async fn hidden(config: &LocusConfig, dump: &Path, text: &str) -> Result<()> {
    let tree = load_tree(dump).await?;
    let mut found = 0;
    for id in tree.elements().filter(|id| hidden_parent::detect(tree.node(*id))) {
        let Some(parent) = hidden_parent::find_in_tree(&tree, id, text, &config.hidden_parent) else {
            continue;
        };
        found += 1;
        println!("{}", format_node(&tree, id));
        println!(
            "  -> {} (confidence {:.2}, {:?})",
            format_node(&tree, parent.node),
            parent.confidence,
            parent.level
        );
    }
    if found == 0 {
        bail!("no hidden element mentioning '{}' has a clickable stand-in", text);
    }
    Ok(())
}

pub async fn xpath(dump: &Path, expr: &str, step_name: &str, step_type: &str, device: &str) -> Result<()> {
    let tree = load_tree(dump).await?;
    let request = xpath::build_request(device, expr, step_name, step_type)?;
    let hits = xpath::evaluate(&tree, expr)?;

    for id in &hits {
        println!("{}", format_node(&tree, *id));
    }
    // Mirrors what the direct-execution boundary would receive.
    let criteria = MatchCriteria {
        fields: vec!["xpath".to_string()],
        values: [("xpath".to_string(), expr.to_string())].into(),
        match_mode: [("xpath".to_string(), FieldMatchMode::Equals)].into(),
        ..MatchCriteria::new(Strategy::XpathDirect)
    };
    print_json(&json!({ "request": request, "criteria": criteria.to_json(), "total": hits.len() }))
}
