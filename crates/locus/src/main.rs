mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use locus_engine::config::{ConfigLoader, LocusConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "locus", version, about = "UI hierarchy element matching and strategy resolution")]
struct Args {
    /// Config file (defaults to ./locus.yaml, then ~/.locus/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score strategies for a node and print the criteria that would be applied
    Analyze {
        /// Hierarchy dump (uiautomator XML)
        dump: PathBuf,
        /// XPath selecting the node; the first match is analyzed
        #[arg(long)]
        node: String,
        /// Apply the best strategy, or keep --strategy and only advise.
        /// Defaults to `scoring.mode` from the config
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Strategy kept in static mode
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Normalize raw criteria JSON and validate the result
    Normalize {
        /// Raw criteria file; reads stdin when omitted
        input: Option<PathBuf>,
    },
    /// Resolve criteria against a dump through the fallback chain
    Resolve {
        dump: PathBuf,
        /// Criteria JSON file
        #[arg(long)]
        criteria: PathBuf,
        /// Fallback plan JSON (array of entries); the standard chain otherwise
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = SelectArg::First)]
        select: SelectArg,
        /// Seed for --select random
        #[arg(long)]
        seed: Option<u64>,
        /// Per-entry budget for the generated plan
        #[arg(long)]
        budget_ms: Option<u64>,
        /// Simulated device round-trip per confirmation
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
    },
    /// Find zero-area elements mentioning a text and their clickable stand-ins
    Hidden {
        dump: PathBuf,
        #[arg(long)]
        text: String,
    },
    /// Evaluate an XPath expression and build the direct-execution request
    Xpath {
        dump: PathBuf,
        expr: String,
        #[arg(long, default_value = "")]
        step_name: String,
        #[arg(long, default_value = "")]
        step_type: String,
        #[arg(long, default_value = "emulator-5554")]
        device: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Intelligent,
    Static,
}

#[derive(Clone, Copy, ValueEnum)]
enum SelectArg {
    First,
    Last,
    Random,
    All,
    Auto,
}

async fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LocusConfig> {
    let config = match path {
        Some(p) => ConfigLoader::load_from(p).await?,
        None => ConfigLoader::load_default().await?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries JSON results.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref()).await?;

    match args.command {
        Command::Analyze {
            dump,
            node,
            mode,
            strategy,
        } => {
            let mode = mode.map_or(config.scoring.mode, Into::into);
            commands::analyze(&config, &dump, &node, mode, strategy.as_deref()).await
        }
        Command::Normalize { input } => commands::normalize(input.as_deref()).await,
        Command::Resolve {
            dump,
            criteria,
            plan,
            select,
            seed,
            budget_ms,
            latency_ms,
        } => {
            let options = commands::ResolveOptions {
                plan,
                mode: select.into_mode(&config, seed),
                budget_ms: budget_ms.unwrap_or(config.fallback.default_time_budget_ms),
                latency_ms,
            };
            commands::resolve(&config, &dump, &criteria, options).await
        }
        Command::Hidden { dump, text } => commands::hidden(&config, &dump, &text).await,
        Command::Xpath {
            dump,
            expr,
            step_name,
            step_type,
            device,
        } => commands::xpath(&dump, &expr, &step_name, &step_type, &device).await,
    }
}

impl From<ModeArg> for locus_engine::scoring::ScoringMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Intelligent => Self::Intelligent,
            ModeArg::Static => Self::Static,
        }
    }
}

impl SelectArg {
    fn into_mode(self, config: &LocusConfig, seed: Option<u64>) -> locus_engine::selection::SelectionMode {
        use locus_engine::selection::SelectionMode;
        let batch = config.selection.batch.clone();
        match self {
            SelectArg::First => SelectionMode::First,
            SelectArg::Last => SelectionMode::Last,
            SelectArg::Random => SelectionMode::Random { seed },
            SelectArg::All => SelectionMode::All { batch },
            SelectArg::Auto => SelectionMode::Auto { batch },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_engine::scoring::ScoringMode;

    #[test]
    fn test_resolve_args() {
        let args = Args::try_parse_from([
            "locus",
            "resolve",
            "dump.xml",
            "--criteria",
            "c.json",
            "--select",
            "random",
            "--seed",
            "7",
        ])
        .unwrap();
        let Command::Resolve { select, seed, budget_ms, .. } = args.command else {
            panic!("expected resolve");
        };
        assert!(matches!(
            select.into_mode(&LocusConfig::default(), seed),
            locus_engine::selection::SelectionMode::Random { seed: Some(7) }
        ));
        assert_eq!(budget_ms, None);
    }

    #[test]
    fn test_analyze_mode_falls_back_to_config() {
        let args = Args::try_parse_from(["locus", "analyze", "d.xml", "--node", "//node"]).unwrap();
        let Command::Analyze { mode, .. } = args.command else {
            panic!("expected analyze");
        };
        assert!(mode.is_none());

        let mut config = LocusConfig::default();
        config.scoring.mode = ScoringMode::Static;
        assert_eq!(mode.map_or(config.scoring.mode, Into::into), ScoringMode::Static);

        let args = Args::try_parse_from(["locus", "analyze", "d.xml", "--node", "//node", "--mode", "intelligent"]).unwrap();
        let Command::Analyze { mode, .. } = args.command else {
            panic!("expected analyze");
        };
        assert_eq!(mode.map_or(config.scoring.mode, Into::into), ScoringMode::Intelligent);
    }

    #[test]
    fn test_analyze_requires_node() {
        assert!(Args::try_parse_from(["locus", "analyze", "dump.xml"]).is_err());
        let args = Args::try_parse_from(["locus", "--config", "x.yaml", "analyze", "d.xml", "--node", "//node"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("x.yaml")));
    }
}
