//! showgraph-runner - tick a show graph locally.
//!
//! ```text
//! showgraph-runner --config runner.toml run
//! showgraph-runner run shows/opening.json --tick-hz 60 --max-ticks 600
//! echo "finish intro_clip" | showgraph-runner run shows/opening.json
//! showgraph-runner validate shows/opening.json
//! showgraph-runner pack shows/opening.json > opening.packed
//! showgraph-runner catalog
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use showgraph_core::{FinishPulses, NodeRegistry};
use showgraph_runner::{
    load_show_file, pack_show, spawn_media_reader, LoopSettings, RunnerConfig, ShowDocument,
    ShowRunner,
};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "showgraph-runner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run, check and pack show graphs")]
#[command(propagate_version = true)]
struct Cli {
    /// Runner config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tick a show at a fixed rate
    Run {
        /// Show file; overrides `show` from the config
        show: Option<PathBuf>,
        #[arg(long)]
        tick_hz: Option<f64>,
        #[arg(long)]
        max_ticks: Option<u64>,
        #[arg(long)]
        log_every: Option<u64>,
        /// Don't read media finish reports from stdin
        #[arg(long)]
        no_stdin: bool,
    },
    /// Report structural problems without running
    Validate { show: PathBuf },
    /// Print a show as base64(gzip(JSON))
    Pack { show: PathBuf },
    /// Print the built-in node catalog as JSON
    Catalog,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RunnerConfig::default(),
    };

    // Logs go to stderr; stdout carries tick records and command output.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match cli.command {
        Commands::Run {
            show,
            tick_hz,
            max_ticks,
            log_every,
            no_stdin,
        } => {
            if show.is_some() {
                config.show = show;
            }
            if let Some(tick_hz) = tick_hz {
                config.tick_hz = tick_hz;
            }
            if max_ticks.is_some() {
                config.max_ticks = max_ticks;
            }
            if let Some(log_every) = log_every {
                config.log_every = log_every;
            }
            if no_stdin {
                config.stdin_media_reports = false;
            }
            config.validate()?;
            run(&config)
        }
        Commands::Validate { show } => validate(&show),
        Commands::Pack { show } => {
            let loaded = load_show_file(&show)?;
            let document = ShowDocument {
                v: loaded.version,
                graph: loaded.graph,
                groups: loaded
                    .groups
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<Result<_, _>>()?,
            };
            println!("{}", pack_show(&document)?);
            Ok(())
        }
        Commands::Catalog => {
            let catalog = NodeRegistry::with_builtins().catalog();
            println!("{}", serde_json::to_string_pretty(&catalog)?);
            Ok(())
        }
    }
}

fn run(config: &RunnerConfig) -> Result<()> {
    let Some(path) = &config.show else {
        bail!("no show given; pass a show path or set `show` in the config");
    };
    let show = load_show_file(path).with_context(|| format!("loading show {}", path.display()))?;

    let registry = Arc::new(RwLock::new(NodeRegistry::with_builtins()));
    let pulses = Arc::new(FinishPulses::with_system_clock());

    if config.stdin_media_reports {
        // Detached: the reader ends with stdin, the loop does not wait for it.
        spawn_media_reader(BufReader::new(io::stdin()), Arc::clone(&pulses));
    }

    let settings = LoopSettings {
        tick_hz: config.tick_hz,
        max_ticks: config.max_ticks,
        log_every: config.log_every,
    };
    let mut runner = ShowRunner::new(show, registry, pulses);
    let stop = AtomicBool::new(false);
    let summary = runner.run(&settings, &mut io::stdout().lock(), &stop)?;

    tracing::info!(
        ticks = summary.ticks,
        dispatches = summary.dispatches,
        logged = summary.logged,
        "run complete"
    );
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let show = load_show_file(path).with_context(|| format!("loading show {}", path.display()))?;
    let errors = show.graph.validate(&NodeRegistry::with_builtins());

    for issue in &show.group_issues {
        println!("group: {}", issue);
    }
    for error in &errors {
        println!("graph: {}", error);
    }

    if errors.is_empty() {
        println!(
            "ok: {} nodes, {} connections, {} groups",
            show.graph.nodes.len(),
            show.graph.connections.len(),
            show.groups.len()
        );
        Ok(())
    } else {
        bail!("{} structural error(s)", errors.len())
    }
}
