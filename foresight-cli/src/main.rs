//! Foresight CLI - Drive the speculation engine against demo actions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use foresight_core::prelude::*;
use futures::StreamExt;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "foresight")]
#[command(about = "Speculative action execution harness", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan of file copies over an in-memory filesystem
    Plan {
        /// Number of copy steps
        #[arg(short, long, default_value_t = 3)]
        steps: usize,

        /// Insert a step that reports failure at this index
        #[arg(long)]
        fail_at: Option<usize>,

        /// Insert a one-shot step at this index
        #[arg(long)]
        one_shot_at: Option<usize>,
    },
    /// Stream speculative output while a slow check runs
    Stream {
        /// The check succeeds only when x == 1
        #[arg(short, long, default_value_t = 1)]
        x: i64,

        /// How long the check takes
        #[arg(long, default_value_t = 500, env = "FORESIGHT_ACTION_DELAY_MS")]
        delay_ms: u64,

        /// Delay between output fragments
        #[arg(long, default_value_t = 20)]
        fragment_delay_ms: u64,
    },
    /// Version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ForesightConfig::load().context("loading configuration")?;

    match cli.command {
        Commands::Version => {
            println!("foresight {}", env!("CARGO_PKG_VERSION"));
            println!("foresight-core {}", foresight_core::VERSION);
        }
        Commands::Plan {
            steps,
            fail_at,
            one_shot_at,
        } => run_plan(&config, steps, fail_at, one_shot_at).await?,
        Commands::Stream {
            x,
            delay_ms,
            fragment_delay_ms,
        } => run_stream(&config, x, delay_ms, fragment_delay_ms).await?,
    }

    Ok(())
}

async fn run_plan(
    config: &ForesightConfig,
    steps: usize,
    fail_at: Option<usize>,
    one_shot_at: Option<usize>,
) -> Result<()> {
    let fs = MemFs::with_files([("/src.txt", "payload")]);
    let copy = Arc::new(CopyAction::new(fs.clone()));

    let mut plan = Plan::new();
    for index in 0..steps {
        if fail_at == Some(index) {
            plan.push(Arc::new(StubAction::new("verify").failing()), json!({}));
        } else if one_shot_at == Some(index) {
            let notify = StubAction::new("notify").with_reversibility(Reversibility::OneShot);
            plan.push(Arc::new(notify), json!({}));
        } else {
            plan.push(
                copy.clone(),
                json!({"from": "/src.txt", "to": format!("/out/{}.txt", index)}),
            );
        }
    }

    let report = PlanExecutor::new(config.plan.clone())
        .run_plan(&plan)
        .await
        .context("running plan")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("{}", serde_json::to_string_pretty(&fs.snapshot().await)?);
    Ok(())
}

async fn run_stream(
    config: &ForesightConfig,
    x: i64,
    delay_ms: u64,
    fragment_delay_ms: u64,
) -> Result<()> {
    let action = StubAction::new("slow_is_equal_to_one")
        .with_reversibility(Reversibility::OneShot)
        .with_delay(Duration::from_millis(delay_ms));
    action.set_failing(x != 1);

    let producer = TemplateProducer::new("answer to x == 1: {result}")
        .with_fragment_delay(Duration::from_millis(fragment_delay_ms));

    let runner = ActionRunner::new(config.runner.clone());
    let mut stream = runner.run_speculative(Arc::new(producer), Arc::new(action), json!({"x": x}));

    let marker = config.runner.correction_marker.as_str();
    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment.context("speculative run failed")?;
        write!(stdout, "{}", fragment.render(marker))?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
