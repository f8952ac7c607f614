//! Fallgate command line.
//!
//! - `check` validates a gateway config and prints what each breaker resolves to
//! - `fallback` renders the degraded answer for a query and a sources file
//! - `simulate` replays success/failure/timeout steps against one breaker

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use fallgate_core::{GatewayConfig, SourceRecord, TraceId};
use fallgate_runtime::{
    BreakerStatus, CircuitBreakerRegistry, CircuitError, DegradationController, MemoryEventSink,
    TracingEventSink,
};

use crate::cli::{CheckArgs, Cli, Command, FallbackArgs, SimulateArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Check(args) => check(args),
        Command::Fallback(args) => fallback(args),
        Command::Simulate(args) => simulate(args),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let Some(path) = path else {
        tracing::debug!("No config given, using defaults");
        return Ok(GatewayConfig::default());
    };
    tracing::debug!(path = %path.display(), "Loading config file");
    GatewayConfig::from_file(path)
        .with_context(|| format!("failed loading config {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct CheckReport {
    valid: bool,
    default: fallgate_core::CircuitBreakerConfig,
    providers: std::collections::BTreeMap<String, fallgate_core::CircuitBreakerConfig>,
    generative_providers: Vec<String>,
}

fn check(args: CheckArgs) -> Result<()> {
    let config = load_config(Some(&args.config))?;
    print_json(&CheckReport {
        valid: true,
        default: config.default_breaker(),
        providers: config.provider_breakers(),
        generative_providers: config.degradation.generative_providers.clone(),
    })
}

fn fallback(args: FallbackArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    let raw = fs::read_to_string(&args.sources)
        .with_context(|| format!("failed reading sources {}", args.sources.display()))?;
    let sources: Vec<SourceRecord> =
        serde_json::from_str(&raw).context("sources file must be a JSON array of source records")?;

    let events = Arc::new(TracingEventSink);
    let registry = Arc::new(CircuitBreakerRegistry::from_config(&config, events.clone())?);
    let controller = DegradationController::from_config(registry, &config, events)?;

    let trace_id = args
        .trace_id
        .map(TraceId::new)
        .unwrap_or_else(TraceId::generate);

    let response = controller.generate_fallback(&args.query, &sources, None, &trace_id);
    print_json(&response)
}

/// One scripted step.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Success,
    Failure,
    Timeout,
    Wait(Duration),
}

fn parse_steps(outcomes: &[String]) -> Result<Vec<Step>> {
    outcomes
        .iter()
        .flat_map(|o| o.split_whitespace())
        .map(|token| match token {
            "s" | "success" => Ok(Step::Success),
            "f" | "failure" => Ok(Step::Failure),
            "t" | "timeout" => Ok(Step::Timeout),
            wait if wait.starts_with('+') => humantime::parse_duration(&wait[1..])
                .map(Step::Wait)
                .with_context(|| format!("invalid wait step '{}'", wait)),
            other => bail!("unknown outcome '{}' (expected s, f, t or +<duration>)", other),
        })
        .collect()
}

#[derive(Serialize)]
struct StepReport {
    step: String,
    result: String,
}

#[derive(Serialize)]
struct SimulationReport {
    steps: Vec<StepReport>,
    events: Vec<&'static str>,
    status: BreakerStatus,
}

fn simulate(args: SimulateArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let steps = parse_steps(&args.outcomes)?;
    tracing::debug!(provider = %args.provider, steps = steps.len(), "Starting simulation");

    // Paused clock: timeouts and waits complete instantly
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .context("failed to start runtime")?;

    let report = runtime.block_on(run_simulation(&config, &args.provider, &steps))?;
    print_json(&report)
}

async fn run_simulation(
    config: &GatewayConfig,
    provider: &str,
    steps: &[Step],
) -> Result<SimulationReport> {
    let events = Arc::new(MemoryEventSink::new());
    let registry = CircuitBreakerRegistry::from_config(config, events.clone())?;
    let breaker = registry.breaker(provider);
    let timeout = breaker.config().timeout;

    let mut reports = Vec::with_capacity(steps.len());
    for step in steps {
        let outcome = match *step {
            Step::Wait(duration) => {
                tokio::time::sleep(duration).await;
                reports.push(StepReport {
                    step: format!("+{}", humantime::format_duration(duration)),
                    result: breaker.state().to_string(),
                });
                continue;
            }
            Step::Success => breaker.call(|| async { Ok::<_, CircuitError>(()) }).await,
            Step::Failure => {
                breaker
                    .call(|| async { Err::<(), _>(anyhow::anyhow!("simulated failure")) })
                    .await
            }
            Step::Timeout => {
                breaker
                    .call(|| async move {
                        tokio::time::sleep(timeout * 2).await;
                        Ok::<_, CircuitError>(())
                    })
                    .await
            }
        };

        reports.push(StepReport {
            step: format!("{:?}", step).to_lowercase(),
            result: match outcome {
                Ok(()) => format!("ok ({})", breaker.state()),
                Err(e) => format!("{} ({})", e.kind(), breaker.state()),
            },
        });
    }

    Ok(SimulationReport {
        steps: reports,
        events: events.names(),
        status: breaker.status(),
    })
}
