//! `flare` command line: serve the job API or run scenarios directly

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use flare_core::prelude::*;
use flare_core::FullValidationParams;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("flare")
        .version(flare_server::VERSION)
        .about("Flare validation suite: versioned datasets, ephemeral functions, cold-start model")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("serve").about("Serve the HTTP job API").arg(
                Arg::new("port")
                    .long("port")
                    .default_value("8080")
                    .value_parser(value_parser!(u16))
                    .help("Port to listen on"),
            ),
        )
        .subcommand(
            Command::new("run")
                .about("Run one scenario and print its JSON report")
                .arg(
                    Arg::new("test")
                        .required(true)
                        .help("massive_query, cold_start_validation, fireworks_storm, immutability_versioning or full_validation"),
                )
                .arg(
                    Arg::new("params")
                        .long("params")
                        .help("Scenario parameters as a JSON object"),
                )
                .arg(
                    Arg::new("text")
                        .long("text")
                        .action(ArgAction::SetTrue)
                        .help("Print a text report instead of JSON"),
                ),
        )
        .subcommand(
            Command::new("full")
                .about("Run all four scenarios in sequence")
                .arg(
                    Arg::new("text")
                        .long("text")
                        .action(ArgAction::SetTrue)
                        .help("Print a text report instead of JSON"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}

/// Token cancelled on the first Ctrl+C
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("cancelling run");
        token.cancel();
    });
    cancel
}

fn print_result(result: &ScenarioResult, text: bool) -> anyhow::Result<()> {
    if text {
        println!("{}", result.generate_text());
    } else {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}

async fn run_scenario(config: FlareConfig, args: &ArgMatches) -> anyhow::Result<bool> {
    let name = args
        .get_one::<String>("test")
        .context("missing test name")?;
    let kind: TestKind = name.parse()?;
    let body = match args.get_one::<String>("params") {
        Some(raw) => serde_json::from_str(raw).context("--params is not valid JSON")?,
        None => serde_json::Value::Null,
    };
    let params = TestParams::parse(kind, body)?;

    let orchestrator = ValidationOrchestrator::new(config)?;
    let result = orchestrator.run(params, &cancel_on_ctrl_c()).await?;
    print_result(&result, args.get_flag("text"))?;
    Ok(result.passed())
}

async fn run_full(config: FlareConfig, args: &ArgMatches) -> anyhow::Result<bool> {
    let orchestrator = ValidationOrchestrator::new(config)?;
    let full = orchestrator
        .full_validation(&FullValidationParams::default(), &cancel_on_ctrl_c())
        .await;
    let result = ScenarioResult::FullValidation(full);
    print_result(&result, args.get_flag("text"))?;
    Ok(result.passed())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let config_path = matches.get_one::<PathBuf>("config");
    let config = FlareConfig::load(config_path.map(PathBuf::as_path))
        .context("failed to load configuration")?;

    match matches.subcommand() {
        Some(("serve", args)) => {
            let port = args.get_one::<u16>("port").copied().unwrap_or(8080);
            let orchestrator = Arc::new(ValidationOrchestrator::new(config)?);
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            flare_server::serve(orchestrator, addr, shutdown_signal())
                .await
                .with_context(|| format!("server on {addr} failed"))?;
        }
        Some(("run", args)) => {
            let passed = run_scenario(config, args).await?;
            std::process::exit(if passed { 0 } else { 1 });
        }
        Some(("full", args)) => {
            let passed = run_full(config, args).await?;
            std::process::exit(if passed { 0 } else { 1 });
        }
        _ => {
            cli().print_help()?;
        }
    }
    Ok(())
}
