//! appstack - preview or deploy the App Service stack against the in-memory engine.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use appstack_core::app::{Deployment, app_service_stack, preview};
use appstack_core::config::StackConfig;
use appstack_core::impls::InMemoryEngine;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "appstack")]
#[command(about = "Compose and deploy the App Service topology")]
#[command(version)]
struct Cli {
    /// Configuration value as `key=value` (camelCase keys, e.g. `sqlPassword=...`).
    /// Overrides APPSTACK_* environment variables.
    #[arg(long = "config", short = 'c', value_parser = parse_pair, global = true)]
    config: Vec<(String, String)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the declared resources with unknown values and secrets masked
    Preview,

    /// Run the deployment and print the exports
    Up {
        /// Make the engine reject this resource (logical name). Repeatable.
        #[arg(long = "fail")]
        fail: Vec<String>,

        /// Print the full step report instead of just the exports
        #[arg(long)]
        report: bool,
    },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let overrides: BTreeMap<String, String> = cli.config.into_iter().collect();
    let config = StackConfig::load(&overrides).context("failed to load stack configuration")?;
    let app = app_service_stack(&config);

    match cli.command {
        Command::Preview => {
            let plan = preview(&app.stack).context("failed to render preview")?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Up { fail, report } => {
            let mut engine = InMemoryEngine::new();
            for name in fail {
                warn!(resource = %name, "injecting engine failure");
                engine = engine.with_failure(name, "injected failure");
            }

            let mut deployment = Deployment::new(app.stack, engine);
            let outcome = deployment.run().await.context("deployment could not complete")?;

            if report {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&outcome.exports)?);
            }

            if !outcome.is_success() {
                let failed: Vec<String> = outcome
                    .failed_exports
                    .iter()
                    .map(|(name, failure)| format!("{name}: {failure}"))
                    .collect();
                bail!(
                    "deployment failed ({} failed, {} skipped); {}",
                    outcome.failed(),
                    outcome.skipped(),
                    if failed.is_empty() { "no exports affected".to_string() } else { failed.join("; ") }
                );
            }
            info!(exports = outcome.exports.len(), "deployment succeeded");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_on_first_equals() {
        assert_eq!(
            parse_pair("sqlPassword=a=b").unwrap(),
            ("sqlPassword".to_string(), "a=b".to_string())
        );
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn up_accepts_repeated_failures() {
        let cli = Cli::try_parse_from([
            "appstack",
            "--config",
            "sqlPassword=x",
            "up",
            "--fail",
            "appservice-sql",
            "--fail",
            "appservice-ai",
        ])
        .unwrap();

        assert_eq!(cli.config, vec![("sqlPassword".to_string(), "x".to_string())]);
        match cli.command {
            Command::Up { fail, report } => {
                assert_eq!(fail, vec!["appservice-sql", "appservice-ai"]);
                assert!(!report);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
