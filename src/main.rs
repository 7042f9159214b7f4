mod commandline;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use commandline::{Cli, Commands};
use risk_assessor::pipeline::ingest_corpus;
use risk_assessor::{AssessError, Credentials, Pipeline, Settings};

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load_from(&cli.config)?;
    let creds = Credentials::from_env();
    let paths = settings.paths.clone();

    match cli.command.unwrap_or(Commands::Assess {
        transaction: None,
        output: None,
        rebuild: false,
    }) {
        Commands::Assess {
            transaction,
            output,
            rebuild,
        } => {
            let input = transaction.unwrap_or(paths.transaction);
            let output = output.unwrap_or(paths.output);
            let pipeline = Pipeline::from_settings(settings, &creds)?;
            let assessment = pipeline
                .run_file(&input, &output, rebuild)
                .await
                .with_context(|| format!("assessment of {} failed", input.display()))?;
            println!("{}", serde_json::to_string_pretty(&assessment)?);
            info!("🏁 Result written to {}", output.display());
        }
        Commands::Ingest { rebuild } => {
            let stats = ingest_corpus(&settings, &creds, rebuild)
                .await
                .context("ingestion failed")?;
            println!(
                "Indexed {} policy chunks and {} case chunks ({} total).",
                stats.policy_chunks, stats.case_chunks, stats.total_in_index
            );
        }
        Commands::Evaluate {
            dataset,
            report,
            repeat,
        } => {
            let dataset = dataset.unwrap_or(paths.evaluation_dataset);
            let report_path = report.unwrap_or(paths.evaluation_report);
            let pipeline = Pipeline::from_settings(settings, &creds)?;
            let report = pipeline
                .evaluate(&dataset, &report_path, repeat)
                .await
                .context("evaluation failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("Starting risk assessor v{}...", env!("CARGO_PKG_VERSION"));

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            let is_config = e
                .downcast_ref::<AssessError>()
                .or_else(|| e.root_cause().downcast_ref::<AssessError>())
                .is_some_and(AssessError::is_configuration);
            if is_config {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
