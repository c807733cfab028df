use anyhow::{bail, Context, Result};
use capflow_app::{bootstrap, cli, logging};
use capflow_core::{ChannelEventSink, RunStatus};
use capflow_runtime::{RunService, StartRunRequest};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    logging::init();

    match cli.command {
        cli::Commands::Run {
            workspace,
            config,
            yes,
            documents,
            session,
            request,
        } => {
            let config = bootstrap::load_config(config.as_deref())?;
            let (sink, mut rx) = ChannelEventSink::new();
            let service = RunService::new(
                &config,
                bootstrap::collaborators(&config, yes, Arc::new(sink)),
            );

            let printer = tokio::spawn(async move {
                while let Some(envelope) = rx.recv().await {
                    match serde_json::to_string(&envelope) {
                        Ok(line) => println!("{}", line),
                        Err(e) => tracing::warn!(error = %e, "Could not encode event"),
                    }
                }
            });

            let run_id = format!("cli-{}", std::process::id());
            let interrupt = {
                let service = service.clone();
                let run_id = run_id.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        eprintln!("Cancelling...");
                        service.cancel(&run_id);
                    }
                })
            };

            let outcome = service
                .execute(StartRunRequest {
                    run_id,
                    session_id: session,
                    input: request,
                    selected_document_ids: documents,
                    workspace,
                })
                .await
                .context("Run was rejected")?;

            // Every sender must be gone before the printer can drain and stop.
            interrupt.abort();
            let _ = interrupt.await;
            drop(service);
            let _ = printer.await;

            eprintln!();
            eprintln!("{}", outcome.final_message);
            match outcome.run.status {
                RunStatus::Completed => Ok(()),
                RunStatus::Cancelled => bail!("Run cancelled"),
                _ => bail!("Run failed"),
            }
        }
    }
}
