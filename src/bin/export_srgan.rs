//! Exports the SRGAN generator and freezes it into a single graph file.

use std::process::ExitCode;

use clap::Parser;
use graphfreeze::Backend;
use graphfreeze::config::ExportArgs;
use graphfreeze::export::{export_and_freeze, export_model};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = ExportArgs::parse();
    let config = args.to_config();
    let device = <Backend as burn::tensor::backend::Backend>::Device::default();

    let result = if args.skip_freeze {
        export_model::<Backend>(&config, &device)
    } else {
        export_and_freeze::<Backend>(&config, &device)
    };

    match result {
        Ok(artifacts) => {
            log::info!(
                "Exported {} parameters: checkpoint {}, graph {}",
                artifacts.parameters,
                artifacts.checkpoint.display(),
                artifacts.graph.display()
            );
            if let Some(frozen) = &artifacts.frozen_graph {
                log::info!("Frozen graph: {}", frozen.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
