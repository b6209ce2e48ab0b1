//! Loads a saved model bundle and prints the name of every operation.

use std::process::ExitCode;

use clap::Parser;
use graphfreeze::Backend;
use graphfreeze::config::InspectArgs;
use graphfreeze::inspect::inspect_bundle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> ExitCode {
    // Logs go to stderr, stdout carries the listing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = InspectArgs::parse();
    let device = <Backend as burn::tensor::backend::Backend>::Device::default();

    match inspect_bundle::<Backend, _>(&args.export_dir, args.tags.as_slice(), &device) {
        Ok(operations) => {
            for op in operations {
                if args.with_types {
                    println!("{op}");
                } else {
                    println!("{}", op.name);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
