use clap::Parser;
use csv_batch_loader::cli::{args::Args, commands};
use csv_batch_loader::processor::CancellationFlag;
use std::process;

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Create async runtime and run the command with signal handling
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        let cancellation = CancellationFlag::new();

        // The import stops after the batch in flight; committed batches stay
        let signal_flag = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nReceived CTRL+C, stopping after the current batch...");
                signal_flag.cancel();
            }
        });

        commands::run(args, cancellation).await
    });

    match result {
        Ok(outcome) => {
            // Summary has already been reported by the command
            process::exit(outcome.exit_code());
        }
        Err(error) => {
            eprintln!("Error: {:#}", anyhow::Error::new(error));
            process::exit(1);
        }
    }
}
