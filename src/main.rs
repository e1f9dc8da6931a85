//! Wallet Ledger CLI
//!
//! Command-line interface for applying wallet ledger commands from CSV files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > accounts.csv
//! cargo run -- --report payments commands.csv > payments.csv
//! RUST_LOG=debug cargo run -- --batch-size 200 commands.csv
//! cargo run --features postgres -- --backend postgres \
//!     --database-url postgres://localhost/ledger --bootstrap-schema commands.csv
//! ```
//!
//! The program reads `op,name,to,amount` rows from the input file, applies
//! them to a ledger in file order, and writes the requested report to stdout.
//! Logs go to stderr.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (invalid configuration, storage unavailable, file not readable, etc.)

use std::process;
use tracing::error;
use wallet_ledger::{batch, cli, telemetry, Ledger};

fn main() {
    // Parse command-line arguments using clap
    let args = cli::parse_args();
    telemetry::init(args.log_json);

    let config = args.to_config();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads.max(1))
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to create tokio runtime");
            process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let ledger = Ledger::open(config).await?;

        if args.bootstrap_schema {
            bootstrap_schema(&ledger).await?;
        }

        let service = ledger.service();
        let outcome = async {
            batch::run_file(&service, &args.input_file, args.batch_size).await?;
            let mut output = std::io::stdout();
            batch::write_report(&service, args.report, &mut output).await
        }
        .await;

        ledger.shutdown().await;
        outcome.map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
    });

    if let Err(e) = result {
        error!(error = %e, "wallet-ledger failed");
        process::exit(1);
    }
}

#[cfg(feature = "postgres")]
async fn bootstrap_schema(ledger: &Ledger) -> Result<(), Box<dyn std::error::Error>> {
    use wallet_ledger::Backend;

    if let Backend::Postgres(pg) = ledger.engine().storage().as_ref() {
        pg.ensure_schema().await?;
        tracing::info!("postgres schema ensured");
    }
    Ok(())
}

#[cfg(not(feature = "postgres"))]
async fn bootstrap_schema(_ledger: &Ledger) -> Result<(), Box<dyn std::error::Error>> {
    tracing::warn!("--bootstrap-schema ignored: built without the postgres backend");
    Ok(())
}
