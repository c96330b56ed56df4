use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use error_stack::{Report, Result};
use price_sink_common::{
    initialize_sink, price_sink_cli_style, run_sink_connector, OptionsFromCli, ReportExt,
    SinkConnectorError,
};
use price_sink_console::ConsoleSink;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[cfg(not(windows))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, styles = price_sink_cli_style())]
struct Cli {
    #[command(subcommand)]
    subcommand: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream price updates from a Substreams endpoint and print them.
    ///
    /// Without a persisted cursor, streaming starts at the module's initial block and not at
    /// a fixed slot. Use `--start-block 335420000` to begin at that slot instead.
    Sink(SinkArgs),
}

#[derive(Args, Debug)]
struct SinkArgs {
    /// Substreams endpoint, for example `mainnet.sol.streamingfast.io:443`.
    endpoint: String,
    /// Path to the Substreams package (.spkg).
    spkg: PathBuf,
    /// Name of the map module emitting `mydata.v1.PriceUpdate`.
    module: String,
    #[command(flatten)]
    common: OptionsFromCli,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    run_with_args(args).await.to_exit_code()
}

async fn run_with_args(args: Cli) -> Result<(), SinkConnectorError> {
    let ct = CancellationToken::new();
    initialize_sink(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), ct.clone())?;

    match args.subcommand {
        Command::Sink(args) => {
            run_sink_connector(
                &args.endpoint,
                &args.spkg,
                &args.module,
                args.common,
                ConsoleSink::default(),
                |_: Option<&Report<SinkConnectorError>>| info!("sink is terminating"),
                ct,
            )
            .await
        }
    }
}
