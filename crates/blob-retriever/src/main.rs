use anyhow::{anyhow, Result};
use blob_retriever::{run, setup_signal_handler, Args};
use clap::Parser;
use env_logger::Env;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = Args::parse();
    info!(
        "Starting blob-retriever in {} mode for slots {}..={}",
        args.mode, args.from, args.to
    );

    let cancel = setup_signal_handler();
    let summary = run(args, cancel).await?;

    if !summary.is_clean() {
        return Err(anyhow!("Run finished with failures: {}", summary));
    }
    info!("Run finished cleanly");
    Ok(())
}
