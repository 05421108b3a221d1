use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};

use insight_relay::{
    cli::config_arg_from_args,
    config::Config,
    logging::init_tracing,
    payment::{evm::EvmSigner, transport::HttpPayerTransport},
    pipeline::{Pipeline, progress::ConsoleProgressSink},
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("Error during execution: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // A missing .env file is fine; the key may come from the real environment.
    let _ = dotenvy::dotenv();

    let config_arg = config_arg_from_args()?;
    let config = Config::load_or_default(&config_arg.path, config_arg.explicit)
        .with_context(|| format!("failed to load config from {}", config_arg.path.display()))?;
    let logging = init_tracing(&config.logging)?;

    let private_key = config.payment.private_key()?;
    let signer = Arc::new(EvmSigner::from_hex(&private_key)?);
    tracing::info!(
        target: "payment",
        run_id = %logging.run_id(),
        payer = %signer.address(),
        network = %config.payment.network,
        "payer_initialized"
    );

    let transport = Arc::new(HttpPayerTransport::new(signer)?);
    let console = Arc::new(ConsoleProgressSink);
    console.print_banner();

    let pipeline = Pipeline::new(transport, console, &config);
    let report = pipeline.run().await?;
    tracing::info!(
        target: "pipeline",
        run_id = %logging.run_id(),
        state = ?report.state,
        analysis_chars = report.analysis.chars().count(),
        "pipeline_completed"
    );

    Ok(())
}
