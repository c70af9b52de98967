//! QR decoding gateway.

use clap::Parser;

use qr_gateway::config::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = qr_gateway::lifecycle::run(args).await {
        // Logging may not be up yet, so report on stderr as well.
        eprintln!("qr-gateway: {}", e);
        tracing::error!(error = %e, "Startup failed");
        std::process::exit(1);
    }
}
