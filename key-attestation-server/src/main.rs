use clap::Parser;
use key_attestation_server::{
    constants::DEFAULT_LOG_FILTER, router, serve, AppState, Result, ServerConfig,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = ServerConfig::parse();
    let verifier = config.build_verifier()?;
    info!(level = "attestation_server", policy = ?verifier.policy(), "Attestation verifier ready");

    let listener = TcpListener::bind(config.bind_address()).await?;
    let state = AppState::new(verifier, config.request_timeout());
    serve(listener, router(state, config.max_body_bytes)).await
}
