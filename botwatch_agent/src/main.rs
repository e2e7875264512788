//! botwatch_agent: a mock bot backend for exercising the console.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use botwatch_agent::{parse_port, router, sampler, AppState, DEFAULT_PORT};
use tracing::info;
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(1000);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Usage: botwatch_agent [--port PORT|-p PORT]");
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let port = parse_port(args, DEFAULT_PORT);
    let state = AppState::new();
    let _ticker = sampler::spawn_ticker(state.clone(), TICK);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("mock backend listening on http://{addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
