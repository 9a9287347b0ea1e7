use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use draftroom_server::config::ServerConfig;
use draftroom_server::engine::draft_engine::DraftEngine;
use draftroom_server::net::listener;
use draftroom_server::web::app_state::AppState;
use draftroom_server::web::router::build_router;

/// Real-time pick/ban draft room server.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "draftroom.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args.config);

    // Create the shared draft engine
    let engine = DraftEngine::new(config.to_engine_config());
    if let Some(room_code) = engine.ensure_default_room() {
        info!(%room_code, "default room pinned");
    }

    // Start the draft protocol listener (TCP)
    let cancel = CancellationToken::new();
    let draft_listener = tokio::net::TcpListener::bind(&config.server.draft_address)
        .await
        .expect("failed to bind draft listener");
    tokio::spawn(listener::serve(
        draft_listener,
        engine.clone(),
        cancel.clone(),
    ));

    // Build shared app state for the web server
    let app_state = AppState::new(engine, config.to_catalog_config());
    let app = build_router(app_state);

    info!(
        "Draftroom server starting — Web: {}, Draft: {}",
        config.server.web_address, config.server.draft_address
    );

    let web_listener = tokio::net::TcpListener::bind(&config.server.web_address)
        .await
        .expect("failed to bind web listener");

    axum::serve(web_listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .expect("server error");
}

/// Resolve on Ctrl-C, taking the draft listener down with the web server.
async fn shutdown_signal(cancel: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    cancel.cancel();
}
