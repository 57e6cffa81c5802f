mod auth;
mod error;
mod handlers;
mod models;
mod router;
mod sandbox;
mod settings;
mod state;

use router::create_router;
use settings::Settings;
use state::AppState;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    tracing::info!("Starting Gateway API service");

    let settings = Settings::load()?;
    let state = AppState::from_settings(&settings)?;

    // Treasury reconciliation and order expiry run beside the API
    let maintenance = state.exchange.clone().spawn_maintenance();

    let app = create_router(state);

    let listener = TcpListener::bind(settings.listen_addr).await?;
    tracing::info!("Listening on {}", settings.listen_addr);
    axum::serve(listener, app).await?;

    maintenance.abort();
    Ok(())
}
