use log::*;
use service::AppState;
use tokio::net::TcpListener;

mod controller;
mod params;
pub mod router;

/// Binds the configured address and serves the router until the process stops.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let listen_addr = app_state.config.listen_address();
    let listener = TcpListener::bind(&listen_addr).await?;

    info!("Server starting... listening for connections on http://{listen_addr}");

    axum::serve(listener, router::define_routes(app_state)).await
}
