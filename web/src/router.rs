use crate::controller::{event_stream_controller, health_check_controller};
use axum::{routing::get, Router};
use service::AppState;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(event_stream_routes(app_state))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn event_stream_routes(app_state: AppState) -> Router {
    let echo = event_stream_controller::adapter(&app_state).wrap(event_stream_controller::echo);

    Router::new()
        .route("/events/counter", get(event_stream_controller::counter))
        .route("/events/clock", get(event_stream_controller::clock))
        .route("/events/echo/:message", get(echo))
        .with_state(app_state)
}
