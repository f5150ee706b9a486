use crate::params::event_stream::CounterParams;
use axum::extract::{Path, Query, State};
use log::*;
use serde_json::json;
use service::AppState;
use sse::{EventChannel, SseResponse, StreamAdapter};
use std::time::Duration;

/// Stream adapter carrying the configured keep-alive. Every event stream
/// route is built from this.
pub(crate) fn adapter(app_state: &AppState) -> StreamAdapter {
    match app_state.keep_alive() {
        Some(interval) => StreamAdapter::new().keep_alive(interval),
        None => StreamAdapter::new(),
    }
}

/// GET /events/counter?count=N
///
/// Streams `0` through `N - 1`, one per configured interval, then ends.
pub async fn counter(
    State(app_state): State<AppState>,
    Query(params): Query<CounterParams>,
) -> SseResponse {
    let interval = app_state.event_interval();
    let response = adapter(&app_state).spawn(move |events| count_up(events, params.count, interval));

    debug!("Counter stream {} started", response.id());
    response
}

async fn count_up(events: EventChannel, count: u32, interval: Duration) -> sse::Result<()> {
    for i in 0..count {
        if i > 0 {
            tokio::time::sleep(interval).await;
        }
        events.send(i.to_string(), None)?;
    }
    Ok(())
}

/// GET /events/clock
///
/// Streams `{"tick": n}` as `tick` events until the client goes away.
pub async fn clock(State(app_state): State<AppState>) -> SseResponse {
    let interval = app_state.event_interval();
    let response = adapter(&app_state).spawn(move |events| tick_forever(events, interval));

    debug!("Clock stream {} started", response.id());
    response
}

async fn tick_forever(events: EventChannel, interval: Duration) -> sse::Result<()> {
    let mut tick: u64 = 0;
    loop {
        events.send(json!({ "tick": tick }), Some("tick"))?;
        tick += 1;
        tokio::time::sleep(interval).await;
    }
}

/// GET /events/echo/:message
///
/// Sends the path segment back once as an `echo` event.
pub async fn echo(Path(message): Path<String>, events: EventChannel) -> sse::Result<()> {
    events.send(message, Some("echo"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use service::config::Config;

    fn app_state(keep_alive_secs: &str) -> AppState {
        let config =
            Config::try_parse_from(["sse_bridge", "--keep-alive-secs", keep_alive_secs]).unwrap();
        AppState::new(config)
    }

    #[test]
    fn test_adapter_uses_configured_keep_alive() {
        let adapter = adapter(&app_state("30"));
        assert_eq!(adapter.keep_alive_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_adapter_without_keep_alive() {
        assert_eq!(adapter(&app_state("0")).keep_alive_interval(), None);
    }
}
