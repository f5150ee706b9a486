//! Server-Sent Events (SSE) streaming for long-lived handlers.
//!
//! This crate bridges a handler that emits discrete events with an HTTP
//! response body that delivers them to the client as SSE frames.
//!
//! # Architecture
//!
//! - **One producer, one consumer**: every stream request gets its own
//!   [`EventChannel`]. The handler sends on it; the response body drains it.
//! - **Non-blocking sends**: `send` encodes the payload and appends it to a
//!   buffer. It never waits for the client.
//! - **Batch draining**: the body wakes on a level-triggered signal, swaps the
//!   whole buffer out and yields the frames in send order.
//! - **Lifecycle**: the channel closes when the handler stops for any reason,
//!   which ends the body. When the body ends or is dropped (client gone), the
//!   handler task is cancelled.
//!
//! # Wire format
//!
//! ```text
//! [event: <name>\n]data: <line>\n[data: <line>\n...]\n
//! ```
//!
//! Structured payloads are serialized to JSON, e.g. `data: {"x": 1}`.
//!
//! # Example
//!
//! ```rust,ignore
//! use sse::{with_sse, EventChannel};
//!
//! async fn ticks(_: (), events: EventChannel) -> sse::Result<()> {
//!     for i in 0..10 {
//!         events.send(i.to_string(), Some("tick"))?;
//!         tokio::time::sleep(Duration::from_secs(1)).await;
//!     }
//!     Ok(())
//! }
//!
//! let app = Router::new().route("/ticks", get(with_sse(ticks)));
//! ```
//!
//! # Modules
//!
//! - `channel`: the shared frame buffer and its wake signal
//! - `adapter`: background handler execution and the response body
//! - `frame`: payload encoding into SSE records
//! - `stream_id`: per-stream identifier used in logs
//! - `error`: error type for sends

pub mod adapter;
pub mod channel;
pub mod error;
pub mod frame;
pub mod stream_id;

pub use adapter::{with_sse, FrameStream, HandlerTask, SseResponse, StreamAdapter};
pub use channel::EventChannel;
pub use error::{Error, Result};
pub use frame::Payload;
