use crate::channel::EventChannel;
use crate::frame::KEEP_ALIVE_FRAME;
use crate::stream_id::StreamId;
use async_stream::stream;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::BoxStream;
use futures::{pin_mut, Stream, StreamExt};
use log::*;
use std::convert::Infallible;
use std::fmt::Display;
use std::future::{self, Future, Ready};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Cancellable handle on a running stream handler.
///
/// Cancelling is idempotent: cancelling twice, or cancelling a handler that
/// already finished, does nothing.
#[derive(Debug, Clone)]
pub struct HandlerTask {
    handle: AbortHandle,
}

impl HandlerTask {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

struct CancelOnDrop(HandlerTask);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

struct CloseOnDrop(EventChannel);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Response body: the encoded frames of one event stream.
///
/// Dropping it before it ends (e.g. the client disconnected and the server
/// stopped polling) cancels the handler that feeds it.
pub struct FrameStream {
    inner: BoxStream<'static, String>,
}

impl Stream for FrameStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// What a stream endpoint hands back to the router: status, headers and a
/// lazy body of frames.
pub struct SseResponse {
    id: StreamId,
    status: StatusCode,
    headers: HeaderMap,
    body: FrameStream,
    task: HandlerTask,
}

impl SseResponse {
    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn task(&self) -> &HandlerTask {
        &self.task
    }

    /// Splits the response into the `(body, status, headers)` triple for
    /// hosts that assemble responses themselves.
    pub fn into_parts(self) -> (FrameStream, StatusCode, HeaderMap) {
        (self.body, self.status, self.headers)
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let (body, status, headers) = self.into_parts();
        let body = Body::from_stream(body.map(Ok::<_, Infallible>));

        (status, headers, body).into_response()
    }
}

/// Runs stream handlers in the background and exposes their events as a
/// response body.
///
/// The handler receives an [`EventChannel`] and sends events on it for as long
/// as it runs. The channel is closed whenever the handler stops, whether it
/// returned `Ok`, returned an error, panicked or was cancelled, so the body
/// always terminates.
#[derive(Debug, Clone, Default)]
pub struct StreamAdapter {
    keep_alive: Option<Duration>,
}

impl StreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits a comment frame whenever the stream has been idle for `interval`.
    /// A zero interval disables keep-alive.
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = Some(interval).filter(|interval| !interval.is_zero());
        self
    }

    pub fn keep_alive_interval(&self) -> Option<Duration> {
        self.keep_alive
    }

    /// Starts `handler` on the runtime and returns the response streaming its
    /// events. Must be called from within a Tokio runtime.
    pub fn spawn<F, Fut, E>(&self, handler: F) -> SseResponse
    where
        F: FnOnce(EventChannel) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        let id = StreamId::new();
        let channel = EventChannel::new();

        let handler_future = handler(channel.clone());
        let close_guard = CloseOnDrop(channel.clone());
        let task_id = id.clone();

        debug!("Starting event stream {id}");
        let handle = tokio::spawn(async move {
            let _close_guard = close_guard;
            match handler_future.await {
                Ok(()) => debug!("Event stream handler {task_id} finished"),
                Err(e) => error!("Event stream handler {task_id} failed: {e}"),
            }
        });

        let task = HandlerTask {
            handle: handle.abort_handle(),
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE),
        );

        SseResponse {
            body: self.frames(channel, task.clone(), id.clone()),
            id,
            status: StatusCode::OK,
            headers,
            task,
        }
    }

    /// Turns `handler` into a router handler taking the request extractor(s)
    /// `A` and returning an [`SseResponse`].
    pub fn wrap<A, F, Fut, E>(
        &self,
        handler: F,
    ) -> impl Fn(A) -> Ready<SseResponse> + Clone + Send + Sync + 'static
    where
        F: Fn(A, EventChannel) -> Fut + Clone + Send + Sync + 'static,
        A: 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + 'static,
    {
        let adapter = self.clone();
        move |args: A| future::ready(adapter.spawn(|channel| handler(args, channel)))
    }

    fn frames(&self, channel: EventChannel, task: HandlerTask, id: StreamId) -> FrameStream {
        let keep_alive = self.keep_alive;
        let cancel_guard = CancelOnDrop(task);

        let inner = stream! {
            let frames = channel.drain();
            pin_mut!(frames);

            match keep_alive {
                None => {
                    while let Some(frame) = frames.next().await {
                        yield frame;
                    }
                }
                Some(interval) => {
                    let mut ticker = time::interval_at(Instant::now() + interval, interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    loop {
                        let (next, from_handler) = tokio::select! {
                            frame = frames.next() => (frame, true),
                            _ = ticker.tick() => (Some(KEEP_ALIVE_FRAME.to_string()), false),
                        };

                        if from_handler {
                            ticker.reset();
                        }

                        match next {
                            Some(frame) => {
                                yield frame;
                            }
                            None => break,
                        }
                    }
                }
            }

            debug!("Event stream {id} ended, cancelling its handler");
            drop(cancel_guard);
        };

        FrameStream {
            inner: inner.boxed(),
        }
    }
}

/// Shorthand for [`StreamAdapter::wrap`] with default settings.
///
/// ```rust,ignore
/// async fn countdown(Path(from): Path<u32>, events: EventChannel) -> sse::Result<()> {
///     for i in (0..=from).rev() {
///         events.send(i.to_string(), None)?;
///         tokio::time::sleep(Duration::from_secs(1)).await;
///     }
///     Ok(())
/// }
///
/// let app = Router::new().route("/countdown/:from", get(with_sse(countdown)));
/// ```
pub fn with_sse<A, F, Fut, E>(
    handler: F,
) -> impl Fn(A) -> Ready<SseResponse> + Clone + Send + Sync + 'static
where
    F: Fn(A, EventChannel) -> Fut + Clone + Send + Sync + 'static,
    A: 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + 'static,
{
    StreamAdapter::new().wrap(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use tokio::time::timeout;

    async fn wait_until_finished(task: &HandlerTask) {
        timeout(Duration::from_secs(1), async {
            while !task.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("handler task should finish");
    }

    #[tokio::test]
    async fn test_three_events_then_termination() {
        let response = StreamAdapter::new().spawn(|events| async move {
            for i in 0..3 {
                events.send(i.to_string(), None)?;
                tokio::task::yield_now().await;
            }
            Ok::<_, Error>(())
        });
        let task = response.task().clone();

        let (body, _, _) = response.into_parts();
        let frames = timeout(Duration::from_secs(1), body.collect::<Vec<_>>())
            .await
            .expect("body should end when the handler returns");

        assert_eq!(frames, vec!["data: 0\n\n", "data: 1\n\n", "data: 2\n\n"]);
        wait_until_finished(&task).await;

        // Cancelling a finished handler is a no-op.
        task.cancel();
        task.cancel();
        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn test_response_status_and_headers() {
        let response = StreamAdapter::new().spawn(|_events| async { Ok::<_, Error>(()) });

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert_eq!(response.headers().len(), 1);
    }

    #[tokio::test]
    async fn test_handler_error_still_ends_the_stream() {
        let response = StreamAdapter::new().spawn(|events| async move {
            events.send("partial", None)?;
            Err::<(), _>(Error::BrokenChannel)
        });

        let (body, _, _) = response.into_parts();
        let frames = timeout(Duration::from_secs(1), body.collect::<Vec<_>>())
            .await
            .expect("a failed handler must not leave the stream hanging");

        assert_eq!(frames, vec!["data: partial\n\n"]);
    }

    #[tokio::test]
    async fn test_handler_panic_still_ends_the_stream() {
        let response = StreamAdapter::new().spawn(|events| async move {
            events.send("before", None)?;
            if events.pending_len() > 0 {
                panic!("handler blew up");
            }
            Ok::<_, Error>(())
        });

        let (body, _, _) = response.into_parts();
        let frames = timeout(Duration::from_secs(1), body.collect::<Vec<_>>())
            .await
            .expect("a panicking handler must not leave the stream hanging");

        assert_eq!(frames, vec!["data: before\n\n"]);
    }

    #[tokio::test]
    async fn test_dropping_the_body_cancels_the_handler() {
        async fn count_forever(events: EventChannel) -> Result<()> {
            let mut i = 0u64;
            loop {
                events.send(i.to_string(), None)?;
                i += 1;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        let response = StreamAdapter::new().spawn(count_forever);
        let task = response.task().clone();

        let (mut body, _, _) = response.into_parts();
        assert_eq!(body.next().await.as_deref(), Some("data: 0\n\n"));
        assert!(!task.is_finished());

        drop(body);

        wait_until_finished(&task).await;
    }

    #[tokio::test]
    async fn test_dropping_an_unpolled_body_cancels_the_handler() {
        let response = StreamAdapter::new().spawn(|_events| async move {
            std::future::pending::<()>().await;
            Ok::<_, Error>(())
        });
        let task = response.task().clone();

        drop(response);

        wait_until_finished(&task).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_frames_while_idle() {
        let response = StreamAdapter::new()
            .keep_alive(Duration::from_secs(1))
            .spawn(|events| async move {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                events.send("done", None)?;
                Ok::<_, Error>(())
            });

        let (body, _, _) = response.into_parts();
        let frames: Vec<String> = body.collect().await;

        assert_eq!(
            frames,
            vec![KEEP_ALIVE_FRAME, KEEP_ALIVE_FRAME, "data: done\n\n"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_waits_a_full_interval_after_each_event() {
        let response = StreamAdapter::new()
            .keep_alive(Duration::from_secs(1))
            .spawn(|events| async move {
                tokio::time::sleep(Duration::from_millis(800)).await;
                events.send("a", None)?;
                // 1.6s: within a second of "a", no keep-alive in between
                tokio::time::sleep(Duration::from_millis(800)).await;
                events.send("b", None)?;
                // 3.1s: one keep-alive at 2.6s, a second after "b"
                tokio::time::sleep(Duration::from_millis(1500)).await;
                events.send("c", None)?;
                Ok::<_, Error>(())
            });

        let (body, _, _) = response.into_parts();
        let frames: Vec<String> = body.collect().await;

        assert_eq!(
            frames,
            vec!["data: a\n\n", "data: b\n\n", KEEP_ALIVE_FRAME, "data: c\n\n"]
        );
    }

    #[test]
    fn test_zero_keep_alive_disables_it() {
        let adapter = StreamAdapter::new().keep_alive(Duration::ZERO);
        assert_eq!(adapter.keep_alive_interval(), None);
    }

    #[tokio::test]
    async fn test_into_response_streams_frames() {
        let response = StreamAdapter::new()
            .spawn(|events| async move {
                events.send("hello", Some("greeting"))?;
                Ok::<_, Error>(())
            })
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"event: greeting\ndata: hello\n\n");
    }

    #[tokio::test]
    async fn test_with_sse_forwards_arguments() {
        async fn greet((name, times): (String, usize), events: EventChannel) -> Result<()> {
            for _ in 0..times {
                events.send(format!("hi {name}"), None)?;
            }
            Ok(())
        }

        let handler = with_sse(greet);
        let response = handler(("ada".to_string(), 2)).await;

        let (body, status, _) = response.into_parts();
        assert_eq!(status, StatusCode::OK);
        let frames: Vec<String> = body.collect().await;
        assert_eq!(frames, vec!["data: hi ada\n\n", "data: hi ada\n\n"]);
    }
}
