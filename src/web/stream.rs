//! Server-sent event relay of the current run's queue
//!
//! Frames, one `data:` line each:
//! - `stream_connected` after the preamble
//! - `ping` when nothing arrived within a second
//! - the sample value, or the informational text
//! - `ERROR: <message>` on a fatal event, followed by the terminal marker
//! - `-1` as the terminal marker, after which the response ends

use axum::{
    extract::State,
    http::{HeaderValue, header},
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, Sse},
    },
};
use futures::{
    FutureExt,
    stream::{self, Stream, StreamExt},
};
use log::{debug, error, info};
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::iperf::Event;
use crate::run::{EventQueue, QueueItem, Received};
use crate::web::router::AppState;

/// How long to wait for an item before sending a keepalive
pub const KEEPALIVE_AFTER: Duration = Duration::from_secs(1);

/// Reconnect interval suggested to the browser
const RETRY_HINT: Duration = Duration::from_millis(1000);

pub const TERMINAL_MARKER: &str = "-1";

pub async fn stream_iperf(State(state): State<AppState>) -> Response {
    let queue = state.controller.current_queue();
    info!("Stream client attached to run {}", queue.run_id());

    let mut response = Sse::new(event_stream(queue, KEEPALIVE_AFTER)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Logs when a client's relay ends, whether finished or dropped mid-stream
struct Relay {
    queue: Arc<EventQueue>,
}

impl Drop for Relay {
    fn drop(&mut self) {
        debug!("Stream relay for run {} closed", self.queue.run_id());
    }
}

pub fn event_stream(
    queue: Arc<EventQueue>,
    keepalive_after: Duration,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    let preamble = stream::iter([
        SseEvent::default().comment("stream"),
        SseEvent::default().retry(RETRY_HINT),
        SseEvent::default().data("stream_connected"),
    ]);

    let relay = stream::unfold(Some(Relay { queue }), move |relay| async move {
        let relay = relay?;
        let received = AssertUnwindSafe(relay.queue.next(keepalive_after))
            .catch_unwind()
            .await;

        let (frames, done) = match received {
            Ok(received) => frames_for(received),
            Err(_) => {
                error!("Stream relay for run {} panicked", relay.queue.run_id());
                (
                    vec!["ERROR: stream exception".to_string(), TERMINAL_MARKER.to_string()],
                    true,
                )
            }
        };
        Some((frames, (!done).then_some(relay)))
    });

    preamble
        .chain(relay.flat_map(|frames| stream::iter(frames.into_iter().map(frame))))
        .map(Ok)
}

/// Frames for one queue outcome, and whether the stream ends after them
pub fn frames_for(received: Received) -> (Vec<String>, bool) {
    match received {
        Received::Idle => (vec!["ping".to_string()], false),
        Received::Closed | Received::Item(QueueItem::Sentinel) => {
            (vec![TERMINAL_MARKER.to_string()], true)
        }
        Received::Item(QueueItem::Event(event)) => match event {
            Event::Error(message) => (
                vec![format!("ERROR: {message}"), TERMINAL_MARKER.to_string()],
                true,
            ),
            Event::Sample(value) => (vec![format!("{value:?}")], false),
            Event::Busy => (vec!["server is busy".to_string()], false),
            Event::Info(text) | Event::Raw(text) => (vec![text], false),
        },
    }
}

/// SSE data cannot carry carriage returns
fn frame(text: String) -> SseEvent {
    SseEvent::default().data(text.replace('\r', ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_frames_keep_decimal_point() {
        let (frames, done) = frames_for(Received::Item(QueueItem::Event(Event::Sample(125.0))));
        assert_eq!(frames, vec!["125.0"]);
        assert!(!done);

        let (frames, _) = frames_for(Received::Item(QueueItem::Event(Event::Sample(941.32))));
        assert_eq!(frames, vec!["941.32"]);
    }

    #[test]
    fn test_error_frame_is_followed_by_terminal_marker() {
        let (frames, done) = frames_for(Received::Item(QueueItem::Event(Event::Error(
            "unable to connect to server".to_string(),
        ))));
        assert_eq!(frames, vec!["ERROR: unable to connect to server", "-1"]);
        assert!(done);
    }

    #[test]
    fn test_terminal_and_keepalive_frames() {
        assert_eq!(frames_for(Received::Idle), (vec!["ping".to_string()], false));
        assert_eq!(
            frames_for(Received::Item(QueueItem::Sentinel)),
            (vec!["-1".to_string()], true)
        );
        assert_eq!(frames_for(Received::Closed), (vec!["-1".to_string()], true));
    }

    #[test]
    fn test_busy_and_text_pass_through() {
        assert_eq!(
            frames_for(Received::Item(QueueItem::Event(Event::Busy))).0,
            vec!["server is busy"]
        );
        assert_eq!(
            frames_for(Received::Item(QueueItem::Event(Event::Info("CMD: iperf3 -c x".to_string())))).0,
            vec!["CMD: iperf3 -c x"]
        );
    }

    #[tokio::test]
    async fn test_stream_ends_after_sentinel() {
        let queue = Arc::new(EventQueue::new(1));
        queue.push(Event::Sample(1.5));
        queue.finish();

        let events: Vec<_> = event_stream(queue, Duration::from_millis(50)).collect().await;
        // preamble (3) + sample + terminal marker
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_idle_queue_yields_keepalives() {
        let queue = Arc::new(EventQueue::new(1));
        let events: Vec<_> = event_stream(queue, Duration::from_millis(10)).take(5).collect().await;
        assert_eq!(events.len(), 5);
    }
}
