use std::future::Future;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::messages::StreamEvent;

pub const NDJSON: &str = "application/x-ndjson";

/// Build a streaming NDJSON response fed by `produce`.
///
/// The producer gets a sender and a token that is cancelled when the client
/// disconnects, when `shutdown` fires, or when the producer itself returns.
/// The body ends once the producer has finished.
pub fn ndjson_response<F, Fut>(
    shutdown: &CancellationToken,
    capacity: usize,
    produce: F,
) -> Response
where
    F: FnOnce(mpsc::Sender<StreamEvent>, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let cancel = shutdown.child_token();

    let watch_tx = tx.clone();
    let watch_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = watch_tx.closed() => {
                debug!(target: "stream", "Client disconnected");
                watch_cancel.cancel();
            }
            _ = watch_cancel.cancelled() => {}
        }
    });

    let guard = cancel.clone().drop_guard();
    let producer = produce(tx, cancel);
    tokio::spawn(async move {
        let _guard = guard;
        producer.await;
    });

    let body = ReceiverStream::new(rx).map(|event| event.to_ndjson().map(Bytes::from));
    ([(CONTENT_TYPE, NDJSON)], Body::from_stream(body)).into_response()
}
