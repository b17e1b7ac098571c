//! The write side of one HTTP request.
//!
//! An exchange writes exactly one [`PollResponse`] into a [`ResponseSink`]. The
//! HTTP handler holds the matching [`PendingResponse`]; if the client
//! disconnects, the handler is dropped with it and the sink reports the write
//! as failed.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::oneshot;

use crate::polling::error::ClientGone;

/// A fully formed response for one polling request.
#[derive(Debug, Clone)]
pub struct PollResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl PollResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl IntoResponse for PollResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// Headers carried by every polling response.
///
/// Configured defaults come first; the JSON content type and the cache-busting
/// headers always win.
pub fn polling_headers(defaults: &HeaderMap) -> HeaderMap {
    let mut headers = defaults.clone();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers
}

/// Where an exchange writes its response.
#[derive(Debug)]
pub struct ResponseSink {
    tx: oneshot::Sender<PollResponse>,
}

/// The handler's half of a [`ResponseSink`].
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<PollResponse>,
}

impl ResponseSink {
    /// Create a connected sink/pending pair.
    pub fn channel() -> (ResponseSink, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        (ResponseSink { tx }, PendingResponse { rx })
    }

    /// Hand the response to the waiting handler.
    pub fn write(self, response: PollResponse) -> Result<(), ClientGone> {
        self.tx.send(response).map_err(|_| ClientGone)
    }

    /// Whether the handler has already gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the handler has gone away.
    pub async fn closed(&mut self) {
        self.tx.closed().await
    }
}

impl PendingResponse {
    /// Wait for the exchange's response. `None` if it ended without writing one.
    pub async fn wait(self) -> Option<PollResponse> {
        self.rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_headers_override_defaults() {
        let mut defaults = HeaderMap::new();
        defaults.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        defaults.insert("x-powered-by", HeaderValue::from_static("polling"));

        let headers = polling_headers(&defaults);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
        assert_eq!(headers["x-powered-by"], "polling");
    }

    #[tokio::test]
    async fn write_reaches_pending_side() {
        let (sink, pending) = ResponseSink::channel();
        sink.write(PollResponse::new(StatusCode::OK, HeaderMap::new(), "1:3"))
            .unwrap();

        let response = pending.wait().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "1:3");
    }

    #[tokio::test]
    async fn write_after_handler_left_fails() {
        let (mut sink, pending) = ResponseSink::channel();
        drop(pending);

        sink.closed().await;
        assert!(sink.is_closed());
        assert_eq!(
            sink.write(PollResponse::new(StatusCode::OK, HeaderMap::new(), "ok")),
            Err(ClientGone)
        );
    }

    #[tokio::test]
    async fn dropped_sink_yields_no_response() {
        let (sink, pending) = ResponseSink::channel();
        drop(sink);
        assert!(pending.wait().await.is_none());
    }
}
