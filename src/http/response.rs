//! Serving documents to clients.
//!
//! # Responsibilities
//! - Turn any document into an axum response
//! - Copy end-to-end headers, dropping hop-by-hop ones and any header the
//!   `Connection` field names
//! - Send every value of a repeated field as its own header line
//! - Stream the body, pausing the document while the client falls behind
//!
//! # Design Decisions
//! - Documents without a status are served as 200
//! - Invalid header names or values are skipped, not fatal
//! - Upstream errors and aborts terminate the client body with an error

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

use crate::config::BodyConfig;
use crate::document::{Document, Headers, Shape};
use crate::stream::{BodyEvent, BodyStream, ChannelSink, EventKind, StreamError};

/// Connection-scoped headers that must not be forwarded.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name)
}

/// Lowercase header names listed in the `Connection` field.
fn connection_tokens(headers: &Headers) -> Vec<String> {
    headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("connection"))
        .flat_map(|(_, value)| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Serve `document` as a streaming response with default body settings.
pub fn into_response<S: Shape>(document: Document<S>) -> Response {
    into_response_with(document, &BodyConfig::default())
}

/// Serve `document` as a streaming response. At most about
/// `config.high_water_mark` bytes wait for the client before the document
/// is paused.
pub fn into_response_with<S: Shape>(document: Document<S>, config: &BodyConfig) -> Response {
    let status = document.status_code().unwrap_or(StatusCode::OK);

    let (sink, rx) = ChannelSink::with_limit(config.high_water_mark);
    let sink = Arc::new(sink);

    let on_error = sink.clone();
    document.once(
        EventKind::Error,
        Arc::new(move |event: &BodyEvent| {
            if let BodyEvent::Error(err) = event {
                on_error.fail(err.clone());
            }
        }),
    );
    let on_abort = sink.clone();
    document.once(
        EventKind::Aborted,
        Arc::new(move |_: &BodyEvent| on_abort.fail(StreamError::Aborted)),
    );
    document.pipe(sink);

    let chunks = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    let mut response = Response::new(Body::from_stream(chunks));
    *response.status_mut() = status;

    let nominated = connection_tokens(document.headers());
    let headers = response.headers_mut();
    for (name, value) in document.headers().iter() {
        let lower = name.to_ascii_lowercase();
        if is_hop_by_hop(&lower) || nominated.contains(&lower) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => {
                tracing::debug!(header = %name, "Skipping header that is not valid on the wire");
            }
        }
    }

    response
}
