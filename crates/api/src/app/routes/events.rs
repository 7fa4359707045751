//! Live event stream sessions (SSE).
//!
//! Each session owns one hub mailbox. Frames are the serialized
//! envelopes exactly as broadcast, one `data:` line per event, with no
//! named SSE events; a slow client loses frames (mailbox drop) instead
//! of slowing the hub down.

use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use axum::{
    Extension,
    extract::Query,
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde::Deserialize;
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use athanor_events::{EventEnvelope, event_types};

use crate::app::{AppState, errors};

/// How long the bridge blocks on the mailbox before checking whether
/// the client is still there.
const BRIDGE_POLL: Duration = Duration::from_secs(1);

/// Cadence of the `: ping` comment frames.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    token: Option<String>,
}

/// GET /api/events?token=JWT
///
/// The token rides a query parameter because `EventSource` cannot set
/// an `Authorization` header. It is verified before the mailbox is
/// subscribed; a missing or invalid token answers 401. The first frame
/// of every session is a `connection` envelope echoing the verified
/// identity, then broadcast frames follow until the client goes away.
pub async fn stream_events(
    Extension(state): Extension<AppState>,
    Query(query): Query<StreamQuery>,
) -> axum::response::Response {
    let Some(token) = query.token else {
        return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "token required");
    };
    let claims = match state.jwt.verify(&token) {
        Ok(claims) => claims,
        Err(_) => {
            return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid token");
        }
    };

    let subscriber = state.hub.subscribe();
    let session = subscriber.id();
    info!(session, email = %claims.email, "event stream session opened");

    let welcome = EventEnvelope::new(
        event_types::CONNECTION,
        serde_json::json!({
            "role": claims.role,
            "email": claims.email,
            "name": claims.name,
        }),
    );

    let (tx, rx) = unbounded_channel::<Result<SseEvent, std::convert::Infallible>>();

    // The mailbox is a blocking receiver; drain it off the async
    // runtime and forward into the channel backing the SSE stream.
    let hub = Arc::clone(&state.hub);
    tokio::task::spawn_blocking(move || {
        match serde_json::to_string(&welcome) {
            Ok(frame) => {
                if tx.send(Ok(SseEvent::default().data(frame))).is_err() {
                    hub.unsubscribe(session);
                    return;
                }
            }
            Err(error) => {
                warn!(session, %error, "failed to serialize connection frame");
                hub.unsubscribe(session);
                return;
            }
        }

        loop {
            match subscriber.recv_timeout(BRIDGE_POLL) {
                Ok(frame) => {
                    if tx.send(Ok(SseEvent::default().data(frame))).is_err() {
                        break; // client disconnected
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        hub.unsubscribe(session);
        debug!(session, "event stream session closed");
    });

    Sse::new(UnboundedReceiverStream::new(rx))
        .keep_alive(
            KeepAlive::new()
                .interval(KEEP_ALIVE_INTERVAL)
                .text("ping"),
        )
        .into_response()
}
