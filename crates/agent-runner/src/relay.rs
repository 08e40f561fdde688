//! Server side of the response protocol
//!
//! Relays model deltas to the client unchanged while driving the turn state
//! machine. The placeholder AI message is finalized with the accumulated text
//! (leading whitespace trimmed) after the last delta. Any failure before that
//! write succeeds, including a dropped body, deletes the placeholder instead.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chat_core::chat::ChatRepository;

use crate::model::ModelStream;
use crate::protocol::{encode_content, encode_status, StreamStatus};
use crate::turn::ConversationTurn;

/// Deletes the placeholder if dropped while armed
struct PlaceholderGuard {
    store: Arc<dyn ChatRepository>,
    message_id: Uuid,
    cancel: CancellationToken,
    armed: bool,
}

impl PlaceholderGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PlaceholderGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.cancel.cancel();

        let store = self.store.clone();
        let message_id = self.message_id;
        warn!(%message_id, "Response dropped before completion, deleting AI message");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    delete_placeholder(store.as_ref(), message_id).await;
                });
            }
            Err(_) => error!(%message_id, "No runtime available to delete AI message"),
        }
    }
}

async fn delete_placeholder(store: &dyn ChatRepository, message_id: Uuid) {
    match store.delete_message(message_id).await {
        Ok(true) => info!(%message_id, "Deleted unfinished AI message"),
        Ok(false) => debug!(%message_id, "AI message already gone"),
        Err(e) => error!(%message_id, error = %e, "Failed to delete unfinished AI message"),
    }
}

/// Build the response body for `turn`.
///
/// `turn` must already hold its placeholder. `cancel` is cancelled when the
/// body is dropped early, even before its first poll, so upstream model work
/// stops too.
pub fn relay_response(
    stream: ModelStream,
    store: Arc<dyn ChatRepository>,
    turn: ConversationTurn,
    cancel: CancellationToken,
) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static {
    // Armed before the first poll so an unpolled body still cleans up
    let guard = turn.ai_message_id.map(|message_id| PlaceholderGuard {
        store,
        message_id,
        cancel,
        armed: true,
    });

    async_stream::stream! {
        let mut turn = turn;
        let Some(mut guard) = guard else {
            error!(chat_id = %turn.chat_id, "Relay started without an AI message");
            yield Ok(encode_status(StreamStatus::Failure));
            return;
        };
        let message_id = guard.message_id;

        let mut stream = stream;
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => {
                    turn.push_delta(&delta);
                    let bytes = encode_content(&delta);
                    if !bytes.is_empty() {
                        yield Ok(bytes);
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(stream);

        // The guard stays armed until the placeholder is finalized or deleted
        let store = guard.store.clone();
        let status = match failure {
            None => match store.update_message(message_id, turn.ai_text().to_string()).await {
                Ok(true) => {
                    info!(%message_id, chars = turn.ai_text().len(), "AI message finalized");
                    StreamStatus::Success
                }
                Ok(false) => {
                    warn!(%message_id, "AI message vanished before it was finalized");
                    StreamStatus::Failure
                }
                Err(e) => {
                    error!(%message_id, error = %e, "Failed to finalize AI message");
                    delete_placeholder(store.as_ref(), message_id).await;
                    StreamStatus::Failure
                }
            },
            Some(e) => {
                warn!(%message_id, error = %e, "Model stream failed");
                delete_placeholder(store.as_ref(), message_id).await;
                StreamStatus::Failure
            }
        };
        guard.disarm();

        let transition = if status.is_success() {
            turn.finalized()
        } else {
            turn.deleted()
        };
        if let Err(e) = transition {
            warn!(error = %e, "Unexpected turn state");
        }
        debug!(%message_id, state = ?turn.state(), "Turn complete");

        yield Ok(encode_status(status));
    }
}
