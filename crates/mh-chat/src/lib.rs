//! The chat-platform collaborator interface.
//!
//! The real socket/webhook transport, message posting, reaction
//! management, and user lookup are out of scope for the harness
//! (spec.md §1) — they live in whatever chat-platform SDK the embedding
//! application chooses. This crate defines only the narrow seam the
//! harness core actually calls through: acknowledging an inbound mention
//! (Ingress Adapter) and posting a status message (the processor's
//! "I will try again" / "I give up" contract, spec.md §7).
//!
//! Two test doubles are provided because every harness-core test needs
//! *some* `ChatTransport` and none of them should depend on a real chat
//! platform credential.

use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatError(pub String);

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chat transport error: {}", self.0)
    }
}

impl std::error::Error for ChatError {}

/// The subset of a chat platform client the harness core needs.
///
/// Implementations must be safe for concurrent use (spec.md §5 "the
/// platform library must be safe for concurrent use, or access must be
/// serialized by the implementer") since every worker and the ingress
/// adapter share one handle.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Acknowledge an inbound mention so the platform stops redelivering
    /// it. Called by the Ingress Adapter only after `QS.enqueue` succeeds
    /// (spec.md §4.4).
    async fn ack(&self, mention_id: &str) -> Result<(), ChatError>;

    /// Post a status message, typically the processor signaling retry vs.
    /// permanent failure based on `event.attempts` (spec.md §4.3.1, §7).
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatError>;
}

/// A transport that acknowledges and posts successfully and does nothing
/// else. Used by the standalone demo binary and by tests that don't care
/// about chat-side side effects at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChatTransport;

#[async_trait]
impl ChatTransport for NullChatTransport {
    async fn ack(&self, _mention_id: &str) -> Result<(), ChatError> {
        Ok(())
    }

    async fn post_message(&self, _channel: &str, _text: &str) -> Result<(), ChatError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Ack(String),
    PostMessage { channel: String, text: String },
}

/// A transport that records every call it receives, for assertions in
/// worker/ingress tests. Acks can be configured to fail so callers can
/// exercise the "enqueue succeeded but ack failed" edge case.
#[derive(Default)]
pub struct RecordingChatTransport {
    calls: Mutex<Vec<RecordedCall>>,
    fail_acks: std::sync::atomic::AtomicBool,
}

impl RecordingChatTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_acks(&self, fail: bool) {
        self.fail_acks.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("recording transport mutex poisoned").clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingChatTransport {
    async fn ack(&self, mention_id: &str) -> Result<(), ChatError> {
        self.calls
            .lock()
            .expect("recording transport mutex poisoned")
            .push(RecordedCall::Ack(mention_id.to_string()));
        if self.fail_acks.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ChatError("simulated ack failure".to_string()));
        }
        Ok(())
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatError> {
        self.calls
            .lock()
            .expect("recording transport mutex poisoned")
            .push(RecordedCall::PostMessage {
                channel: channel.to_string(),
                text: text.to_string(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_transport_always_succeeds() {
        let t = NullChatTransport;
        assert!(t.ack("m1").await.is_ok());
        assert!(t.post_message("#general", "hi").await.is_ok());
    }

    #[tokio::test]
    async fn recording_transport_captures_calls_in_order() {
        let t = RecordingChatTransport::new();
        t.ack("m1").await.unwrap();
        t.post_message("#general", "I will try again").await.unwrap();

        assert_eq!(
            t.calls(),
            vec![
                RecordedCall::Ack("m1".to_string()),
                RecordedCall::PostMessage {
                    channel: "#general".to_string(),
                    text: "I will try again".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn recording_transport_can_simulate_ack_failure() {
        let t = RecordingChatTransport::new();
        t.fail_acks(true);
        let err = t.ack("m1").await.unwrap_err();
        assert_eq!(err, ChatError("simulated ack failure".to_string()));
    }
}
