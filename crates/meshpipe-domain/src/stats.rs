use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide pipeline counters.
///
/// Shared read-only with the status surface and the liveness task, so
/// every field is atomic; the pipeline is the only writer. Reset only on
/// restart.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub messages_seen: AtomicU64,
    pub json_messages: AtomicU64,
    pub envelopes_decoded: AtomicU64,
    pub decode_errors: AtomicU64,
    pub decrypted: AtomicU64,
    pub decrypt_failures: AtomicU64,
    pub filtered_out: AtomicU64,
    pub payloads_handled: AtomicU64,
    pub stored: AtomicU64,
}

/// Point-in-time copy of the counters for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages_seen: u64,
    pub json_messages: u64,
    pub envelopes_decoded: u64,
    pub decode_errors: u64,
    pub decrypted: u64,
    pub decrypt_failures: u64,
    pub filtered_out: u64,
    pub payloads_handled: u64,
    pub stored: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_seen: self.messages_seen.load(Ordering::Relaxed),
            json_messages: self.json_messages.load(Ordering::Relaxed),
            envelopes_decoded: self.envelopes_decoded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            decrypted: self.decrypted.load(Ordering::Relaxed),
            decrypt_failures: self.decrypt_failures.load(Ordering::Relaxed),
            filtered_out: self.filtered_out.load(Ordering::Relaxed),
            payloads_handled: self.payloads_handled.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
        }
    }
}

/// One relaxed increment; the counters are diagnostics, not control flow.
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn saw_message(&self) {
        bump(&self.messages_seen);
    }
    pub fn saw_json(&self) {
        bump(&self.json_messages);
    }
    pub fn decoded_envelope(&self) {
        bump(&self.envelopes_decoded);
    }
    pub fn decode_error(&self) {
        bump(&self.decode_errors);
    }
    pub fn decrypted_packet(&self) {
        bump(&self.decrypted);
    }
    pub fn decrypt_failure(&self) {
        bump(&self.decrypt_failures);
    }
    pub fn filtered(&self) {
        bump(&self.filtered_out);
    }
    pub fn handled_payload(&self) {
        bump(&self.payloads_handled);
    }
    pub fn stored_record(&self) {
        bump(&self.stored);
    }
}
