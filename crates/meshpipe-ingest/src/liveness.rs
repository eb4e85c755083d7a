use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use meshpipe_domain::PipelineStats;

use crate::mqtt::LinkStatus;

/// Best-effort liveness heartbeat.
///
/// Shares nothing mutable with the pipeline: it only reads the link
/// state atomic and the stats counters, and logs a heartbeat so a quiet
/// mesh is distinguishable from a dead process. Exits on cancellation.
pub async fn run_liveness(
    status: LinkStatus,
    stats: Arc<PipelineStats>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let snapshot = stats.snapshot();
                debug!(
                    link_state = ?status.state(),
                    messages_seen = snapshot.messages_seen,
                    stored = snapshot.stored,
                    "heartbeat"
                );
            }
        }
    }
    info!("liveness task exiting");
}
