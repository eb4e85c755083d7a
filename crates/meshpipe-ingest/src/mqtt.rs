use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meshpipe_domain::RawMessage;

use crate::config::ConnectionConfig;

/// Receives each bus message, sequentially, on the connection task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RawMessageHandler: Send + Sync {
    async fn handle_message(&self, message: RawMessage);
}

/// Connection lifecycle states. `Stopped` is terminal and reachable only
/// via `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Stopped = 3,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Stopped,
            _ => Self::Disconnected,
        }
    }
}

/// Read-only view of the link state, safe to share with the status
/// surface and the liveness task.
#[derive(Debug, Clone)]
pub struct LinkStatus(Arc<AtomicU8>);

impl LinkStatus {
    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }
}

/// How a single connection session ended.
enum SessionEnd {
    /// Shutdown was requested; the loop exits cleanly.
    Cancelled,
    /// Connect failed or an established link dropped.
    Failed { connected: bool, error: String },
}

/// Doubling backoff with a ceiling. Kept separate from the connection
/// loop so the reset-on-success rule is testable on its own.
#[derive(Debug)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    delay: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            delay: initial,
        }
    }

    /// The delay to wait now; the next one doubles, capped at the max.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        self.delay = (self.delay * 2).min(self.max);
        current
    }

    pub(crate) fn reset(&mut self) {
        self.delay = self.initial;
    }
}

/// Owns the bus subscription: connects in the background, resubscribes
/// on every reconnect, retries forever with capped exponential backoff,
/// and hands each publish to the registered handler one at a time.
pub struct ConnectionManager {
    config: ConnectionConfig,
    handler: Arc<dyn RawMessageHandler>,
    status: Arc<AtomicU8>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, handler: Arc<dyn RawMessageHandler>) -> Self {
        Self {
            config,
            handler,
            status: Arc::new(AtomicU8::new(LinkState::Disconnected as u8)),
            shutdown: CancellationToken::new(),
            task: None,
        }
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus(Arc::clone(&self.status))
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Spawn the connection task. Does not block; returns immediately.
    pub fn start(&mut self) {
        if self.task.is_some() {
            warn!("connection manager already running");
            return;
        }
        info!(
            broker = %format_args!("{}:{}", self.config.broker_host, self.config.broker_port),
            topic = %self.config.topic,
            "starting bus connection"
        );
        let config = self.config.clone();
        let handler = Arc::clone(&self.handler);
        let status = Arc::clone(&self.status);
        let token = self.shutdown.clone();
        self.task = Some(tokio::spawn(run_connection_loop(
            config, handler, status, token,
        )));
    }

    /// Signal the connection task and wait (bounded) for it to finish.
    /// Idempotent; safe to call without `start()`.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(self.config.stop_timeout(), task)
                .await
                .is_err()
            {
                warn!("connection task did not stop within timeout");
            }
        }
        self.status
            .store(LinkState::Stopped as u8, Ordering::Relaxed);
        info!("bus connection stopped");
    }
}

async fn run_connection_loop(
    config: ConnectionConfig,
    handler: Arc<dyn RawMessageHandler>,
    status: Arc<AtomicU8>,
    shutdown: CancellationToken,
) {
    let mut backoff = Backoff::new(config.initial_backoff(), config.max_backoff());

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match run_session(&config, &handler, &status, &shutdown).await {
            SessionEnd::Cancelled => break,
            SessionEnd::Failed { connected, error } => {
                status.store(LinkState::Disconnected as u8, Ordering::Relaxed);
                if connected {
                    // Any successful connect resets the backoff schedule.
                    backoff.reset();
                }
                let delay = backoff.next_delay();
                warn!(%error, delay_secs = delay.as_secs(), "bus connection lost, retrying");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    status.store(LinkState::Stopped as u8, Ordering::Relaxed);
    debug!("connection loop exited");
}

/// Drive one connection session until cancellation or failure. A fresh
/// client is built per session, so the subscription is re-issued on
/// every reconnect (the bus gives no persistent-session guarantee).
async fn run_session(
    config: &ConnectionConfig,
    handler: &Arc<dyn RawMessageHandler>,
    status: &Arc<AtomicU8>,
    shutdown: &CancellationToken,
) -> SessionEnd {
    status.store(LinkState::Connecting as u8, Ordering::Relaxed);

    let mut options = MqttOptions::new(
        &config.client_id,
        &config.broker_host,
        config.broker_port,
    );
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_clean_session(true);
    if !config.username.is_empty() {
        options.set_credentials(&config.username, &config.password);
    }

    let (client, mut eventloop) = AsyncClient::new(options, 100);
    let mut connected = false;

    // Queued by the client and sent right after CONNACK.
    if let Err(e) = client.subscribe(&config.topic, QoS::AtMostOnce).await {
        return SessionEnd::Failed {
            connected,
            error: format!("subscribe request failed: {e}"),
        };
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("shutdown signal received, disconnecting");
                let _ = client.disconnect().await;
                return SessionEnd::Cancelled;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        connected = true;
                        status.store(LinkState::Connected as u8, Ordering::Relaxed);
                        info!(topic = %config.topic, "connected to bus, subscription pending");
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!(topic = %config.topic, "subscription acknowledged");
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        // Sequential by construction: the next poll does
                        // not happen until the handler returns.
                        handler
                            .handle_message(RawMessage {
                                topic: publish.topic.clone(),
                                payload: publish.payload.to_vec(),
                                received_at: Utc::now(),
                            })
                            .await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return SessionEnd::Failed {
                            connected,
                            error: e.to_string(),
                        };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(300));
        let mut delays = Vec::new();
        for _ in 0..10 {
            delays.push(backoff.next_delay().as_secs());
        }
        assert_eq!(delays[..7], [5, 10, 20, 40, 80, 160, 300]);
        // Every later delay stays at the ceiling.
        assert!(delays.iter().all(|&d| d <= 300));
        assert_eq!(delays[9], 300);
    }

    #[test]
    fn backoff_resets_after_success() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(300));
        for _ in 0..6 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn link_state_round_trips_through_atomic_repr() {
        for state in [
            LinkState::Disconnected,
            LinkState::Connecting,
            LinkState::Connected,
            LinkState::Stopped,
        ] {
            assert_eq!(LinkState::from_u8(state as u8), state);
        }
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let handler = Arc::new(MockRawMessageHandler::new());
        let mut manager = ConnectionManager::new(ConnectionConfig::default(), handler);
        manager.stop().await;
        assert_eq!(manager.status().state(), LinkState::Stopped);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_joins_the_task() {
        let handler = Arc::new(MockRawMessageHandler::new());
        // Port 1 refuses immediately, so the task lives in its backoff
        // sleep when we cancel it.
        let config = ConnectionConfig {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1,
            initial_backoff_secs: 60,
            stop_timeout_secs: 5,
            ..Default::default()
        };
        let mut manager = ConnectionManager::new(config, handler);
        manager.start();
        assert!(!manager.is_connected());

        manager.stop().await;
        assert_eq!(manager.status().state(), LinkState::Stopped);
        // Second stop must not hang or panic.
        manager.stop().await;
        assert_eq!(manager.status().state(), LinkState::Stopped);
    }

    #[tokio::test]
    async fn start_twice_keeps_one_task() {
        let handler = Arc::new(MockRawMessageHandler::new());
        let config = ConnectionConfig {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1,
            initial_backoff_secs: 60,
            ..Default::default()
        };
        let mut manager = ConnectionManager::new(config, handler);
        manager.start();
        manager.start();
        manager.stop().await;
    }
}
