//! Gateway server: accept loop, live reconfiguration and drain.
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → spawn session task (serve_connection)
//!         → ServiceState (admission, rate limiter, limits, decoder)
//! Config update  → ServiceState::apply
//! Shutdown       → stop accepting → drain live sessions
//! ```

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::decode::Decoder;
use crate::net::{Listener, SessionId};
use crate::security::{AdmissionController, RateLimiter};
use crate::session::{serve_connection, SessionLimits};

/// How often the drain loop re-checks the live session count.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// State shared by every session of one server.
pub struct ServiceState<D> {
    pub admission: Arc<AdmissionController>,
    pub limiter: RateLimiter,
    limits: ArcSwap<SessionLimits>,
    pub decoder: D,
}

impl<D: Decoder> ServiceState<D> {
    pub fn new(config: &ServerConfig, decoder: D) -> Self {
        Self::from_parts(
            AdmissionController::new(config.sessions.max_users),
            RateLimiter::from_config(&config.rate_limit),
            SessionLimits::from_config(config),
            decoder,
        )
    }

    pub fn from_parts(
        admission: AdmissionController,
        limiter: RateLimiter,
        limits: SessionLimits,
        decoder: D,
    ) -> Self {
        Self {
            admission: Arc::new(admission),
            limiter,
            limits: ArcSwap::from_pointee(limits),
            decoder,
        }
    }

    /// Limits in force for the next request cycle.
    pub fn limits(&self) -> Arc<SessionLimits> {
        self.limits.load_full()
    }

    pub fn set_limits(&self, limits: SessionLimits) {
        self.limits.store(Arc::new(limits));
    }

    /// Push the reloadable parts of `config` into the live state.
    ///
    /// Sessions pick the new values up at their next request. Lowering
    /// `max_users` below the live count closes the surplus sessions as they
    /// next become active.
    pub fn apply(&self, config: &ServerConfig) {
        self.admission.set_max_users(config.sessions.max_users);
        self.limiter.set_policy(config.rate_limit.policy());
        self.set_limits(SessionLimits::from_config(config));
    }
}

pub struct Server<D> {
    state: Arc<ServiceState<D>>,
    config: ServerConfig,
}

impl<D: Decoder> Server<D> {
    pub fn new(config: ServerConfig, decoder: D) -> Self {
        let state = Arc::new(ServiceState::new(&config, decoder));
        Self { state, config }
    }

    pub fn state(&self) -> &Arc<ServiceState<D>> {
        &self.state
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(
        mut self,
        listener: Listener,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_users = self.config.sessions.max_users,
            max_requests = self.config.rate_limit.max_requests,
            window_secs = self.config.rate_limit.window_secs,
            "Server listening"
        );

        let mut updates_open = true;
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::error!(error = %e, "Accept failed");
                            continue;
                        }
                    };
                    let span = tracing::info_span!("session", id = %SessionId::new(), peer = %peer);
                    let state = Arc::clone(&self.state);
                    tokio::spawn(serve_connection(stream, peer, state).instrument(span));
                }
                update = config_updates.recv(), if updates_open => {
                    match update {
                        Some(config) => self.reload(config),
                        None => updates_open = false,
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);
        self.drain().await;
        Ok(())
    }

    fn reload(&mut self, config: ServerConfig) {
        if config == self.config {
            tracing::debug!("Configuration unchanged");
            return;
        }
        if config.listener != self.config.listener {
            tracing::warn!("Listener settings changed; restart required to take effect");
        }
        if config.rate_limit.registry_capacity != self.config.rate_limit.registry_capacity {
            tracing::warn!("Registry capacity changed; restart required to take effect");
        }

        self.state.apply(&config);
        tracing::info!(
            max_users = config.sessions.max_users,
            max_requests = config.rate_limit.max_requests,
            window_secs = config.rate_limit.window_secs,
            idle_timeout_secs = config.sessions.idle_timeout_secs,
            "Configuration reloaded"
        );
        self.config = config;
    }

    /// Wait for live sessions to finish, up to the drain timeout.
    async fn drain(&self) {
        let limit = Duration::from_secs(self.config.sessions.drain_timeout_secs);
        let deadline = tokio::time::Instant::now() + limit;

        loop {
            let active = self.state.admission.active();
            if active == 0 {
                tracing::info!("All sessions finished");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(active, "Drain timeout reached, abandoning live sessions");
                return;
            }
            tracing::debug!(active, "Waiting for sessions to finish");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::decode::DecodeError;

    struct NoopDecoder;

    impl Decoder for NoopDecoder {
        async fn decode(&self, _payload: &Path) -> Result<Option<String>, DecodeError> {
            Ok(None)
        }
    }

    #[test]
    fn apply_updates_live_limits() {
        let state = ServiceState::new(&ServerConfig::default(), NoopDecoder);
        assert_eq!(state.admission.max_users(), 3);

        let mut config = ServerConfig::default();
        config.sessions.max_users = 7;
        config.sessions.idle_timeout_secs = 5;
        config.rate_limit.max_requests = 9;
        config.transfer.max_payload_size = 10;
        state.apply(&config);

        assert_eq!(state.admission.max_users(), 7);
        assert_eq!(state.limiter.policy().max_requests, 9);
        assert_eq!(state.limits().idle_timeout, Duration::from_secs(5));
        assert_eq!(state.limits().max_payload_size, 10);
    }

    #[test]
    fn reload_ignores_identical_config() {
        let mut server = Server::new(ServerConfig::default(), NoopDecoder);
        let before = server.state().limits();
        server.reload(ServerConfig::default());
        assert!(Arc::ptr_eq(&before, &server.state().limits()));
    }

    #[tokio::test]
    async fn drain_returns_once_sessions_finish() {
        let mut config = ServerConfig::default();
        config.sessions.drain_timeout_secs = 5;
        let server = Server::new(config, NoopDecoder);

        let slot = server.state().admission.try_admit().unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            drop(slot);
        });

        let started = std::time::Instant::now();
        server.drain().await;
        release.await.unwrap();
        assert_eq!(server.state().admission.active(), 0);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
