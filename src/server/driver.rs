//! Async tick driver.
//!
//! Calls [`RelayListener::tick`] at a fixed rate on the current task until
//! told to stop. Missed ticks are skipped, which only delays delivery.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::config::ServerConfig;
use super::listener::{RelayListener, ServerError};
use super::session::Delivered;
use crate::core::{LinkFactory, RelaySocket};

/// Drives a listener at a fixed tick rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickDriver {
    period: Duration,
}

impl TickDriver {
    /// Driver ticking every `period` (at least one millisecond).
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Driver using `config.tick_rate_hz`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.tick_interval())
    }

    /// Time between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Tick `listener` until `shutdown` fires, `on_tick` breaks, or a tick fails.
    ///
    /// `on_tick` receives the payloads delivered by each tick (relay mode).
    /// The listener is shut down before returning. Returns the number of
    /// completed ticks.
    pub async fn run<S, F, H>(
        &self,
        listener: &mut RelayListener<S, F>,
        mut shutdown: oneshot::Receiver<()>,
        mut on_tick: H,
    ) -> Result<u64, ServerError>
    where
        S: RelaySocket,
        F: LinkFactory,
        H: FnMut(&mut RelayListener<S, F>, Vec<Delivered>) -> ControlFlow<()>,
    {
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(period_ms = self.period.as_millis() as u64, "tick driver started");

        let mut ticks = 0u64;
        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("tick driver shutdown requested");
                    break Ok(ticks);
                }
                _ = interval.tick() => {
                    let delivered = match listener.tick() {
                        Ok(delivered) => delivered,
                        Err(e) => break Err(e),
                    };
                    ticks += 1;
                    if on_tick(listener, delivered).is_break() {
                        break Ok(ticks);
                    }
                }
            }
        };

        listener.shutdown();
        info!(ticks, "tick driver stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConnectionId;
    use crate::server::mock::MockSocket;
    use crate::transport::PacketFramer;

    #[test]
    fn test_period_from_config() {
        let config = ServerConfig {
            tick_rate_hz: 50,
            ..ServerConfig::default()
        };
        assert_eq!(TickDriver::from_config(&config).period(), Duration::from_millis(20));
        assert_eq!(TickDriver::new(Duration::ZERO).period(), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_run_until_hook_breaks() {
        let socket = MockSocket::default();
        let mut listener = RelayListener::relay(socket.clone(), &ServerConfig::default()).unwrap();
        socket.connecting(1, 1);
        socket.message(1, PacketFramer::default().encode(b"hi").unwrap());

        let (_tx, rx) = oneshot::channel();
        let mut received = Vec::new();
        let ticks = TickDriver::new(Duration::from_millis(1))
            .run(&mut listener, rx, |_, delivered| {
                received.extend(delivered);
                if received.is_empty() {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            })
            .await
            .unwrap();

        assert!(ticks >= 1);
        assert_eq!(received[0].id, ConnectionId::new(1));
        assert!(listener.is_shut_down());
        assert_eq!(socket.closes.get(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let socket = MockSocket::default();
        let mut listener = RelayListener::relay(socket, &ServerConfig::default()).unwrap();

        let (tx, rx) = oneshot::channel();
        tx.send(()).unwrap();
        TickDriver::new(Duration::from_millis(5))
            .run(&mut listener, rx, |_, _| ControlFlow::Continue(()))
            .await
            .unwrap();
        assert!(listener.is_shut_down());
    }

    #[tokio::test]
    async fn test_run_fails_when_socket_invalid() {
        let socket = MockSocket::default();
        socket.invalid.set(true);
        let mut listener = RelayListener::relay(socket, &ServerConfig::default()).unwrap();

        let (_tx, rx) = oneshot::channel();
        let result = TickDriver::new(Duration::from_millis(1))
            .run(&mut listener, rx, |_, _| ControlFlow::Continue(()))
            .await;
        assert!(matches!(result, Err(ServerError::NotInitialized)));
        assert!(listener.is_shut_down());
    }
}
