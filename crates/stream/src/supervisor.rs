//! Background watcher for the broker connection.
//!
//! The `Supervisor` follows the [`ConnectionState`] channel, logs every
//! transition, and stops when cancelled or when the client closes for good.
//! It does not reconnect anything itself; `async-nats` does that. Its job is
//! to make the connection's health visible in the logs for the whole
//! lifetime of the process.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::state::ConnectionState;

#[derive(Debug, Clone)]
pub struct Supervisor {
    state_rx: watch::Receiver<ConnectionState>,
    cancel_token: CancellationToken,
}

impl Supervisor {
    pub fn new(state_rx: watch::Receiver<ConnectionState>, cancel_token: CancellationToken) -> Self {
        Self {
            state_rx,
            cancel_token,
        }
    }

    /// Spawns the monitoring loop and returns its handle.
    pub fn monitor(&self) -> tokio::task::JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.run_monitor_loop().await })
    }

    async fn run_monitor_loop(mut self) {
        info!(
            "Supervisor monitoring started (state: {})",
            *self.state_rx.borrow()
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Supervisor shutting down due to cancellation");
                    break;
                }
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        warn!("Connection state channel closed, supervisor exiting");
                        break;
                    }

                    let state = self.state_rx.borrow_and_update().clone();
                    match &state {
                        ConnectionState::Connected => info!("Broker connection: {}", state),
                        ConnectionState::Disconnected(_) => warn!("Broker connection: {}", state),
                        ConnectionState::Closed => {
                            error!("Broker connection closed permanently");
                            break;
                        }
                        ConnectionState::Connecting => {}
                    }
                }
            }
        }

        info!("Supervisor monitoring stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_supervisor_stops_on_cancel() {
        let (_tx, rx) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();
        let handle = Supervisor::new(rx, cancel.clone()).monitor();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("supervisor should stop after cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_supervisor_stops_on_closed() {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        let handle = Supervisor::new(rx, CancellationToken::new()).monitor();

        tx.send(ConnectionState::Connected).unwrap();
        tx.send(ConnectionState::Closed).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("supervisor should stop once the connection is closed")
            .unwrap();
    }
}
