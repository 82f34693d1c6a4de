//! Backend connection-status monitor.
//!
//! Polls `GET /health` right away and then at a fixed interval, publishing every result
//! as a `ConnectionStatus`. The monitor never fails: an unreachable backend is simply
//! `Offline`.

use crate::api::ClimateApiClient;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub type ConnectionCallback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Checking,
    Online,
    Offline,
}

impl ConnectionStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionStatus::Online)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Checking => "checking",
            ConnectionStatus::Online => "online",
            ConnectionStatus::Offline => "offline",
        };
        f.write_str(label)
    }
}

pub struct ConnectionMonitor {
    client: ClimateApiClient,
    interval: Duration,
    on_change: Option<ConnectionCallback>,
    state: watch::Sender<ConnectionStatus>,
}

impl ConnectionMonitor {
    pub fn new(client: ClimateApiClient, interval: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionStatus::Checking);
        Self {
            client,
            interval,
            on_change: None,
            state,
        }
    }

    /// Registers a callback invoked with the outcome of every check.
    pub fn with_callback(mut self, callback: ConnectionCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.state.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.state.borrow()
    }

    /// Runs one health check and publishes its outcome.
    pub async fn check_once(&self) -> ConnectionStatus {
        let healthy = self.client.health_check().await;
        let status = if healthy {
            ConnectionStatus::Online
        } else {
            ConnectionStatus::Offline
        };
        let previous = self.state.send_replace(status);
        if previous != status {
            info!("Backend connection: {} -> {}", previous, status);
        } else {
            debug!("Backend connection still {}", status);
        }
        if let Some(callback) = &self.on_change {
            callback(healthy);
        }
        status
    }

    /// Checks immediately and then every interval until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately
                ticker.tick().await;
                self.check_once().await;
            }
        })
    }
}
