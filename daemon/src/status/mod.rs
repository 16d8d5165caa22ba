//! Device status polling
//!
//! Keeps a shared snapshot of the control server's `/status` so the IPC
//! server can report it and the voice pipeline can read the current
//! brightness.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::control::{ControlApi, DeviceStatus};

/// Last known device state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// The last poll succeeded
    pub reachable: bool,
    pub status: DeviceStatus,
    /// Error from the last failed poll
    pub last_error: Option<String>,
}

pub type SharedDevice = Arc<RwLock<DeviceSnapshot>>;

pub fn shared_device() -> SharedDevice {
    Arc::new(RwLock::new(DeviceSnapshot::default()))
}

pub struct StatusPoller {
    client: Arc<dyn ControlApi>,
    device: SharedDevice,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(client: Arc<dyn ControlApi>, device: SharedDevice, interval: Duration) -> Self {
        Self { client, device, interval }
    }

    /// Poll forever at the configured interval
    pub async fn run(&self) {
        info!(interval_ms = self.interval.as_millis() as u64, "status poller started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    pub async fn poll_once(&self) {
        match self.client.status().await {
            Ok(status) => {
                let mut device = self.device.write().await;
                if !device.reachable {
                    info!(connected = status.connected, "control server reachable");
                }
                debug!(?status, "status polled");
                device.reachable = true;
                device.status = status;
                device.last_error = None;
            }
            Err(e) => {
                let mut device = self.device.write().await;
                // Log once per outage
                if device.reachable || device.last_error.is_none() {
                    warn!(error = %e, "control server unreachable");
                }
                device.reachable = false;
                device.last_error = Some(e.to_string());
            }
        }
    }
}
