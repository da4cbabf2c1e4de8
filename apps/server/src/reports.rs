use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use chrono::{DateTime, Duration, Local};
use light_protocol::fragment_combiner::{FragmentCombiner, MessageHandler};
use light_protocol::protos::light::DeviceMessage;
use light_schedule::point::MAX_BRIGHTNESS;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A fixture that has not reported for this long is considered gone.
pub const STALE_AFTER_SECS: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightReading {
    pub on: bool,
    pub brightness_pct: u8,
    pub seen_at: DateTime<Local>,
}

impl LightReading {
    /// Brightness as the scheduler sees it: 0 while the light is off.
    pub fn brightness(&self) -> u8 {
        if self.on {
            self.brightness_pct
        } else {
            0
        }
    }
}

/// Last reported state per device id.
#[derive(Debug, Default)]
pub struct LightStates {
    readings: RwLock<HashMap<u32, LightReading>>,
}

impl LightStates {
    pub fn record(&self, device_id: u32, reading: LightReading) {
        let mut readings = self.readings.write().unwrap_or_else(PoisonError::into_inner);
        readings.insert(device_id, reading);
    }

    pub fn get(&self, device_id: u32) -> Option<LightReading> {
        let readings = self.readings.read().unwrap_or_else(PoisonError::into_inner);
        readings.get(&device_id).copied()
    }

    /// The reading for `device_id` unless it is older than [`STALE_AFTER_SECS`].
    pub fn fresh(&self, device_id: u32, now: DateTime<Local>) -> Option<LightReading> {
        self.get(device_id)
            .filter(|reading| now - reading.seen_at <= Duration::seconds(STALE_AFTER_SECS))
    }
}

pub struct ReportHandler {
    states: Arc<LightStates>,
}

impl ReportHandler {
    pub fn new(states: Arc<LightStates>) -> Self {
        Self { states }
    }
}

impl MessageHandler<DeviceMessage> for ReportHandler {
    fn on_message(&mut self, src: SocketAddr, msg: DeviceMessage) -> anyhow::Result<()> {
        let Some(report) = msg.light.as_ref() else {
            warn!(%src, "message without light report");
            return Ok(());
        };
        let Some(info) = report.info.as_ref() else {
            warn!(%src, "light report without device info");
            return Ok(());
        };
        let Some(device_id) = info.id else {
            warn!(%src, "light report without id");
            return Ok(());
        };

        if info.started() {
            info!(%src, device_id, "light started");
        }
        if let Some(offline_sec) = info.offline_sec {
            info!(%src, device_id, offline_min = f64::from(offline_sec) / 60.0, "light was offline");
        }

        let brightness_pct = u8::try_from(report.brightness_pct())
            .unwrap_or(MAX_BRIGHTNESS)
            .min(MAX_BRIGHTNESS);
        let reading = LightReading {
            on: report.on(),
            brightness_pct,
            seen_at: Local::now(),
        };
        debug!(%src, device_id, on = reading.on, brightness_pct, "light report");
        self.states.record(device_id, reading);
        Ok(())
    }
}

/// Bind the report socket and receive reports on a blocking thread.
pub fn spawn_listener(
    bind_addr: &str,
    states: Arc<LightStates>,
) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
    let socket = UdpSocket::bind(bind_addr)
        .with_context(|| format!("Failed to bind report socket on {}", bind_addr))?;
    info!(%bind_addr, "listening for light reports");

    Ok(tokio::task::spawn_blocking(move || {
        FragmentCombiner::new(ReportHandler::new(states)).serve(&socket)
    }))
}
