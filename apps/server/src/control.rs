use std::sync::Arc;

use chrono::Local;
use light_protocol::light::set_light;
use thiserror::Error;

use crate::reports::LightStates;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("light {0} not found or not reporting")]
    Unavailable(String),

    #[error("failed to send command to {addr}: {reason}")]
    Send { addr: String, reason: String },
}

/// Device side of a scheduler instance.
pub trait LightControl: Send + Sync {
    /// Current brightness percentage, 0 while the light is off.
    fn current_brightness(&self) -> Result<u8, ControlError>;

    /// Switch the light off for 0, otherwise on at `brightness` percent.
    fn set_brightness(&self, brightness: u8) -> Result<(), ControlError>;
}

/// Fixture reachable over UDP, whose state comes from its own reports.
pub struct UdpLight {
    address: String,
    device_id: u32,
    states: Arc<LightStates>,
}

impl UdpLight {
    pub fn new(address: String, device_id: u32, states: Arc<LightStates>) -> Self {
        Self {
            address,
            device_id,
            states,
        }
    }
}

impl LightControl for UdpLight {
    fn current_brightness(&self) -> Result<u8, ControlError> {
        self.states
            .fresh(self.device_id, Local::now())
            .map(|reading| reading.brightness())
            .ok_or_else(|| ControlError::Unavailable(format!("{} (device {})", self.address, self.device_id)))
    }

    fn set_brightness(&self, brightness: u8) -> Result<(), ControlError> {
        set_light(&self.address, brightness).map_err(|e| ControlError::Send {
            addr: self.address.clone(),
            reason: format!("{:#}", e),
        })
    }
}
