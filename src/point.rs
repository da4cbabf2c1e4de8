use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HOURS_PER_DAY: f64 = 24.0;
pub const MAX_BRIGHTNESS: u8 = 100;

// --- Default Schedule ---
// Points are (hour_of_day, brightness_pct)

const DEFAULT_POINTS: &[(f64, u8)] = &[
    (0.0, 10),  // Night low
    (6.0, 30),  // Dawn rise
    (8.0, 70),  // Morning
    (12.0, 90), // Midday peak
    (18.0, 80), // Evening
    (21.0, 40), // Dusk fall
    (23.0, 15), // Night fall
];

/// A fixed (hour, brightness) pair the schedule curve passes through.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    /// Hour of day, 0.0 (midnight) up to 24.0 (midnight next day).
    pub hour: f64,
    /// Brightness percentage, 0..=100.
    pub brightness: u8,
}

#[derive(Debug, Error, PartialEq)]
pub enum PointError {
    #[error("hour must be within 0..=24, got {0}")]
    HourOutOfRange(f64),

    #[error("brightness must be within 0..=100, got {0}")]
    BrightnessOutOfRange(i64),
}

impl AnchorPoint {
    pub const fn new(hour: f64, brightness: u8) -> Self {
        Self { hour, brightness }
    }

    /// Build a point from raw user input, rejecting values outside the
    /// hour and brightness domains.
    ///
    /// The store itself trusts its input; this is for the layer that
    /// accepts points from users.
    pub fn validated(hour: f64, brightness: i64) -> Result<Self, PointError> {
        if !hour.is_finite() || !(0.0..=HOURS_PER_DAY).contains(&hour) {
            return Err(PointError::HourOutOfRange(hour));
        }
        let brightness = u8::try_from(brightness)
            .ok()
            .filter(|b| *b <= MAX_BRIGHTNESS)
            .ok_or(PointError::BrightnessOutOfRange(brightness))?;
        Ok(Self::new(hour, brightness))
    }

    pub(crate) fn shifted(&self, hours: f64) -> Self {
        Self::new(self.hour + hours, self.brightness)
    }
}

/// The 7 point day curve a new schedule starts with.
pub fn default_points() -> Vec<AnchorPoint> {
    DEFAULT_POINTS
        .iter()
        .map(|&(hour, brightness)| AnchorPoint::new(hour, brightness))
        .collect()
}
