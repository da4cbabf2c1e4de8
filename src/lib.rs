//! Time-of-day brightness schedules.
//!
//! A schedule is a small set of [`AnchorPoint`]s, each pinning a brightness
//! percentage to an hour of the day. [`compute_target`] turns the schedule
//! into a smooth curve over the 24 hour clock, blending across midnight.

pub mod interpolate;
pub mod point;
pub mod schedule;

pub use interpolate::{compute_target, curve_value, hour_of_day, EMPTY_SCHEDULE_BRIGHTNESS};
pub use point::{default_points, AnchorPoint, PointError};
pub use schedule::{ScheduleListener, ScheduleStore};
