//! One scheduler instance: its schedule, its light and its refresh loop.
//!
//! The loop recomputes the target brightness on a timer and whenever the
//! schedule changes, and keeps the last result for status queries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use light_schedule::{
    compute_target, default_points, hour_of_day, AnchorPoint, PointError, ScheduleListener,
    ScheduleStore,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use crate::config::{update_interval, InstanceId, LightConfig};
use crate::control::{ControlError, LightControl};
use crate::state::{InstanceState, StateFile};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("light {0} not found or not reporting")]
    LightUnavailable(String),

    #[error("update failed: {0}")]
    Control(ControlError),
}

impl From<ControlError> for RefreshError {
    fn from(e: ControlError) -> Self {
        match e {
            ControlError::Unavailable(light) => RefreshError::LightUnavailable(light),
            other => RefreshError::Control(other),
        }
    }
}

/// Result of the last successful refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshData {
    pub current_hour: f64,
    pub target_brightness: u8,
    pub current_brightness: u8,
    pub schedule_points: Vec<AnchorPoint>,
    pub last_update: DateTime<Local>,
}

/// Status attributes of an instance as reported by the API.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub id: InstanceId,
    pub name: String,
    pub target_light: String,
    /// The scheduler itself is always active.
    pub is_on: bool,
    /// Target brightness on the 0..=255 scale.
    pub brightness: Option<u8>,
    pub target_brightness_pct: Option<u8>,
    pub current_brightness_pct: Option<u8>,
    pub current_hour: Option<f64>,
    pub schedule_points: Vec<AnchorPoint>,
    pub schedule_point_count: usize,
    pub last_update: Option<DateTime<Local>>,
    pub last_error: Option<String>,
    pub update_interval: u64,
}

#[derive(Debug, Default)]
struct LastRefresh {
    data: Option<RefreshData>,
    error: Option<String>,
}

// Persists the points and wakes the refresh loop after every change.
struct ScheduleChanged {
    id: InstanceId,
    state: Option<Arc<StateFile>>,
    interval_secs: Arc<AtomicU64>,
    trigger: Arc<Notify>,
}

impl ScheduleListener for ScheduleChanged {
    fn schedule_changed(&self, points: &[AnchorPoint]) {
        if let Some(state) = &self.state {
            let instance = InstanceState {
                schedule_points: points.to_vec(),
                update_interval: self.interval_secs.load(Ordering::Relaxed),
            };
            state.save_in_background(&self.id, instance);
        }
        self.trigger.notify_one();
    }
}

// Persisted points go through the same checks as API input.
fn restored_points(points: &[AnchorPoint]) -> Result<Vec<AnchorPoint>, PointError> {
    points
        .iter()
        .map(|p| AnchorPoint::validated(p.hour, i64::from(p.brightness)))
        .collect()
}

pub struct Coordinator {
    id: InstanceId,
    name: String,
    target_light: String,
    store: Mutex<ScheduleStore>,
    light: Arc<dyn LightControl>,
    interval_secs: Arc<AtomicU64>,
    trigger: Arc<Notify>,
    state: Option<Arc<StateFile>>,
    last: RwLock<LastRefresh>,
}

impl Coordinator {
    /// Build an instance; points and interval persisted in `state` take
    /// precedence over the defaults and the configured interval.
    pub fn new(
        config: &LightConfig,
        light: Arc<dyn LightControl>,
        state: Option<Arc<StateFile>>,
    ) -> Arc<Self> {
        let persisted = state.as_ref().and_then(|state| state.instance(&config.id));

        let interval = match persisted.as_ref().map(|p| update_interval(p.update_interval)) {
            Some(Ok(interval)) => interval,
            Some(Err(e)) => {
                warn!(instance = %config.id, error = %e, "ignoring persisted refresh interval");
                config.update_interval
            }
            None => config.update_interval,
        };
        let interval_secs = Arc::new(AtomicU64::new(interval.as_secs()));
        let trigger = Arc::new(Notify::new());

        let points = match persisted.map(|p| restored_points(&p.schedule_points)) {
            Some(Ok(points)) => points,
            Some(Err(e)) => {
                warn!(instance = %config.id, error = %e, "ignoring persisted schedule");
                default_points()
            }
            None => default_points(),
        };
        let store = ScheduleStore::new(points).with_listener(ScheduleChanged {
            id: config.id.clone(),
            state: state.clone(),
            interval_secs: interval_secs.clone(),
            trigger: trigger.clone(),
        });

        Arc::new(Self {
            id: config.id.clone(),
            name: config.name.clone(),
            target_light: config.address.clone(),
            store: Mutex::new(store),
            light,
            interval_secs,
            trigger,
            state,
            last: RwLock::new(LastRefresh::default()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn points(&self) -> Vec<AnchorPoint> {
        self.store.lock().await.points().to_vec()
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.load(Ordering::Relaxed))
    }

    /// Replace the whole schedule, persist it and refresh right away.
    pub async fn update_schedule(&self, points: Vec<AnchorPoint>) {
        let count = points.len();
        self.store.lock().await.replace_all(points);
        info!(instance = %self.id, count, "updated schedule");
    }

    /// Set or move a single point, persist and refresh right away.
    pub async fn set_schedule_point(&self, hour: f64, brightness: u8) {
        let mut store = self.store.lock().await;
        store.set_point(hour, brightness);
        info!(instance = %self.id, hour, brightness, count = store.points().len(), "set schedule point");
    }

    /// Change the refresh interval; takes effect on the next wait.
    pub async fn set_update_interval(&self, interval: Duration) {
        // Hold the store so the persisted points match the stored ones.
        let store = self.store.lock().await;
        self.interval_secs.store(interval.as_secs(), Ordering::Relaxed);

        if let Some(state) = &self.state {
            let instance = InstanceState {
                schedule_points: store.points().to_vec(),
                update_interval: interval.as_secs(),
            };
            state.save_in_background(&self.id, instance);
        }
        info!(instance = %self.id, secs = interval.as_secs(), "updated refresh interval");
        self.trigger.notify_one();
    }

    /// Ask the loop to refresh now instead of at the next tick.
    pub fn request_refresh(&self) {
        self.trigger.notify_one();
    }

    /// Compute the target for `now` and push it to the light if it differs
    /// by at least one percent.
    pub async fn refresh_at(&self, now: DateTime<Local>) -> Result<RefreshData, RefreshError> {
        let current_hour = hour_of_day(&now);
        let schedule_points = self.points().await;
        let target_brightness = compute_target(current_hour, &schedule_points);

        let current_brightness = self.light.current_brightness()?;
        if target_brightness.abs_diff(current_brightness) >= 1 {
            self.light.set_brightness(target_brightness)?;
            debug!(
                instance = %self.id,
                from = current_brightness,
                to = target_brightness,
                "set light brightness"
            );
        }

        Ok(RefreshData {
            current_hour,
            target_brightness,
            current_brightness,
            schedule_points,
            last_update: now,
        })
    }

    /// Refresh and keep the outcome for [`Coordinator::status`].
    pub async fn refresh_and_record(&self, now: DateTime<Local>) {
        let result = self.refresh_at(now).await;
        let mut last = self.last.write().await;
        match result {
            Ok(data) => {
                last.data = Some(data);
                last.error = None;
            }
            Err(e) => {
                warn!(instance = %self.id, error = %e, "refresh failed");
                last.error = Some(e.to_string());
            }
        }
    }

    pub async fn last_refresh(&self) -> Option<RefreshData> {
        self.last.read().await.data.clone()
    }

    pub async fn status(&self) -> InstanceStatus {
        let schedule_points = self.points().await;
        let last = self.last.read().await;
        let data = last.data.as_ref();
        let target = data.map(|d| d.target_brightness);

        InstanceStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            target_light: self.target_light.clone(),
            is_on: true,
            brightness: target.map(|pct| (f64::from(pct) * 255.0 / 100.0).round() as u8),
            target_brightness_pct: target,
            current_brightness_pct: data.map(|d| d.current_brightness),
            current_hour: data.map(|d| (d.current_hour * 100.0).round() / 100.0),
            schedule_point_count: schedule_points.len(),
            schedule_points,
            last_update: data.map(|d| d.last_update),
            last_error: last.error.clone(),
            update_interval: self.interval_secs.load(Ordering::Relaxed),
        }
    }

    /// Refresh forever: once at start, then after every interval or trigger.
    pub async fn run(self: Arc<Self>) {
        info!(instance = %self.id, light = %self.target_light, "scheduler started");
        loop {
            self.refresh_and_record(Local::now()).await;
            tokio::select! {
                _ = tokio::time::sleep(self.update_interval()) => {}
                _ = self.trigger.notified() => debug!(instance = %self.id, "refresh requested"),
            }
        }
    }
}
