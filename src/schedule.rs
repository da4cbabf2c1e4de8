use crate::interpolate::compute_target;
use crate::point::{default_points, AnchorPoint};

/// Points closer than this (in hours) are treated as the same time slot.
pub const SLOT_TOLERANCE: f64 = 0.5;

/// Receives the full point set after every schedule mutation.
pub trait ScheduleListener: Send + Sync {
    fn schedule_changed(&self, points: &[AnchorPoint]);
}

/// Owns the anchor points of one schedule.
///
/// Input is trusted: range checks belong to whoever accepts points from
/// users (see [`AnchorPoint::validated`]).
pub struct ScheduleStore {
    points: Vec<AnchorPoint>,
    listener: Option<Box<dyn ScheduleListener>>,
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new(default_points())
    }
}

impl std::fmt::Debug for ScheduleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleStore")
            .field("points", &self.points)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl ScheduleStore {
    pub fn new(points: Vec<AnchorPoint>) -> Self {
        Self { points, listener: None }
    }

    pub fn with_listener(mut self, listener: impl ScheduleListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn points(&self) -> &[AnchorPoint] {
        &self.points
    }

    /// Target brightness for `hour` under the current points.
    pub fn target_at(&self, hour: f64) -> u8 {
        compute_target(hour, &self.points)
    }

    /// Replace the whole schedule.
    pub fn replace_all(&mut self, points: Vec<AnchorPoint>) {
        self.points = points;
        if let Some(listener) = &self.listener {
            listener.schedule_changed(&self.points);
        }
    }

    /// Set the brightness for one time slot.
    ///
    /// The first point less than [`SLOT_TOLERANCE`] hours away is
    /// overwritten in place. Otherwise the point is added and the schedule
    /// re-sorted by hour. Distance is plain `|a - b|`, so 23.9 and 0.1 are
    /// separate slots.
    pub fn set_point(&mut self, hour: f64, brightness: u8) {
        let new_point = AnchorPoint::new(hour, brightness);
        let mut points = std::mem::take(&mut self.points);

        match points
            .iter()
            .position(|point| (point.hour - hour).abs() < SLOT_TOLERANCE)
        {
            Some(index) => points[index] = new_point,
            None => {
                points.push(new_point);
                points.sort_by(|a, b| a.hour.total_cmp(&b.hour));
            }
        }

        self.replace_all(points);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Vec<AnchorPoint>>>>,
    }

    impl ScheduleListener for Recorder {
        fn schedule_changed(&self, points: &[AnchorPoint]) {
            self.calls.lock().unwrap().push(points.to_vec());
        }
    }

    fn store(raw: &[(f64, u8)]) -> ScheduleStore {
        ScheduleStore::new(raw.iter().map(|&(h, b)| AnchorPoint::new(h, b)).collect())
    }

    #[test]
    fn starts_with_defaults() {
        let store = ScheduleStore::default();
        assert_eq!(store.points(), default_points().as_slice());
        assert_eq!(store.target_at(12.0), 90);
    }

    #[test]
    fn nearby_point_is_replaced() {
        let mut store = store(&[(10.0, 50)]);
        store.set_point(10.3, 80);
        assert_eq!(store.points(), &[AnchorPoint::new(10.3, 80)]);
    }

    #[test]
    fn distant_point_is_appended_in_order() {
        let mut store = store(&[(10.0, 50)]);
        store.set_point(15.0, 80);
        store.set_point(4.0, 20);
        assert_eq!(
            store.points(),
            &[
                AnchorPoint::new(4.0, 20),
                AnchorPoint::new(10.0, 50),
                AnchorPoint::new(15.0, 80),
            ]
        );
    }

    #[test]
    fn half_hour_apart_is_a_new_slot() {
        let mut store = store(&[(10.0, 50)]);
        store.set_point(10.5, 60);
        assert_eq!(store.points().len(), 2);
    }

    #[test]
    fn replacement_keeps_storage_order() {
        // Unsorted input stays unsorted when a point is overwritten.
        let mut store = store(&[(18.0, 80), (6.0, 30), (12.0, 90)]);
        store.set_point(6.2, 35);
        assert_eq!(
            store.points(),
            &[
                AnchorPoint::new(18.0, 80),
                AnchorPoint::new(6.2, 35),
                AnchorPoint::new(12.0, 90),
            ]
        );
    }

    #[test]
    fn first_match_wins() {
        let mut store = store(&[(10.0, 50), (10.4, 60)]);
        store.set_point(10.2, 70);
        assert_eq!(
            store.points(),
            &[AnchorPoint::new(10.2, 70), AnchorPoint::new(10.4, 60)]
        );
    }

    #[test]
    fn midnight_neighbours_are_not_merged() {
        let mut store = store(&[(23.9, 20)]);
        store.set_point(0.1, 40);
        assert_eq!(
            store.points(),
            &[AnchorPoint::new(0.1, 40), AnchorPoint::new(23.9, 20)]
        );
    }

    #[test]
    fn mutations_notify_listener() {
        let recorder = Recorder::default();
        let mut store = store(&[(10.0, 50)]).with_listener(recorder.clone());

        store.set_point(15.0, 80);
        store.replace_all(vec![AnchorPoint::new(1.0, 5)]);
        store.replace_all(Vec::new());

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            vec![AnchorPoint::new(10.0, 50), AnchorPoint::new(15.0, 80)]
        );
        assert_eq!(calls[1], vec![AnchorPoint::new(1.0, 5)]);
        assert!(calls[2].is_empty());
        assert_eq!(store.target_at(3.0), 50);
    }
}
