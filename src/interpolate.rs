use chrono::Timelike;

use crate::point::{AnchorPoint, HOURS_PER_DAY, MAX_BRIGHTNESS};

/// Brightness returned for a schedule without any points.
pub const EMPTY_SCHEDULE_BRIGHTNESS: u8 = 50;

/// Cubic smoothstep, flat at both ends so the curve has no kinks at anchors.
fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

// Sorted points repeated for the previous, current and next day, so that
// any hour of the current day has a neighbour on both sides.
fn extended_sequence(points: &[AnchorPoint]) -> Vec<AnchorPoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.hour.total_cmp(&b.hour));

    [-HOURS_PER_DAY, 0.0, HOURS_PER_DAY]
        .into_iter()
        .flat_map(|shift| sorted.iter().map(move |point| point.shifted(shift)))
        .collect()
}

/// Unrounded brightness of the schedule curve at `hour`, clamped to 0..=100.
pub fn curve_value(hour: f64, points: &[AnchorPoint]) -> f64 {
    let extended = extended_sequence(points);
    let (Some(&first), Some(&last)) = (extended.first(), extended.last()) else {
        return f64::from(EMPTY_SCHEDULE_BRIGHTNESS);
    };

    let (before, after) = extended
        .windows(2)
        .find(|pair| pair[0].hour <= hour && hour <= pair[1].hour)
        .map_or((first, last), |pair| (pair[0], pair[1]));

    if before.hour == after.hour {
        return f64::from(before.brightness);
    }

    let progress = (hour - before.hour) / (after.hour - before.hour);
    let start = f64::from(before.brightness);
    let end = f64::from(after.brightness);
    let brightness = start + (end - start) * smoothstep(progress);

    brightness.clamp(0.0, f64::from(MAX_BRIGHTNESS))
}

/// Target brightness percentage for `hour` (0.0..24.0) under `points`.
///
/// Points may be given in any order. An empty schedule yields
/// [`EMPTY_SCHEDULE_BRIGHTNESS`].
pub fn compute_target(hour: f64, points: &[AnchorPoint]) -> u8 {
    // Float to int casts saturate, the clamp above keeps this in 0..=100.
    curve_value(hour, points).round() as u8
}

/// Fractional hour of day for a clock time, e.g. 06:30:00 -> 6.5.
pub fn hour_of_day<T: Timelike>(time: &T) -> f64 {
    f64::from(time.hour()) + f64::from(time.minute()) / 60.0 + f64::from(time.second()) / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::default_points;
    use chrono::NaiveTime;

    fn points(raw: &[(f64, u8)]) -> Vec<AnchorPoint> {
        raw.iter().map(|&(h, b)| AnchorPoint::new(h, b)).collect()
    }

    fn sweep(step: f64) -> impl Iterator<Item = f64> {
        (0..).map(move |i| i as f64 * step).take_while(|h| *h < HOURS_PER_DAY)
    }

    #[test]
    fn empty_schedule_falls_back() {
        assert_eq!(compute_target(0.0, &[]), 50);
        assert_eq!(compute_target(13.7, &[]), 50);
        assert_eq!(compute_target(23.99, &[]), 50);
    }

    #[test]
    fn single_point_is_flat() {
        let schedule = points(&[(7.0, 42)]);
        for hour in sweep(0.25) {
            assert_eq!(compute_target(hour, &schedule), 42, "hour {hour}");
        }
    }

    #[test]
    fn default_schedule_examples() {
        let schedule = default_points();
        assert_eq!(compute_target(12.0, &schedule), 90);

        let at_three = compute_target(3.0, &schedule);
        assert!(at_three > 10 && at_three < 30, "got {at_three}");
        // Halfway between anchors smoothstep is exactly halfway.
        assert_eq!(at_three, 20);
    }

    #[test]
    fn anchors_are_recovered() {
        let schedule = points(&[(0.0, 10), (5.25, 3), (9.0, 100), (14.5, 0), (22.0, 61)]);
        for point in &schedule {
            assert_eq!(compute_target(point.hour, &schedule), point.brightness);
        }
        for point in default_points() {
            assert_eq!(compute_target(point.hour, &default_points()), point.brightness);
        }
    }

    #[test]
    fn result_stays_in_range() {
        let schedules = [
            default_points(),
            points(&[(0.0, 0), (12.0, 100)]),
            points(&[(3.0, 100), (3.4, 0), (20.0, 100)]),
            points(&[(23.9, 0), (0.1, 100)]),
        ];
        for schedule in &schedules {
            for hour in sweep(0.01) {
                let value = compute_target(hour, schedule);
                assert!(value <= 100, "hour {hour} gave {value}");
            }
        }
    }

    #[test]
    fn monotonic_between_anchors() {
        let schedule = default_points();
        let mut previous = compute_target(6.0, &schedule);
        let mut hour = 6.0;
        while hour <= 8.0 {
            let value = compute_target(hour, &schedule);
            assert!(value >= previous, "dropped at {hour}: {previous} -> {value}");
            previous = value;
            hour += 0.01;
        }

        // Falling segment 18h (80%) -> 21h (40%).
        let mut previous = curve_value(18.0, &schedule);
        let mut hour = 18.0;
        while hour <= 21.0 {
            let value = curve_value(hour, &schedule);
            assert!(value <= previous, "rose at {hour}");
            previous = value;
            hour += 0.01;
        }
    }

    #[test]
    fn flat_at_anchors() {
        let schedule = default_points();
        let eps = 1e-4;
        for anchor in [6.0, 8.0, 12.0, 18.0, 21.0] {
            let at = curve_value(anchor, &schedule);
            let left = (curve_value(anchor - eps, &schedule) - at).abs();
            let right = (curve_value(anchor + eps, &schedule) - at).abs();
            // A linear blend would move by roughly slope * eps here.
            assert!(left < eps * 0.01, "left slope at {anchor}: {left}");
            assert!(right < eps * 0.01, "right slope at {anchor}: {right}");
        }
    }

    #[test]
    fn blends_across_midnight() {
        let schedule = points(&[(1.0, 20), (23.0, 80)]);
        // Midnight sits halfway between 23h and 1h of the next day.
        assert_eq!(compute_target(0.0, &schedule), 50);

        let late = compute_target(23.9, &schedule);
        let early = compute_target(0.1, &schedule);
        assert!(late > 50 && late < 80, "23.9 gave {late}");
        assert!(early > 20 && early < 50, "0.1 gave {early}");

        let mut previous = curve_value(23.0, &schedule);
        for step in 1..=200 {
            let hour = (23.0 + f64::from(step) * 0.01) % HOURS_PER_DAY;
            let value = curve_value(hour, &schedule);
            assert!((value - previous).abs() < 1.0, "jump at {hour}");
            previous = value;
        }
    }

    #[test]
    fn order_of_points_does_not_matter() {
        let sorted = default_points();
        let mut shuffled = sorted.clone();
        shuffled.reverse();
        shuffled.swap(1, 4);
        for hour in sweep(0.1) {
            assert_eq!(compute_target(hour, &sorted), compute_target(hour, &shuffled));
        }
    }

    #[test]
    fn coincident_anchors_use_the_first() {
        let schedule = points(&[(5.0, 10), (5.0, 90)]);
        assert_eq!(compute_target(5.0 - HOURS_PER_DAY, &schedule), 10);
    }

    #[test]
    fn repeated_calls_agree() {
        let schedule = default_points();
        let first = curve_value(15.123, &schedule);
        for _ in 0..10 {
            assert_eq!(curve_value(15.123, &schedule), first);
        }
    }

    #[test]
    fn hour_of_day_is_fractional() {
        let time = NaiveTime::from_hms_opt(6, 30, 36).unwrap();
        assert!((hour_of_day(&time) - 6.51).abs() < 1e-9);
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        assert_eq!(hour_of_day(&midnight), 0.0);
    }
}
