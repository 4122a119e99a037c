pub const MINUTES_IN_DAY: i64 = 24 * 60;
pub const MIN_BLOCK_DURATION_MINUTES: i64 = 15;

/// Forces a minute pair into a well-formed block range: the start lands in
/// `[0, 1425]`, the end in `[start + 15, 1440]`. Total and idempotent.
pub fn clamp_range(start: i64, end: i64) -> (i64, i64) {
    let start = start.clamp(0, MINUTES_IN_DAY - MIN_BLOCK_DURATION_MINUTES);
    let end = end.clamp(start + MIN_BLOCK_DURATION_MINUTES, MINUTES_IN_DAY);
    (start, end)
}

/// Rounds a minute to the nearest quarter hour within the day. Only the
/// interactive resize path snaps; persisted writes keep exact minutes.
pub fn snap_to_quarter_hour(minute: i64) -> i64 {
    let clamped = minute.clamp(0, MINUTES_IN_DAY);
    (clamped + 7) / 15 * 15
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clamp_range_keeps_valid_range_unchanged() {
        assert_eq!(clamp_range(540, 600), (540, 600));
        assert_eq!(clamp_range(0, 15), (0, 15));
        assert_eq!(clamp_range(1425, 1440), (1425, 1440));
    }

    #[test]
    fn clamp_range_repairs_inverted_range() {
        assert_eq!(clamp_range(600, 540), (600, 615));
    }

    #[test]
    fn clamp_range_pins_overflowing_start() {
        assert_eq!(clamp_range(2000, 2100), (1425, 1440));
        assert_eq!(clamp_range(-30, -10), (0, 15));
    }

    #[test]
    fn snap_rounds_to_nearest_quarter_hour() {
        assert_eq!(snap_to_quarter_hour(0), 0);
        assert_eq!(snap_to_quarter_hour(7), 0);
        assert_eq!(snap_to_quarter_hour(8), 15);
        assert_eq!(snap_to_quarter_hour(22), 15);
        assert_eq!(snap_to_quarter_hour(23), 30);
        assert_eq!(snap_to_quarter_hour(1439), 1440);
        assert_eq!(snap_to_quarter_hour(5000), 1440);
        assert_eq!(snap_to_quarter_hour(-50), 0);
    }

    proptest! {
        #[test]
        fn clamp_range_always_yields_valid_block_range(
            start in -10_000i64..10_000,
            end in -10_000i64..10_000
        ) {
            let (clamped_start, clamped_end) = clamp_range(start, end);
            prop_assert!(clamped_start >= 0);
            prop_assert!(clamped_end <= MINUTES_IN_DAY);
            prop_assert!(clamped_end - clamped_start >= MIN_BLOCK_DURATION_MINUTES);
        }

        #[test]
        fn clamp_range_is_idempotent(
            start in -10_000i64..10_000,
            end in -10_000i64..10_000
        ) {
            let first = clamp_range(start, end);
            let second = clamp_range(first.0, first.1);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn snap_always_lands_on_quarter_hour_in_day(minute in -10_000i64..10_000) {
            let snapped = snap_to_quarter_hour(minute);
            prop_assert!(snapped % 15 == 0);
            prop_assert!((0..=MINUTES_IN_DAY).contains(&snapped));
        }
    }
}
