//! Boundedness utility.

/// Limit `value` to the closed interval `[lo, hi]`.
///
/// ```
/// use gkc_hal::bounds::clamp;
///
/// assert_eq!(clamp(50.0_f32, -2.0, 10.0), 10.0);
/// assert_eq!(clamp(-7, -2, 10), -2);
/// assert_eq!(clamp(3, -2, 10), 3);
/// ```
pub fn clamp<T: PartialOrd>(value: T, lo: T, hi: T) -> T {
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        assert_eq!(clamp(10.0_f32, -2.0, 10.0), 10.0);
        assert_eq!(clamp(-2.0_f32, -2.0, 10.0), -2.0);
    }

    #[test]
    fn degenerate_interval_pins_value() {
        assert_eq!(clamp(5, 0, 0), 0);
        assert_eq!(clamp(-5, 0, 0), 0);
    }
}
