//! Speed scales
//!
//! On the bus a loco speed is a value in `0..=126` where `0` means stopped.
//! Stations use 128 raw steps: `0` and `1` both mean "not moving", `1` being
//! the emergency stop, and `2..=127` are the moving steps.

use cs_client::MAX_SPEED128;

/// Highest bus speed.
pub const MAX_SPEED: u8 = 126;

/// Raw station value for an emergency stop.
pub const EMERGENCY_STOP: DeviceSpeed = DeviceSpeed(1);

/// Speed as seen on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Speed(u8);

impl Speed {
    pub const STOPPED: Speed = Speed(0);

    /// `None` when `speed` exceeds [`MAX_SPEED`].
    pub fn new(speed: u8) -> Option<Self> {
        (speed <= MAX_SPEED).then_some(Self(speed))
    }

    /// Clamp any integer into the bus range.
    pub fn saturating(speed: i64) -> Self {
        // the clamp bounds fit into u8
        Self(speed.clamp(0, i64::from(MAX_SPEED)) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Raw station value. Moving speeds skip the emergency stop step.
    pub fn to_device(self) -> DeviceSpeed {
        if self.0 == 0 {
            DeviceSpeed(0)
        } else {
            DeviceSpeed(self.0 + 1)
        }
    }

    /// Adjust by `delta`, clamped into the bus range.
    pub fn add(self, delta: i64) -> Self {
        Self::saturating(i64::from(self.0).saturating_add(delta))
    }
}

/// Raw 128-step station speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeviceSpeed(u8);

impl DeviceSpeed {
    /// `None` when `speed` exceeds the 128-step range.
    pub fn new(speed: u8) -> Option<Self> {
        (speed <= MAX_SPEED128).then_some(Self(speed))
    }

    /// Raw value reported by a station, clamped into the 128-step range.
    pub fn from_raw(speed: u8) -> Self {
        Self(speed.min(MAX_SPEED128))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn to_external(self) -> Speed {
        if self.0 <= 1 {
            Speed::STOPPED
        } else {
            Speed(self.0 - 1)
        }
    }

    /// Relative adjustment in the bus domain.
    pub fn add(self, delta: i64) -> Self {
        self.to_external().add(delta).to_device()
    }

    pub fn is_emergency_stop(self) -> bool {
        self == EMERGENCY_STOP
    }
}

impl From<Speed> for DeviceSpeed {
    fn from(speed: Speed) -> Self {
        speed.to_device()
    }
}

impl From<DeviceSpeed> for Speed {
    fn from(speed: DeviceSpeed) -> Self {
        speed.to_external()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(1, 2)]
    #[case(80, 81)]
    #[case(126, 127)]
    fn test_external_to_device(#[case] external: u8, #[case] device: u8) {
        assert_eq!(Speed::new(external).unwrap().to_device().value(), device);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 0)]
    #[case(2, 1)]
    #[case(81, 80)]
    #[case(127, 126)]
    fn test_device_to_external(#[case] device: u8, #[case] external: u8) {
        assert_eq!(DeviceSpeed::new(device).unwrap().to_external().value(), external);
    }

    #[test]
    fn test_range_checks() {
        assert!(Speed::new(127).is_none());
        assert!(DeviceSpeed::new(128).is_none());
        assert_eq!(DeviceSpeed::from_raw(200).value(), 127);
        assert!(EMERGENCY_STOP.is_emergency_stop());
        assert_eq!(EMERGENCY_STOP.to_external(), Speed::STOPPED);
    }

    #[test]
    fn test_add_clamps() {
        let speed = Speed::new(120).unwrap();
        assert_eq!(speed.add(10).value(), 126);
        assert_eq!(speed.add(-200).value(), 0);
        assert_eq!(speed.add(i64::MIN).value(), 0);
        assert_eq!(speed.add(i64::MAX).value(), 126);
        assert_eq!(DeviceSpeed::new(81).unwrap().add(-1).value(), 80);
        assert_eq!(EMERGENCY_STOP.add(1).value(), 2);
    }

    proptest! {
        #[test]
        fn prop_speed_round_trip(speed in 0u8..=MAX_SPEED) {
            let speed = Speed::new(speed).unwrap();
            prop_assert_eq!(speed.to_device().to_external(), speed);
        }

        #[test]
        fn prop_add_stays_in_range(speed in 0u8..=MAX_SPEED, delta in any::<i64>()) {
            let result = Speed::new(speed).unwrap().add(delta);
            prop_assert!(result.value() <= MAX_SPEED);
        }

        #[test]
        fn prop_device_add_never_emergency_stops(raw in 0u8..=MAX_SPEED128, delta in any::<i64>()) {
            let result = DeviceSpeed::new(raw).unwrap().add(delta);
            prop_assert!(!result.is_emergency_stop());
            prop_assert!(result.value() <= MAX_SPEED128);
        }
    }
}
