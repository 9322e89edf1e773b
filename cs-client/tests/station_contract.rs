//! Exercises the simulated station through the `CommandStation` trait object,
//! the way the gateway worker drives it.

use cs_client::{Call, CommandStation, DeviceError, SimulatedStation};
use rstest::rstest;

fn boxed() -> (Box<dyn CommandStation>, cs_client::StationHandle) {
    let station = SimulatedStation::new("cs-test");
    let handle = station.handle();
    (Box::new(station), handle)
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(127)]
fn test_valid_speed_steps(#[case] speed: u8) {
    let (mut station, handle) = boxed();
    assert_eq!(station.set_loco_speed128(10, speed).unwrap(), speed);
    assert_eq!(handle.speed128(10), Some(speed));
}

#[rstest]
#[case(69)]
#[case(255)]
fn test_function_number_out_of_range(#[case] no: u8) {
    let (mut station, _handle) = boxed();
    assert!(matches!(
        station.set_loco_fct(10, no, true),
        Err(DeviceError::OutOfRange { .. })
    ));
}

#[test]
fn test_enabled_and_temperature() {
    let (mut station, handle) = boxed();
    handle.set_temperature(31.5);

    assert!(station.enabled().unwrap());
    assert!(!station.set_enabled(false).unwrap());
    assert!(!station.enabled().unwrap());
    assert_eq!(station.temperature().unwrap(), 31.5);
}

#[test]
fn test_close_is_recorded() {
    let (mut station, handle) = boxed();
    station.close().unwrap();
    assert_eq!(handle.calls().last(), Some(&Call::Close));
}
