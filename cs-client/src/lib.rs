//! Command station client contract
//!
//! A command station is a physical controller (a pico or pico_w running the
//! pico-cs firmware) driving the track. The gateway never shares a station
//! between threads: each station is owned by exactly one worker, which is why
//! every operation takes `&mut self`.
//!
//! This crate defines the operations the gateway needs ([`CommandStation`])
//! and ships an in-memory [`SimulatedStation`] used by the test suites and by
//! the `simulated` transport of the gateway binary.

use std::sync::Arc;

mod error;
mod simulated;

pub use error::{DeviceError, Result};
pub use simulated::{Call, SimulatedStation, StationHandle};

/// Highest raw speed step a station accepts (128-step mode).
pub const MAX_SPEED128: u8 = 127;

/// Highest decoder function number a station accepts.
pub const MAX_FUNCTION: u8 = 68;

/// Unsolicited message sent by a station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEvent {
    /// A GPIO input changed its level
    Io { gpio: u8, state: bool },
}

/// Callback receiving pushed messages, or the error reading them.
///
/// Runs on the connection's own reader, never on the thread owning the
/// station, so it has to be `Send + Sync`.
pub type PushHandler = Arc<dyn Fn(Result<PushEvent>) + Send + Sync>;

/// Operations offered by a command station connection.
///
/// Loco operations address a decoder by its protocol address. Speeds are
/// raw 128-step values where `0` and `1` both mean "not moving" and `1` is
/// the emergency stop. Setters return the value the station reports back
/// after applying the command.
pub trait CommandStation: Send {
    /// Whether the track output is enabled.
    fn enabled(&mut self) -> Result<bool>;

    /// Enable or disable the track output.
    fn set_enabled(&mut self, enabled: bool) -> Result<bool>;

    /// Board temperature in degrees Celsius.
    fn temperature(&mut self) -> Result<f64>;

    /// Loco direction, `true` meaning forward.
    fn loco_dir(&mut self, addr: u16) -> Result<bool>;

    fn set_loco_dir(&mut self, addr: u16, forward: bool) -> Result<bool>;

    fn toggle_loco_dir(&mut self, addr: u16) -> Result<bool>;

    /// Raw 128-step loco speed.
    fn loco_speed128(&mut self, addr: u16) -> Result<u8>;

    fn set_loco_speed128(&mut self, addr: u16, speed: u8) -> Result<u8>;

    /// State of decoder function `no`.
    fn loco_fct(&mut self, addr: u16, no: u8) -> Result<bool>;

    fn set_loco_fct(&mut self, addr: u16, no: u8, on: bool) -> Result<bool>;

    fn toggle_loco_fct(&mut self, addr: u16, no: u8) -> Result<bool>;

    /// Install the receiver of pushed messages, replacing any previous one.
    ///
    /// The handler is dropped on [`close`](CommandStation::close).
    fn set_push_handler(&mut self, handler: PushHandler);

    /// Release the connection. Further calls fail with [`DeviceError::Closed`].
    fn close(&mut self) -> Result<()>;
}
