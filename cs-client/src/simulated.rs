//! In-memory command station
//!
//! Keeps the state a real station would hold (per-address direction, speed
//! and functions) and records every call so tests can assert on the exact
//! device traffic a command produced.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{DeviceError, Result};
use crate::{CommandStation, PushEvent, PushHandler, MAX_FUNCTION, MAX_SPEED128};

/// A single call received by a [`SimulatedStation`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Enabled,
    SetEnabled(bool),
    Temperature,
    LocoDir { addr: u16 },
    SetLocoDir { addr: u16, forward: bool },
    ToggleLocoDir { addr: u16 },
    LocoSpeed128 { addr: u16 },
    SetLocoSpeed128 { addr: u16, speed: u8 },
    LocoFct { addr: u16, no: u8 },
    SetLocoFct { addr: u16, no: u8, on: bool },
    ToggleLocoFct { addr: u16, no: u8 },
    Close,
}

#[derive(Debug, Clone)]
struct LocoState {
    forward: bool,
    speed: u8,
    fcts: HashMap<u8, bool>,
}

impl Default for LocoState {
    fn default() -> Self {
        Self {
            forward: true,
            speed: 0,
            fcts: HashMap::new(),
        }
    }
}

struct StationState {
    enabled: bool,
    temperature: f64,
    locos: HashMap<u16, LocoState>,
    calls: Vec<Call>,
    fail_with: Option<DeviceError>,
    closed: bool,
    push: Option<PushHandler>,
}

impl fmt::Debug for StationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationState")
            .field("enabled", &self.enabled)
            .field("temperature", &self.temperature)
            .field("locos", &self.locos)
            .field("calls", &self.calls)
            .field("fail_with", &self.fail_with)
            .field("closed", &self.closed)
            .field("push", &self.push.is_some())
            .finish()
    }
}

/// A command station living entirely in memory
#[derive(Debug)]
pub struct SimulatedStation {
    name: String,
    state: Arc<Mutex<StationState>>,
}

/// Shared view on a [`SimulatedStation`] that stays usable after the
/// station itself has been moved into a worker.
#[derive(Debug, Clone)]
pub struct StationHandle {
    state: Arc<Mutex<StationState>>,
}

impl SimulatedStation {
    /// Create a station with the track output enabled and no known locos
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(StationState {
                enabled: true,
                temperature: 25.0,
                locos: HashMap::new(),
                calls: Vec::new(),
                fail_with: None,
                closed: false,
                push: None,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> StationHandle {
        StationHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn call<T>(&self, call: Call, op: impl FnOnce(&mut StationState) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DeviceError::Closed);
        }
        tracing::trace!(station = %self.name, ?call, "simulated call");
        state.calls.push(call);
        if let Some(err) = state.fail_with.clone() {
            return Err(err);
        }
        op(&mut state)
    }
}

fn check_function(no: u8) -> Result<()> {
    if no > MAX_FUNCTION {
        return Err(DeviceError::OutOfRange {
            what: "function number",
            value: no.into(),
        });
    }
    Ok(())
}

impl CommandStation for SimulatedStation {
    fn enabled(&mut self) -> Result<bool> {
        self.call(Call::Enabled, |s| Ok(s.enabled))
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<bool> {
        self.call(Call::SetEnabled(enabled), |s| {
            s.enabled = enabled;
            Ok(s.enabled)
        })
    }

    fn temperature(&mut self) -> Result<f64> {
        self.call(Call::Temperature, |s| Ok(s.temperature))
    }

    fn loco_dir(&mut self, addr: u16) -> Result<bool> {
        self.call(Call::LocoDir { addr }, |s| {
            Ok(s.locos.entry(addr).or_default().forward)
        })
    }

    fn set_loco_dir(&mut self, addr: u16, forward: bool) -> Result<bool> {
        self.call(Call::SetLocoDir { addr, forward }, |s| {
            let loco = s.locos.entry(addr).or_default();
            loco.forward = forward;
            Ok(loco.forward)
        })
    }

    fn toggle_loco_dir(&mut self, addr: u16) -> Result<bool> {
        self.call(Call::ToggleLocoDir { addr }, |s| {
            let loco = s.locos.entry(addr).or_default();
            loco.forward = !loco.forward;
            Ok(loco.forward)
        })
    }

    fn loco_speed128(&mut self, addr: u16) -> Result<u8> {
        self.call(Call::LocoSpeed128 { addr }, |s| {
            Ok(s.locos.entry(addr).or_default().speed)
        })
    }

    fn set_loco_speed128(&mut self, addr: u16, speed: u8) -> Result<u8> {
        self.call(Call::SetLocoSpeed128 { addr, speed }, |s| {
            if speed > MAX_SPEED128 {
                return Err(DeviceError::OutOfRange {
                    what: "speed128",
                    value: speed.into(),
                });
            }
            let loco = s.locos.entry(addr).or_default();
            loco.speed = speed;
            Ok(loco.speed)
        })
    }

    fn loco_fct(&mut self, addr: u16, no: u8) -> Result<bool> {
        self.call(Call::LocoFct { addr, no }, |s| {
            check_function(no)?;
            let loco = s.locos.entry(addr).or_default();
            Ok(loco.fcts.get(&no).copied().unwrap_or(false))
        })
    }

    fn set_loco_fct(&mut self, addr: u16, no: u8, on: bool) -> Result<bool> {
        self.call(Call::SetLocoFct { addr, no, on }, |s| {
            check_function(no)?;
            s.locos.entry(addr).or_default().fcts.insert(no, on);
            Ok(on)
        })
    }

    fn toggle_loco_fct(&mut self, addr: u16, no: u8) -> Result<bool> {
        self.call(Call::ToggleLocoFct { addr, no }, |s| {
            check_function(no)?;
            let fct = s.locos.entry(addr).or_default().fcts.entry(no).or_insert(false);
            *fct = !*fct;
            Ok(*fct)
        })
    }

    fn set_push_handler(&mut self, handler: PushHandler) {
        let mut state = self.state.lock();
        if !state.closed {
            state.push = Some(handler);
        }
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DeviceError::Closed);
        }
        state.calls.push(Call::Close);
        state.closed = true;
        state.push = None;
        tracing::debug!(station = %self.name, "simulated station closed");
        Ok(())
    }
}

impl StationHandle {
    /// All calls received so far, oldest first
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Only the calls that change loco or track state
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| {
                !matches!(
                    call,
                    Call::Enabled
                        | Call::Temperature
                        | Call::LocoDir { .. }
                        | Call::LocoSpeed128 { .. }
                        | Call::LocoFct { .. }
                        | Call::Close
                )
            })
            .collect()
    }

    pub fn speed128(&self, addr: u16) -> Option<u8> {
        self.state.lock().locos.get(&addr).map(|l| l.speed)
    }

    pub fn forward(&self, addr: u16) -> Option<bool> {
        self.state.lock().locos.get(&addr).map(|l| l.forward)
    }

    pub fn function(&self, addr: u16, no: u8) -> Option<bool> {
        self.state
            .lock()
            .locos
            .get(&addr)
            .and_then(|l| l.fcts.get(&no).copied())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Push a GPIO level change the way the firmware reports inputs.
    ///
    /// Returns `false` when no push handler is installed.
    pub fn push_io(&self, gpio: u8, state: bool) -> bool {
        self.push(Ok(PushEvent::Io { gpio, state }))
    }

    /// Push a read failure of the connection.
    pub fn push_error(&self, err: DeviceError) -> bool {
        self.push(Err(err))
    }

    fn push(&self, msg: Result<PushEvent>) -> bool {
        // the handler may publish, so it runs outside the lock
        let handler = self.state.lock().push.clone();
        match handler {
            Some(handler) => {
                handler(msg);
                true
            }
            None => false,
        }
    }

    /// Preload the raw speed of a loco without recording a call
    pub fn preset_speed128(&self, addr: u16, speed: u8) {
        self.state.lock().locos.entry(addr).or_default().speed = speed;
    }

    pub fn set_temperature(&self, celsius: f64) {
        self.state.lock().temperature = celsius;
    }

    /// Make every following call fail with `err` until cleared with `None`
    pub fn fail_with(&self, err: Option<DeviceError>) {
        self.state.lock().fail_with = err;
    }
}
