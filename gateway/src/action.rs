//! Command handlers
//!
//! A handler is plain data: the property it acts on, the command it executes
//! and whether the result is reported. Which handlers exist for a property is
//! defined by a static table, so subscribing a loco never creates closures.

use cs_client::CommandStation;

use crate::error::CommandError;
use crate::payload::Value;
use crate::speed::{DeviceSpeed, Speed, EMERGENCY_STOP, MAX_SPEED};
use crate::topic::{Command, CLASS_CS, CLASS_LOCO, PROPERTY_DIR, PROPERTY_ENABLED, PROPERTY_SPEED, PROPERTY_TEMP};

/// A property a handler operates on, resolved against its loco or station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    /// Track output of a station
    Enabled,
    /// Board temperature of a station
    Temperature,
    LocoDir { addr: u16 },
    LocoSpeed { addr: u16 },
    LocoFunction { addr: u16, no: u8 },
}

/// Shape of a property, the key of the handler table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Enabled,
    Temperature,
    Dir,
    Speed,
    Function,
}

impl Property {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Property::Enabled => PropertyKind::Enabled,
            Property::Temperature => PropertyKind::Temperature,
            Property::LocoDir { .. } => PropertyKind::Dir,
            Property::LocoSpeed { .. } => PropertyKind::Speed,
            Property::LocoFunction { .. } => PropertyKind::Function,
        }
    }

    /// Topic class the property lives under.
    pub fn class(&self) -> &'static str {
        match self {
            Property::Enabled | Property::Temperature => CLASS_CS,
            _ => CLASS_LOCO,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Property::Enabled => PROPERTY_ENABLED,
            Property::Temperature => PROPERTY_TEMP,
            Property::LocoDir { .. } => PROPERTY_DIR,
            Property::LocoSpeed { .. } => PROPERTY_SPEED,
            Property::LocoFunction { .. } => "function",
        }
    }
}

struct TableEntry {
    kind: PropertyKind,
    /// Commands offered by the primary station
    actions: &'static [Command],
    /// Whether secondaries apply values published on the event topic
    mirrored: bool,
}

static HANDLER_TABLE: &[TableEntry] = &[
    TableEntry {
        kind: PropertyKind::Enabled,
        actions: &[Command::Get, Command::Set],
        mirrored: false,
    },
    TableEntry {
        kind: PropertyKind::Temperature,
        actions: &[Command::Get],
        mirrored: false,
    },
    TableEntry {
        kind: PropertyKind::Dir,
        actions: &[Command::Get, Command::Set, Command::Toggle],
        mirrored: true,
    },
    TableEntry {
        kind: PropertyKind::Speed,
        actions: &[Command::Get, Command::Set, Command::Stop, Command::Add],
        mirrored: true,
    },
    TableEntry {
        kind: PropertyKind::Function,
        actions: &[Command::Get, Command::Set, Command::Toggle],
        mirrored: true,
    },
];

fn table_entry(kind: PropertyKind) -> Option<&'static TableEntry> {
    HANDLER_TABLE.iter().find(|entry| entry.kind == kind)
}

/// Commands a primary station serves for `kind`.
pub fn commands_for(kind: PropertyKind) -> &'static [Command] {
    table_entry(kind).map_or(&[], |entry| entry.actions)
}

/// What to do with one inbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handler {
    pub property: Property,
    pub command: Command,
    /// Report the result on the event topic
    pub reply: bool,
}

impl Handler {
    /// Action handlers of a primary station, one per command.
    pub fn actions(property: Property) -> impl Iterator<Item = Handler> {
        commands_for(property.kind()).iter().map(move |&command| Handler {
            property,
            command,
            reply: true,
        })
    }

    /// Listener handler of a secondary station, if the property is mirrored.
    ///
    /// Listeners apply the event value like `set` and never reply.
    pub fn listener(property: Property) -> Option<Handler> {
        table_entry(property.kind())
            .filter(|entry| entry.mirrored)
            .map(|_| Handler {
                property,
                command: Command::Set,
                reply: false,
            })
    }

    /// Execute the handler against `station`.
    ///
    /// Returns the value to report, or `None` for handlers that do not reply.
    pub fn invoke(
        &self,
        station: &mut dyn CommandStation,
        payload: &Value,
    ) -> Result<Option<Value>, CommandError> {
        let value = match (self.property, self.command) {
            (Property::Enabled, Command::Get) => Value::from(station.enabled()?),
            (Property::Enabled, Command::Set) => {
                let enabled = expect_bool(self.command, payload)?;
                Value::from(station.set_enabled(enabled)?)
            }
            (Property::Temperature, Command::Get) => Value::from_f64(station.temperature()?),

            (Property::LocoDir { addr }, Command::Get) => Value::from(station.loco_dir(addr)?),
            (Property::LocoDir { addr }, Command::Set) => {
                let forward = expect_bool(self.command, payload)?;
                Value::from(station.set_loco_dir(addr, forward)?)
            }
            (Property::LocoDir { addr }, Command::Toggle) => {
                Value::from(station.toggle_loco_dir(addr)?)
            }

            (Property::LocoSpeed { addr }, Command::Get) => {
                speed_value(DeviceSpeed::from_raw(station.loco_speed128(addr)?))
            }
            (Property::LocoSpeed { addr }, Command::Set) => {
                let speed = expect_speed(payload)?;
                let applied = station.set_loco_speed128(addr, speed.to_device().value())?;
                speed_value(DeviceSpeed::from_raw(applied))
            }
            (Property::LocoSpeed { addr }, Command::Stop) => {
                let applied = station.set_loco_speed128(addr, EMERGENCY_STOP.value())?;
                speed_value(DeviceSpeed::from_raw(applied))
            }
            (Property::LocoSpeed { addr }, Command::Add) => {
                let delta = expect_delta(payload)?;
                let current = DeviceSpeed::from_raw(station.loco_speed128(addr)?);
                let applied = station.set_loco_speed128(addr, current.add(delta).value())?;
                speed_value(DeviceSpeed::from_raw(applied))
            }

            (Property::LocoFunction { addr, no }, Command::Get) => {
                Value::from(station.loco_fct(addr, no)?)
            }
            (Property::LocoFunction { addr, no }, Command::Set) => {
                let on = expect_bool(self.command, payload)?;
                Value::from(station.set_loco_fct(addr, no, on)?)
            }
            (Property::LocoFunction { addr, no }, Command::Toggle) => {
                Value::from(station.toggle_loco_fct(addr, no)?)
            }

            (property, command) => {
                return Err(CommandError::Unsupported {
                    property: property.label(),
                    command: command.as_str(),
                })
            }
        };

        Ok(self.reply.then_some(value))
    }
}

fn speed_value(speed: DeviceSpeed) -> Value {
    Value::from(speed.to_external().value())
}

fn expect_bool(command: Command, payload: &Value) -> Result<bool, CommandError> {
    payload.as_bool().ok_or(CommandError::InvalidPayload {
        command: command.as_str(),
        expected: "boolean",
        found: payload.kind(),
    })
}

fn expect_number(command: Command, payload: &Value) -> Result<f64, CommandError> {
    payload
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or(CommandError::InvalidPayload {
            command: command.as_str(),
            expected: "number",
            found: payload.kind(),
        })
}

/// Bus speed from a `set` payload; fractions are truncated.
fn expect_speed(payload: &Value) -> Result<Speed, CommandError> {
    let n = expect_number(Command::Set, payload)?;
    if !(0.0..=f64::from(MAX_SPEED)).contains(&n) {
        return Err(CommandError::SpeedOutOfRange(n));
    }
    // range checked above
    Speed::new(n as u8).ok_or(CommandError::SpeedOutOfRange(n))
}

/// Signed delta from an `add` payload; fractions are truncated.
fn expect_delta(payload: &Value) -> Result<i64, CommandError> {
    expect_number(Command::Add, payload).map(|n| n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_client::{Call, DeviceError, SimulatedStation};
    use rstest::rstest;

    const ADDR: u16 = 3;

    fn action(property: Property, command: Command) -> Handler {
        Handler {
            property,
            command,
            reply: true,
        }
    }

    #[test]
    fn test_table_actions() {
        let commands: Vec<Command> = Handler::actions(Property::LocoSpeed { addr: ADDR })
            .map(|h| h.command)
            .collect();
        assert_eq!(
            commands,
            vec![Command::Get, Command::Set, Command::Stop, Command::Add]
        );
        assert_eq!(Handler::actions(Property::Temperature).count(), 1);
        assert_eq!(Handler::actions(Property::Enabled).count(), 2);
        assert_eq!(Handler::actions(Property::LocoFunction { addr: ADDR, no: 0 }).count(), 3);
    }

    #[test]
    fn test_table_listeners() {
        assert!(Handler::listener(Property::Enabled).is_none());
        assert!(Handler::listener(Property::Temperature).is_none());

        let listener = Handler::listener(Property::LocoDir { addr: ADDR }).unwrap();
        assert_eq!(listener.command, Command::Set);
        assert!(!listener.reply);
    }

    #[test]
    fn test_speed_set_translates_scale() {
        let mut station = SimulatedStation::new("cs01");
        let handle = station.handle();

        let reply = action(Property::LocoSpeed { addr: ADDR }, Command::Set)
            .invoke(&mut station, &Value::from(80u8))
            .unwrap();

        assert_eq!(reply, Some(Value::from(80u8)));
        assert_eq!(handle.speed128(ADDR), Some(81));
    }

    #[test]
    fn test_stop_writes_emergency_stop() {
        let mut station = SimulatedStation::new("cs01");
        let handle = station.handle();
        handle.preset_speed128(ADDR, 100);

        let reply = action(Property::LocoSpeed { addr: ADDR }, Command::Stop)
            .invoke(&mut station, &Value::Null)
            .unwrap();

        assert_eq!(reply, Some(Value::from(0u8)));
        assert_eq!(handle.speed128(ADDR), Some(1));
    }

    #[rstest]
    #[case(81, 10, 91)]
    #[case(81, -100, 0)]
    #[case(120, 50, 127)]
    #[case(1, 1, 2)]
    #[case(0, 0, 0)]
    fn test_add_adjusts_in_bus_scale(#[case] start: u8, #[case] delta: i64, #[case] device: u8) {
        let mut station = SimulatedStation::new("cs01");
        let handle = station.handle();
        handle.preset_speed128(ADDR, start);

        action(Property::LocoSpeed { addr: ADDR }, Command::Add)
            .invoke(&mut station, &Value::from(delta))
            .unwrap();

        assert_eq!(handle.speed128(ADDR), Some(device));
    }

    #[rstest]
    #[case(Value::from(127u8))]
    #[case(Value::from(-1i64))]
    #[case(Value::from_f64(126.5))]
    fn test_speed_out_of_range(#[case] payload: Value) {
        let mut station = SimulatedStation::new("cs01");
        let err = action(Property::LocoSpeed { addr: ADDR }, Command::Set)
            .invoke(&mut station, &payload)
            .unwrap_err();
        assert!(matches!(err, CommandError::SpeedOutOfRange(_)));
    }

    #[test]
    fn test_fractional_speed_truncated() {
        let mut station = SimulatedStation::new("cs01");
        let handle = station.handle();
        action(Property::LocoSpeed { addr: ADDR }, Command::Set)
            .invoke(&mut station, &Value::from_f64(10.9))
            .unwrap();
        assert_eq!(handle.speed128(ADDR), Some(11));
    }

    #[test]
    fn test_invalid_payload_type() {
        let mut station = SimulatedStation::new("cs01");
        let handle = station.handle();

        let err = action(Property::LocoDir { addr: ADDR }, Command::Set)
            .invoke(&mut station, &Value::from("forward"))
            .unwrap_err();

        assert_eq!(
            err,
            CommandError::InvalidPayload {
                command: "set",
                expected: "boolean",
                found: "string",
            }
        );
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn test_listener_applies_without_reply() {
        let mut station = SimulatedStation::new("cs02");
        let handle = station.handle();
        let listener = Handler::listener(Property::LocoFunction { addr: ADDR, no: 4 }).unwrap();

        let reply = listener.invoke(&mut station, &Value::from(true)).unwrap();

        assert_eq!(reply, None);
        assert_eq!(handle.function(ADDR, 4), Some(true));
    }

    #[test]
    fn test_toggles_and_gets() {
        let mut station = SimulatedStation::new("cs01");

        let dir = action(Property::LocoDir { addr: ADDR }, Command::Toggle)
            .invoke(&mut station, &Value::Null)
            .unwrap();
        assert_eq!(dir, Some(Value::from(false)));

        let fct = action(Property::LocoFunction { addr: ADDR, no: 0 }, Command::Toggle)
            .invoke(&mut station, &Value::Null)
            .unwrap();
        assert_eq!(fct, Some(Value::from(true)));

        let temp = action(Property::Temperature, Command::Get)
            .invoke(&mut station, &Value::Null)
            .unwrap();
        assert_eq!(temp, Some(Value::from_f64(25.0)));

        let enabled = action(Property::Enabled, Command::Set)
            .invoke(&mut station, &Value::from(true))
            .unwrap();
        assert_eq!(enabled, Some(Value::from(true)));
    }

    #[test]
    fn test_device_error_propagates() {
        let mut station = SimulatedStation::new("cs01");
        station.handle().fail_with(Some(DeviceError::Transport("timeout".to_string())));

        let err = action(Property::LocoSpeed { addr: ADDR }, Command::Get)
            .invoke(&mut station, &Value::Null)
            .unwrap_err();
        assert_eq!(err, CommandError::Device(DeviceError::Transport("timeout".to_string())));
    }

    #[test]
    fn test_unsupported_combination() {
        let mut station = SimulatedStation::new("cs01");
        let handle = station.handle();
        let err = action(Property::Temperature, Command::Set)
            .invoke(&mut station, &Value::from(20u8))
            .unwrap_err();
        assert!(matches!(err, CommandError::Unsupported { .. }));
        assert!(!handle.calls().contains(&Call::Temperature));
    }
}
