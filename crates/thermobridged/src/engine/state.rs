use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::store::PersistedState;

/// Default reading served until the durable store has loaded.
pub const DEFAULT_CURRENT_TEMPERATURE: f64 = 20.0;

/// Default setpoint served until the durable store has loaded.
pub const DEFAULT_TARGET_TEMPERATURE: f64 = 19.0;

/// Heating mode of the accessory.
///
/// Only OFF and HEAT exist; the hub's cooling and auto modes are rejected at
/// the numeric conversion edge before they can reach the remote device. The
/// numeric values are the hub's wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(into = "u8", try_from = "u8")]
pub enum HeatingMode {
    #[strum(serialize = "OFF")]
    Off = 0,
    #[strum(serialize = "HEAT")]
    Heat = 1,
}

/// A mode value outside {OFF, HEAT}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported heating mode: {0}")]
pub struct InvalidMode(pub u8);

impl From<HeatingMode> for u8 {
    fn from(mode: HeatingMode) -> Self {
        mode as u8
    }
}

impl TryFrom<u8> for HeatingMode {
    type Error = InvalidMode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HeatingMode::Off),
            1 => Ok(HeatingMode::Heat),
            other => Err(InvalidMode(other)),
        }
    }
}

/// In-memory mirror of the thermostat's state.
///
/// Owned exclusively by the synchronization engine and mutated only through
/// its operation handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatState {
    pub current_temperature: f64,
    pub target_temperature: f64,
    pub current_mode: HeatingMode,
    pub target_mode: HeatingMode,
}

impl Default for ThermostatState {
    fn default() -> Self {
        Self {
            current_temperature: DEFAULT_CURRENT_TEMPERATURE,
            target_temperature: DEFAULT_TARGET_TEMPERATURE,
            current_mode: HeatingMode::Off,
            target_mode: HeatingMode::Off,
        }
    }
}

impl ThermostatState {
    /// Overlay the durable subset loaded from the store.
    ///
    /// The current mode stays at its default; it only tracks mode changes
    /// made while the process is running.
    pub fn apply_persisted(&mut self, persisted: &PersistedState) {
        self.current_temperature = persisted.current_temperature;
        self.target_temperature = persisted.target_temperature;
        self.target_mode = persisted.target_mode;
    }

    /// The durable subset of this state.
    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            current_temperature: self.current_temperature,
            target_temperature: self.target_temperature,
            target_mode: self.target_mode,
        }
    }
}
