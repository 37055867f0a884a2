//! Actuation back-ends: a logging stand-in and the GPIO relay board.

use anyhow::Result;
use tracing::info;

use crate::output::{ActuationChannel, SymbolicOutput};

/// BCM pin per output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPins {
    pub car: u8,
    pub motorbike: u8,
    pub default: u8,
    /// Relay modules on the Pi header switch on when the pin is pulled low.
    pub active_low: bool,
}

impl Default for RelayPins {
    fn default() -> Self {
        Self {
            car: 17,
            motorbike: 27,
            default: 22,
            active_low: true,
        }
    }
}

impl RelayPins {
    pub fn pin_for(&self, output: SymbolicOutput) -> u8 {
        match output {
            SymbolicOutput::Car => self.car,
            SymbolicOutput::Motorbike => self.motorbike,
            SymbolicOutput::Default => self.default,
        }
    }

    /// Pin level that switches a relay off. Pins are claimed at this level
    /// so no relay pulses on while the board is being opened.
    pub fn off_level_high(&self) -> bool {
        self.active_low
    }

    /// Pin level for a channel in the given state.
    pub fn level_high(&self, on: bool) -> bool {
        on != self.active_low
    }

    pub fn is_distinct(&self) -> bool {
        self.car != self.motorbike && self.car != self.default && self.motorbike != self.default
    }
}

/// Used when no relay hardware is present: records the active channel and
/// logs every transition.
#[derive(Debug, Default)]
pub struct LoggingActuator {
    active: Option<SymbolicOutput>,
}

impl LoggingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<SymbolicOutput> {
        self.active
    }
}

impl ActuationChannel for LoggingActuator {
    fn activate(&mut self, output: SymbolicOutput) -> Result<()> {
        self.deactivate_all()?;
        self.active = Some(output);
        info!("Relay channel {} on", output);
        Ok(())
    }

    fn deactivate_all(&mut self) -> Result<()> {
        self.active = None;
        Ok(())
    }
}

#[cfg(feature = "raspberry-pi")]
pub use gpio::GpioRelayBoard;

#[cfg(feature = "raspberry-pi")]
mod gpio {
    use anyhow::{Context, Result};
    use rppal::gpio::{Gpio, OutputPin};
    use tracing::{info, warn};

    use super::RelayPins;
    use crate::output::{ActuationChannel, SymbolicOutput};

    /// Three relays on the Pi header, one per output channel.
    ///
    /// Construction and drop both leave the board in the fail-safe state
    /// (default channel on). Pins are not reset on drop, so that state
    /// outlives the process.
    pub struct GpioRelayBoard {
        pins: RelayPins,
        car: OutputPin,
        motorbike: OutputPin,
        default: OutputPin,
    }

    impl GpioRelayBoard {
        pub fn open(pins: RelayPins) -> Result<Self> {
            let gpio = Gpio::new().context("Failed to open GPIO")?;
            let take = |pin: u8| -> Result<OutputPin> {
                let pin = gpio
                    .get(pin)
                    .with_context(|| format!("GPIO pin {} unavailable", pin))?;
                let mut out = if pins.off_level_high() {
                    pin.into_output_high()
                } else {
                    pin.into_output_low()
                };
                // keep the last driven level after exit
                out.set_reset_on_drop(false);
                Ok(out)
            };

            let mut board = Self {
                pins,
                car: take(pins.car)?,
                motorbike: take(pins.motorbike)?,
                default: take(pins.default)?,
            };
            board.activate(SymbolicOutput::Default)?;
            info!(
                "Relay board ready (car={} motorbike={} default={} active_low={})",
                pins.car, pins.motorbike, pins.default, pins.active_low
            );
            Ok(board)
        }

        fn pin_mut(&mut self, output: SymbolicOutput) -> &mut OutputPin {
            match output {
                SymbolicOutput::Car => &mut self.car,
                SymbolicOutput::Motorbike => &mut self.motorbike,
                SymbolicOutput::Default => &mut self.default,
            }
        }

        fn set(&mut self, output: SymbolicOutput, on: bool) {
            let high = self.pins.level_high(on);
            let pin = self.pin_mut(output);
            if high {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
    }

    impl ActuationChannel for GpioRelayBoard {
        fn activate(&mut self, output: SymbolicOutput) -> Result<()> {
            self.deactivate_all()?;
            self.set(output, true);
            Ok(())
        }

        fn deactivate_all(&mut self) -> Result<()> {
            for output in SymbolicOutput::ALL {
                self.set(output, false);
            }
            Ok(())
        }
    }

    impl Drop for GpioRelayBoard {
        fn drop(&mut self) {
            if let Err(e) = self.activate(SymbolicOutput::Default) {
                warn!("Failed to restore relay safe state: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_actuator_keeps_one_channel() {
        let mut a = LoggingActuator::new();
        a.activate(SymbolicOutput::Car).unwrap();
        a.activate(SymbolicOutput::Motorbike).unwrap();
        assert_eq!(a.active(), Some(SymbolicOutput::Motorbike));
        a.deactivate_all().unwrap();
        assert_eq!(a.active(), None);
    }

    #[test]
    fn test_relay_pins() {
        let pins = RelayPins::default();
        assert_eq!(pins.pin_for(SymbolicOutput::Car), 17);
        assert_eq!(pins.pin_for(SymbolicOutput::Motorbike), 27);
        assert_eq!(pins.pin_for(SymbolicOutput::Default), 22);
        assert!(pins.is_distinct());
        assert!(!RelayPins { motorbike: 17, ..pins }.is_distinct());
    }

    #[test]
    fn test_pins_claimed_at_off_level() {
        let low = RelayPins::default();
        assert!(low.off_level_high());
        assert_eq!(low.level_high(false), low.off_level_high());
        assert!(!low.level_high(true));

        let high = RelayPins { active_low: false, ..low };
        assert!(!high.off_level_high());
        assert_eq!(high.level_high(false), high.off_level_high());
        assert!(high.level_high(true));
    }
}
