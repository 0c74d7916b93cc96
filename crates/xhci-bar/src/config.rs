//! Engine configuration.

use serde::Deserialize;
use thiserror::Error;

use crate::port::PortPreset;
use crate::regs;
use crate::runtime::MicroframeTimer;

/// Microframes per second (one every 125 us).
pub const MICROFRAMES_PER_SECOND: u64 = 8000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("clock of {clock_hz} Hz is too slow: a 125 us microframe needs at least one tick")]
    ClockTooSlow { clock_hz: u64 },

    #[error(
        "clock of {clock_hz} Hz gives {ticks} ticks per microframe, more than the 13-bit sub-counter can hold ({max})"
    )]
    ClockTooFast { clock_hz: u64, ticks: u64, max: u32 },

    #[error("invalid {port} port speed {speed} (expected 1..=4)")]
    InvalidPortSpeed { port: &'static str, speed: u8 },

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct XhciBarConfig {
    /// Frequency of the tick signal driving the engine.
    pub clock_hz: u64,
    /// Port 1 (USB3) state after reset.
    pub primary_port: PortPreset,
    /// Port 2 (USB2, aliased) state after reset.
    pub secondary_port: PortPreset,
}

impl Default for XhciBarConfig {
    fn default() -> Self {
        Self {
            clock_hz: 62_500_000,
            primary_port: PortPreset::usb3_attached(),
            secondary_port: PortPreset::usb2_empty(),
        }
    }
}

impl XhciBarConfig {
    /// A config whose microframe period is exactly `ticks` ticks. Handy for tests that don't
    /// want to spin thousands of ticks per microframe.
    pub fn with_ticks_per_microframe(ticks: u16) -> Self {
        Self {
            clock_hz: u64::from(ticks) * MICROFRAMES_PER_SECOND,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ticks_per_microframe()?;
        for (port, preset) in [
            ("primary", &self.primary_port),
            ("secondary", &self.secondary_port),
        ] {
            if !(regs::SPEED_FULL..=regs::SPEED_SUPER).contains(&preset.speed) {
                return Err(ConfigError::InvalidPortSpeed {
                    port,
                    speed: preset.speed,
                });
            }
        }
        Ok(())
    }

    /// Ticks per 125 us microframe at `clock_hz` (truncated).
    pub fn ticks_per_microframe(&self) -> Result<u16, ConfigError> {
        let ticks = self.clock_hz / MICROFRAMES_PER_SECOND;
        if ticks == 0 {
            return Err(ConfigError::ClockTooSlow {
                clock_hz: self.clock_hz,
            });
        }
        let max = MicroframeTimer::MAX_TICKS_PER_MICROFRAME;
        if ticks > u64::from(max) {
            return Err(ConfigError::ClockTooFast {
                clock_hz: self.clock_hz,
                ticks,
                max,
            });
        }
        Ok(ticks as u16)
    }
}
