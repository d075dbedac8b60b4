//! Direct relay backend
//!
//! Each logical actuator is wired to one digital output line. Lines are
//! `embedded-hal` output pins so the backend does not care whether it
//! drives Linux sysfs GPIO or an in-memory stand-in.

use super::ActuatorBackend;
use crate::error::{HvacError, Result};
use crate::models::{ActuatorCommand, Device, SwitchState};
use async_trait::async_trait;
use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// BCM line numbers and sysfs location of the relay board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioSettings {
    pub fan_line: u32,
    pub heater_line: u32,
    pub cooler_line: u32,
    pub sysfs_root: PathBuf,
}

impl Default for GpioSettings {
    fn default() -> Self {
        Self {
            fan_line: 17,
            heater_line: 27,
            cooler_line: 22,
            sysfs_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

/// One output line per actuator
#[derive(Debug)]
pub struct RelayLines<P> {
    pub fan: P,
    pub heater: P,
    pub cooler: P,
}

impl<P> RelayLines<P> {
    fn pin_mut(&mut self, device: Device) -> &mut P {
        match device {
            Device::Fan => &mut self.fan,
            Device::Heater => &mut self.heater,
            Device::Cooler => &mut self.cooler,
        }
    }
}

impl RelayLines<SysfsPin> {
    /// Export the three lines and configure them as outputs
    pub fn acquire(settings: &GpioSettings) -> Result<Self> {
        let open = |device: Device, line: u32| {
            SysfsPin::acquire(&settings.sysfs_root, line).map_err(|e| HvacError::Actuation {
                device: device.to_string(),
                reason: format!("cannot acquire GPIO line {}: {}", line, e),
            })
        };
        Ok(Self {
            fan: open(Device::Fan, settings.fan_line)?,
            heater: open(Device::Heater, settings.heater_line)?,
            cooler: open(Device::Cooler, settings.cooler_line)?,
        })
    }
}

/// Drives relays through output pins
pub struct DirectBackend<P> {
    lines: Mutex<RelayLines<P>>,
}

impl<P> DirectBackend<P>
where
    P: OutputPin + Send,
{
    /// Take ownership of the lines and switch everything off
    pub fn new(lines: RelayLines<P>) -> Result<Self> {
        let backend = Self {
            lines: Mutex::new(lines),
        };
        backend.drive(&ActuatorCommand::idle())?;
        Ok(backend)
    }

    fn drive(&self, command: &ActuatorCommand) -> Result<()> {
        let mut lines = self.lines.lock().map_err(|e| HvacError::Actuation {
            device: "relay".to_string(),
            reason: format!("lock poisoned: {}", e),
        })?;

        // Release lines before energising others so heater and cooler never overlap
        let off = Device::ALL
            .into_iter()
            .filter(|d| command.state_of(*d) == SwitchState::Off);
        let on = Device::ALL
            .into_iter()
            .filter(|d| command.state_of(*d) == SwitchState::On);
        for device in off.chain(on) {
            let state = command.state_of(device);
            let pin = lines.pin_mut(device);
            let result = match state {
                SwitchState::On => pin.set_high(),
                SwitchState::Off => pin.set_low(),
            };
            result.map_err(|e| HvacError::Actuation {
                device: device.to_string(),
                reason: format!("{:?}", e),
            })?;
        }

        debug!(
            mode = %command.mode(),
            fan = command.fan().payload(),
            heater = command.heater().payload(),
            cooler = command.cooler().payload(),
            "Relays driven"
        );
        Ok(())
    }
}

#[async_trait]
impl<P> ActuatorBackend for DirectBackend<P>
where
    P: OutputPin + Send,
{
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn apply(&self, command: &ActuatorCommand) -> Result<()> {
        self.drive(command)
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Switching all relays off");
        self.drive(&ActuatorCommand::idle())
    }
}

/// Output line driven through `/sys/class/gpio`
#[derive(Debug)]
pub struct SysfsPin {
    line: u32,
    value_path: PathBuf,
}

#[derive(Debug)]
pub struct SysfsPinError(std::io::Error);

impl digital::Error for SysfsPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl std::fmt::Display for SysfsPinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sysfs GPIO write failed: {}", self.0)
    }
}

impl SysfsPin {
    /// Export `line` under `root` if needed and set its direction to out
    pub fn acquire(root: &Path, line: u32) -> std::io::Result<Self> {
        let line_dir = root.join(format!("gpio{}", line));
        if !line_dir.exists() {
            fs::write(root.join("export"), line.to_string())?;
        }
        fs::write(line_dir.join("direction"), "out")?;

        debug!(line, path = %line_dir.display(), "GPIO line acquired");
        Ok(Self {
            line,
            value_path: line_dir.join("value"),
        })
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn write(&mut self, value: &str) -> std::result::Result<(), SysfsPinError> {
        fs::write(&self.value_path, value).map_err(SysfsPinError)
    }
}

impl ErrorType for SysfsPin {
    type Error = SysfsPinError;
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> std::result::Result<(), Self::Error> {
        self.write("0")
    }

    fn set_high(&mut self) -> std::result::Result<(), Self::Error> {
        self.write("1")
    }
}

/// In-memory line for hosts without relays; clones observe the same level
#[derive(Debug, Clone, Default)]
pub struct MemoryPin {
    high: Arc<AtomicBool>,
}

impl MemoryPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }
}

impl ErrorType for MemoryPin {
    type Error = std::convert::Infallible;
}

impl OutputPin for MemoryPin {
    fn set_low(&mut self) -> std::result::Result<(), Self::Error> {
        self.high.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_high(&mut self) -> std::result::Result<(), Self::Error> {
        self.high.store(true, Ordering::SeqCst);
        Ok(())
    }
}
