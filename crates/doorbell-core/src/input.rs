//! Button input line
//!
//! The orchestrator only needs "is the button pressed right now".
//! [`InputPin`] hides the driver; [`SysfsPin`] reads a Linux GPIO line through
//! the sysfs interface, which is what a Raspberry Pi exposes without extra
//! daemons.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DoorbellError, DoorbellResult};

/// Logical level of the button line, already corrected for polarity
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Level {
    /// Button pressed
    Asserted,
    /// Button released
    Released,
}

/// Bias resistor wiring of the button line
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullPolicy {
    /// Pulled up, button shorts to ground: pressed reads low
    #[default]
    Up,
    /// Pulled down, button shorts to VCC: pressed reads high
    Down,
    /// External bias; treated as active-high
    None,
}

impl PullPolicy {
    pub fn active_low(self) -> bool {
        matches!(self, PullPolicy::Up)
    }

    /// Map a raw electrical reading to a logical level
    pub fn level_for(self, raw_high: bool) -> Level {
        if raw_high != self.active_low() {
            Level::Asserted
        } else {
            Level::Released
        }
    }
}

/// A readable button line
pub trait InputPin: Send {
    /// Sample the current level
    fn read_level(&self) -> DoorbellResult<Level>;

    /// Line identifier for logs
    fn pin(&self) -> u32;
}

/// GPIO line driven through `/sys/class/gpio`
///
/// The pull resistor itself cannot be configured through sysfs; it has to be
/// set by the platform (for a Pi: `gpio=17=ip,pu` in `config.txt`). The
/// policy here only decides polarity.
#[derive(Debug)]
pub struct SysfsPin {
    pin: u32,
    pull: PullPolicy,
    value_path: PathBuf,
}

impl SysfsPin {
    pub const SYSFS_ROOT: &'static str = "/sys/class/gpio";

    /// Export and configure `pin` as an input under the default sysfs root
    pub fn open(pin: u32, pull: PullPolicy) -> DoorbellResult<Self> {
        Self::open_at(Path::new(Self::SYSFS_ROOT), pin, pull)
    }

    /// Same as [`SysfsPin::open`] with an explicit sysfs root
    pub fn open_at(root: &Path, pin: u32, pull: PullPolicy) -> DoorbellResult<Self> {
        let line = root.join(format!("gpio{}", pin));

        if !line.exists() {
            fs::write(root.join("export"), pin.to_string()).map_err(|e| {
                DoorbellError::config(format!("cannot export GPIO {}: {}", pin, e))
            })?;
        }

        fs::write(line.join("direction"), "in").map_err(|e| {
            DoorbellError::config(format!("cannot configure GPIO {} as input: {}", pin, e))
        })?;

        debug!(pin, ?pull, "GPIO line configured as input");
        Ok(Self {
            pin,
            pull,
            value_path: line.join("value"),
        })
    }
}

impl InputPin for SysfsPin {
    fn read_level(&self) -> DoorbellResult<Level> {
        let raw = fs::read_to_string(&self.value_path)
            .map_err(|e| DoorbellError::input(self.pin, e.to_string()))?;
        match raw.trim() {
            "0" => Ok(self.pull.level_for(false)),
            "1" => Ok(self.pull.level_for(true)),
            other => Err(DoorbellError::input(
                self.pin,
                format!("unexpected value {:?}", other),
            )),
        }
    }

    fn pin(&self) -> u32 {
        self.pin
    }
}
