//! Tri-state model of the shared 8-bit bus.

use std::fmt;

use serde::Serialize;

use crate::control::ControlLine;

/// Observable state of the bus lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BusState {
    Driven(u8),
    /// Floating, nobody drives it.
    HighZ,
    /// Indeterminate: power-on, or a driver that has no defined value yet.
    Unknown,
}

impl BusState {
    pub fn value(self) -> Option<u8> {
        match self {
            Self::Driven(v) => Some(v),
            Self::HighZ | Self::Unknown => None,
        }
    }

    pub fn is_driven(self) -> bool {
        matches!(self, Self::Driven(_))
    }

    /// Idle means nobody has taken ownership with a defined value.
    pub fn is_idle(self) -> bool {
        matches!(self, Self::HighZ | Self::Unknown)
    }
}

// Rendered the way a logic analyser would show an 8-bit vector.
impl fmt::Display for BusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driven(v) => write!(f, "{v:08b}"),
            Self::HighZ => f.write_str("ZZZZZZZZ"),
            Self::Unknown => f.write_str("XXXXXXXX"),
        }
    }
}

/// Everything that can put a value on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Driver {
    /// The harness itself, through the bus-output-enable buffer.
    External,
    RegA,
    Alu,
}

impl Driver {
    pub const ALL: [Driver; 3] = [Driver::External, Driver::RegA, Driver::Alu];

    pub fn enable_line(self) -> ControlLine {
        match self {
            Self::External => ControlLine::BusOutputEnable,
            Self::RegA => ControlLine::RegAOutputEnable,
            Self::Alu => ControlLine::AluOutputEnable,
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::External => "external driver",
            Self::RegA => "RegA",
            Self::Alu => "ALU",
        })
    }
}

/// Two drivers tried to own the bus at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub held: Driver,
    pub requested: Driver,
}

/// The bus as resolved at the last falling edge.
///
/// Never merges drivers: a second driver is refused with a [`Conflict`]
/// and the first one keeps the bus.
#[derive(Debug, Clone)]
pub struct SignalBus {
    owner: Option<Driver>,
    state: BusState,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    /// Power-on bus: nothing has been resolved yet.
    pub fn new() -> Self {
        Self {
            owner: None,
            state: BusState::Unknown,
        }
    }

    pub fn drive(&mut self, driver: Driver, value: u8) -> Result<(), Conflict> {
        self.take(driver, BusState::Driven(value))
    }

    /// A driver that is enabled but has no defined value (an uninitialised
    /// register, an unsettled ALU) still owns the bus.
    pub fn drive_undefined(&mut self, driver: Driver) -> Result<(), Conflict> {
        self.take(driver, BusState::Unknown)
    }

    fn take(&mut self, driver: Driver, state: BusState) -> Result<(), Conflict> {
        match self.owner {
            Some(held) if held != driver => Err(Conflict {
                held,
                requested: driver,
            }),
            _ => {
                self.owner = Some(driver);
                self.state = state;
                Ok(())
            }
        }
    }

    pub fn release(&mut self) {
        self.owner = None;
        self.state = BusState::HighZ;
    }

    /// Replaces what the lines read as without changing who owns them.
    pub fn override_state(&mut self, state: BusState) {
        self.state = state;
    }

    pub fn sample(&self) -> BusState {
        self.state
    }

    pub fn owner(&self) -> Option<Driver> {
        self.owner
    }
}
