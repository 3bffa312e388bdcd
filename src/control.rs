//! Control lines into the datapath and their packed control word.

use std::fmt;

use serde::Serialize;

use crate::bus::{Conflict, Driver};

/// One control line. The discriminant is the line's bit in the control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ControlLine {
    BusOutputEnable = 0,
    RegALoad = 1,
    RegBLoad = 2,
    RegAOutputEnable = 3,
    AluOutputEnable = 4,
    /// Active-high: level 1 selects subtract.
    AluSubtract = 5,
}

impl ControlLine {
    pub const ALL: [ControlLine; 6] = [
        ControlLine::BusOutputEnable,
        ControlLine::RegALoad,
        ControlLine::RegBLoad,
        ControlLine::RegAOutputEnable,
        ControlLine::AluOutputEnable,
        ControlLine::AluSubtract,
    ];

    fn mask(self) -> u8 {
        1 << (self as u8)
    }

    pub fn is_active_low(self) -> bool {
        !matches!(self, ControlLine::AluSubtract)
    }

    /// The bus driver this line gates, if it is an output-enable.
    pub fn driver(self) -> Option<Driver> {
        match self {
            ControlLine::BusOutputEnable => Some(Driver::External),
            ControlLine::RegAOutputEnable => Some(Driver::RegA),
            ControlLine::AluOutputEnable => Some(Driver::Alu),
            _ => None,
        }
    }

    fn asserted_level(self) -> bool {
        !self.is_active_low()
    }
}

impl fmt::Display for ControlLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlLine::BusOutputEnable => "nBusOE",
            ControlLine::RegALoad => "nLa",
            ControlLine::RegBLoad => "nLb",
            ControlLine::RegAOutputEnable => "nEa",
            ControlLine::AluOutputEnable => "nEu",
            ControlLine::AluSubtract => "Su",
        })
    }
}

/// Electrical levels of all control lines (`true` = high), plus a version
/// that moves on every mutation so latched copies can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLineSet {
    bits: u8,
    version: u64,
}

impl Default for ControlLineSet {
    fn default() -> Self {
        Self::idle()
    }
}

impl ControlLineSet {
    const USED: u8 = 0b0011_1111;

    /// Everything deasserted, add selected.
    pub fn idle() -> Self {
        let bits = ControlLine::ALL
            .iter()
            .filter(|line| line.is_active_low())
            .fold(0, |acc, line| acc | line.mask());
        Self { bits, version: 0 }
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            bits: bits & Self::USED,
            version: 0,
        }
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn level(&self, line: ControlLine) -> bool {
        self.bits & line.mask() != 0
    }

    pub fn is_asserted(&self, line: ControlLine) -> bool {
        self.level(line) == line.asserted_level()
    }

    pub fn set_level(&mut self, line: ControlLine, high: bool) {
        let bits = if high {
            self.bits | line.mask()
        } else {
            self.bits & !line.mask()
        };
        if bits != self.bits {
            self.bits = bits;
            self.version += 1;
        }
    }

    /// Asserting an output-enable while another one is asserted is refused.
    pub fn assert(&mut self, line: ControlLine) -> Result<(), Conflict> {
        if let Some(requested) = line.driver() {
            if let Some(held) = self.asserted_driver_other_than(requested) {
                return Err(Conflict { held, requested });
            }
        }
        self.set_level(line, line.asserted_level());
        Ok(())
    }

    pub fn deassert(&mut self, line: ControlLine) {
        self.set_level(line, !line.asserted_level());
    }

    pub fn asserted_drivers(&self) -> impl Iterator<Item = Driver> + '_ {
        Driver::ALL
            .into_iter()
            .filter(move |driver| self.is_asserted(driver.enable_line()))
    }

    fn asserted_driver_other_than(&self, driver: Driver) -> Option<Driver> {
        self.asserted_drivers().find(|other| *other != driver)
    }
}

impl fmt::Display for ControlLineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06b} (v{})", self.bits, self.version)
    }
}
