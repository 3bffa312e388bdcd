//! Register load protocol: drive the bus, pulse the load line, let the
//! register latch on a rising edge.

use std::fmt;
use std::str::FromStr;

use log::info;
use serde::Serialize;

use crate::bus::BusState;
use crate::clock::Edge;
use crate::control::ControlLine;
use crate::error::{HarnessError, Result};
use crate::simulator::Harness;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegisterId {
    A,
    B,
}

impl RegisterId {
    pub fn load_line(self) -> ControlLine {
        match self {
            RegisterId::A => ControlLine::RegALoad,
            RegisterId::B => ControlLine::RegBLoad,
        }
    }
}

impl FromStr for RegisterId {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(RegisterId::A),
            "b" => Ok(RegisterId::B),
            _ => Err(HarnessError::InvalidRegister {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegisterId::A => "A",
            RegisterId::B => "B",
        })
    }
}

pub struct LoadSequencer<'a> {
    harness: &'a mut Harness,
}

impl<'a> LoadSequencer<'a> {
    pub fn new(harness: &'a mut Harness) -> Self {
        Self { harness }
    }

    /// Loads by register name; anything but `a`/`b` fails before the clock
    /// is touched.
    pub async fn load_named(&mut self, register: &str, value: u8) -> Result<()> {
        let register = register.parse()?;
        self.load(register, value).await
    }

    pub async fn load(&mut self, register: RegisterId, value: u8) -> Result<()> {
        let harness = &mut *self.harness;

        // Let the tail of whatever came before drain off the bus
        harness.release_bus();
        harness.edges()?.settle().await?;

        info!("Set bus to {value}");
        harness.drive_bus(value)?;
        harness.edges()?.settle().await?;

        info!("Register {register} loading");
        harness.set_line(register.load_line(), true)?;

        info!("Wait for val to propagate to bus, and for control signals to update (falling edge)");
        harness.edges()?.edge_then_settle(Edge::Falling).await?;
        match harness.sample()? {
            BusState::Driven(seen) if seen == value => {}
            BusState::Unknown => {
                return Err(HarnessError::Sample {
                    state: BusState::Unknown,
                    time_ns: harness.now(),
                })
            }
            actual => {
                return Err(HarnessError::BusLoad {
                    register,
                    expected: value,
                    actual,
                    time_ns: harness.now(),
                })
            }
        }

        info!("Wait for val to be latched to the registers");
        harness.edges()?.edge_then_settle(Edge::Rising).await?;

        info!("Reset loading signals");
        harness.set_line(register.load_line(), false)?;
        harness.shadow_mut().set(register, value);
        Ok(())
    }
}
