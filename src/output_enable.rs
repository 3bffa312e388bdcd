use std::fmt;

use log::info;
use serde::Serialize;

use crate::bus::{BusState, Driver};
use crate::clock::Edge;
use crate::control::ControlLine;
use crate::error::{HarnessError, Result};
use crate::load::RegisterId;
use crate::simulator::Harness;

/// Device-side units that can take the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BusSource {
    RegA,
    Alu,
}

impl BusSource {
    pub fn driver(self) -> Driver {
        match self {
            BusSource::RegA => Driver::RegA,
            BusSource::Alu => Driver::Alu,
        }
    }

    pub fn enable_line(self) -> ControlLine {
        self.driver().enable_line()
    }
}

impl fmt::Display for BusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.driver(), f)
    }
}

/// Hands the bus to a device-side source and checks it actually took it.
pub struct OutputEnableController<'a> {
    harness: &'a mut Harness,
}

impl<'a> OutputEnableController<'a> {
    pub fn new(harness: &'a mut Harness) -> Self {
        Self { harness }
    }

    /// Returns the state the source put on the bus.
    pub async fn enable(&mut self, source: BusSource) -> Result<BusState> {
        let harness = &mut *self.harness;

        info!("Flush bus to Hi-Z; set {source} output enable");
        harness.release_bus();
        harness.edges()?.edge_then_settle(Edge::Rising).await?;
        harness.set_line(source.enable_line(), true)?;

        info!("Wait for Hi-Z to propagate to bus, and for control signals to update (falling edge)");
        harness.edges()?.edge_then_settle(Edge::Falling).await?;
        let state = harness.sample()?;
        if state.is_idle() {
            return Err(HarnessError::OutputEnable {
                unit: source,
                actual: state,
                time_ns: harness.now(),
            });
        }
        info!("{source} output enabled, bus is {state}");
        Ok(state)
    }

    /// Reverse of [`enable`](Self::enable): output-enable first, then the
    /// bus if asked to.
    pub async fn disable(&mut self, source: BusSource, release: bool) -> Result<BusState> {
        let harness = &mut *self.harness;

        info!("Set {source} output disable");
        harness.set_line(source.enable_line(), false)?;
        if release {
            harness.release_bus();
        }
        harness.edges()?.edge_then_settle(Edge::Falling).await?;
        harness.sample()
    }

    /// Puts RegA on the bus and checks it against what was last loaded.
    pub async fn read_register_a(&mut self) -> Result<u8> {
        let state = self.enable(BusSource::RegA).await?;
        let harness = &*self.harness;
        match (state, harness.shadow().get(RegisterId::A)) {
            (BusState::Driven(value), Some(expected)) if value != expected => {
                Err(HarnessError::Readback {
                    driver: Driver::RegA,
                    expected,
                    actual: state,
                    time_ns: harness.now(),
                })
            }
            (BusState::Driven(value), _) => Ok(value),
            (state, _) => Err(HarnessError::Sample {
                state,
                time_ns: harness.now(),
            }),
        }
    }
}
