//! The device under test, seen only through its bus and control lines.

use log::trace;

use crate::bus::{BusState, Driver};
use crate::config::DeviceConfig;
use crate::control::{ControlLine, ControlLineSet};

/// Boundary of the device under test.
///
/// The board latches control lines at every falling edge and hands them to
/// the device, which answers with every source it is driving onto the bus.
/// Registers latch on the rising edge from the bus resolved at the
/// preceding falling edge.
pub trait Device: Send {
    fn name(&self) -> &str;

    fn on_falling_edge(&mut self, controls: &ControlLineSet) -> Vec<(Driver, BusState)>;

    fn on_rising_edge(&mut self, controls: &ControlLineSet, bus: BusState);

    /// What the bus lines read as at the device's pins once resolved.
    /// Only a faulty device (stuck-at bits, open pins) changes it.
    fn observe_bus(&mut self, bus: BusState) -> BusState {
        bus
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AluInputs {
    a: u8,
    b: u8,
    subtract: bool,
}

/// Reference datapath: RegA, RegB and an 8-bit add/subtract ALU whose
/// output needs a few cycles to settle after its inputs change.
#[derive(Debug, Clone)]
pub struct Datapath {
    reg_a: Option<u8>,
    reg_b: Option<u8>,
    alu_inputs: Option<AluInputs>,
    alu_settle_remaining: u32,
    alu_latency: u32,
}

impl Datapath {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            reg_a: None,
            reg_b: None,
            alu_inputs: None,
            alu_settle_remaining: 0,
            alu_latency: config.alu_latency_cycles,
        }
    }

    pub fn reg_a(&self) -> Option<u8> {
        self.reg_a
    }

    pub fn reg_b(&self) -> Option<u8> {
        self.reg_b
    }

    fn alu_output(&self) -> BusState {
        match self.alu_inputs {
            Some(inputs) if self.alu_settle_remaining == 0 => {
                let result = if inputs.subtract {
                    inputs.a.wrapping_sub(inputs.b)
                } else {
                    inputs.a.wrapping_add(inputs.b)
                };
                BusState::Driven(result)
            }
            _ => BusState::Unknown,
        }
    }

    fn update_alu(&mut self, subtract: bool) {
        let inputs = match (self.reg_a, self.reg_b) {
            (Some(a), Some(b)) => Some(AluInputs { a, b, subtract }),
            _ => None,
        };
        if inputs != self.alu_inputs {
            self.alu_inputs = inputs;
            self.alu_settle_remaining = self.alu_latency;
        } else {
            self.alu_settle_remaining = self.alu_settle_remaining.saturating_sub(1);
        }
    }
}

impl Default for Datapath {
    fn default() -> Self {
        Self::new(&DeviceConfig::default())
    }
}

impl Device for Datapath {
    fn name(&self) -> &str {
        "datapath"
    }

    fn on_falling_edge(&mut self, controls: &ControlLineSet) -> Vec<(Driver, BusState)> {
        self.update_alu(controls.is_asserted(ControlLine::AluSubtract));

        let mut drives = Vec::new();
        if controls.is_asserted(ControlLine::RegAOutputEnable) {
            drives.push((Driver::RegA, self.reg_a.map_or(BusState::Unknown, BusState::Driven)));
        }
        if controls.is_asserted(ControlLine::AluOutputEnable) {
            drives.push((Driver::Alu, self.alu_output()));
        }
        drives
    }

    fn on_rising_edge(&mut self, controls: &ControlLineSet, bus: BusState) {
        if controls.is_asserted(ControlLine::RegALoad) {
            trace!("RegA <- {bus}");
            self.reg_a = bus.value();
        }
        if controls.is_asserted(ControlLine::RegBLoad) {
            trace!("RegB <- {bus}");
            self.reg_b = bus.value();
        }
    }
}
