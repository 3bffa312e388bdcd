//! Stimulus generation and the single-operation test scenarios built from it.

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::alu::AluOp;
use crate::bus::{BusState, Driver};
use crate::clock::SimTime;
use crate::error::{HarnessError, Result};
use crate::load::RegisterId;
use crate::output_enable::BusSource;
use crate::simulator::Harness;

/// Seeded source of stimulus values. The seed is kept so a failing run can
/// be replayed.
#[derive(Debug, Clone)]
pub struct ScenarioGenerator {
    seed: u64,
    rng: StdRng,
}

impl ScenarioGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Picks a fresh seed from the OS.
    pub fn from_entropy() -> Self {
        Self::new(rand::rng().random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn random_value(&mut self) -> u8 {
        self.rng.random()
    }

    pub fn random_operands(&mut self) -> (u8, u8) {
        (self.random_value(), self.random_value())
    }

    pub fn random_op(&mut self) -> AluOp {
        if self.rng.random_bool(0.5) {
            AluOp::Subtract
        } else {
            AluOp::Add
        }
    }

    /// Every 8-bit value exactly once, in random order.
    pub fn shuffled_range(&mut self) -> Vec<u8> {
        let mut values: Vec<u8> = (0..=u8::MAX).collect();
        values.shuffle(&mut self.rng);
        values
    }

    pub fn random_scenario(&mut self, timeout_ns: SimTime) -> TestScenario {
        match self.rng.random_range(0..4) {
            0 => {
                let register = if self.rng.random_bool(0.5) {
                    RegisterId::A
                } else {
                    RegisterId::B
                };
                TestScenario::load(register, self.random_value())
            }
            1 => TestScenario::read(self.random_value()),
            _ => {
                let (a, b) = self.random_operands();
                TestScenario::alu(self.random_op(), a, b, timeout_ns)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScenarioKind {
    Load { register: RegisterId, value: u8 },
    /// Load RegA, then read it back through its output enable.
    Read { value: u8 },
    Add { a: u8, b: u8 },
    Subtract { a: u8, b: u8 },
}

/// One operation with its expected bus value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestScenario {
    pub kind: ScenarioKind,
    pub expected: u8,
    /// Only bounds ALU convergence; edge waits have no deadline.
    pub timeout_ns: SimTime,
}

impl TestScenario {
    const DEFAULT_TIMEOUT_NS: SimTime = 200;

    pub fn load(register: RegisterId, value: u8) -> Self {
        Self {
            kind: ScenarioKind::Load { register, value },
            expected: value,
            timeout_ns: Self::DEFAULT_TIMEOUT_NS,
        }
    }

    pub fn read(value: u8) -> Self {
        Self {
            kind: ScenarioKind::Read { value },
            expected: value,
            timeout_ns: Self::DEFAULT_TIMEOUT_NS,
        }
    }

    pub fn alu(op: AluOp, a: u8, b: u8, timeout_ns: SimTime) -> Self {
        let kind = match op {
            AluOp::Add => ScenarioKind::Add { a, b },
            AluOp::Subtract => ScenarioKind::Subtract { a, b },
        };
        Self {
            kind,
            expected: op.apply(a, b),
            timeout_ns,
        }
    }

    /// Runs the operation and leaves no device-side driver on the bus, so
    /// scenarios can be chained on one harness. Returns the observed value.
    pub async fn execute(&self, harness: &mut Harness) -> Result<u8> {
        info!("Scenario {:?}, expecting {}", self.kind, self.expected);
        let (driver, observed) = match self.kind {
            ScenarioKind::Load { register, value } => {
                harness.loader().load(register, value).await?;
                (Driver::External, harness.sample_value()?)
            }
            ScenarioKind::Read { value } => {
                harness.loader().load(RegisterId::A, value).await?;
                let observed = harness.outputs().read_register_a().await?;
                harness.outputs().disable(BusSource::RegA, false).await?;
                (Driver::RegA, observed)
            }
            ScenarioKind::Add { a, b } => {
                (Driver::Alu, self.run_alu(harness, AluOp::Add, a, b).await?)
            }
            ScenarioKind::Subtract { a, b } => {
                (Driver::Alu, self.run_alu(harness, AluOp::Subtract, a, b).await?)
            }
        };

        if observed != self.expected {
            return Err(HarnessError::Readback {
                driver,
                expected: self.expected,
                actual: BusState::Driven(observed),
                time_ns: harness.now(),
            });
        }
        Ok(observed)
    }

    async fn run_alu(&self, harness: &mut Harness, op: AluOp, a: u8, b: u8) -> Result<u8> {
        let done = harness.alu().verify(a, b, op, self.timeout_ns).await?;
        harness.outputs().disable(BusSource::Alu, false).await?;
        Ok(done.result)
    }
}
