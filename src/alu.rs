//! ALU checks. The ALU's settle time is not assumed to be fixed: a result
//! is correct when the bus converges to the oracle within the timeout.

use std::fmt;

use log::{debug, info, warn};
use serde::Serialize;

use crate::bus::BusState;
use crate::clock::{Edge, SimTime};
use crate::control::ControlLine;
use crate::error::{HarnessError, Result};
use crate::load::RegisterId;
use crate::simulator::Harness;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum AluOp {
    Add = 0,
    Subtract = 1,
}

impl AluOp {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(AluOp::Add),
            1 => Ok(AluOp::Subtract),
            _ => Err(HarnessError::InvalidOperation { code }),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Oracle: two's-complement wraparound, no overflow flag.
    pub fn apply(self, a: u8, b: u8) -> u8 {
        match self {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Subtract => a.wrapping_sub(b),
        }
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AluOp::Add => "Addition",
            AluOp::Subtract => "Subtraction",
        })
    }
}

/// How a successful check converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Convergence {
    pub result: u8,
    pub elapsed_ns: SimTime,
    /// Rising edges sampled, the matching one included.
    pub cycles: u32,
    pub time_ns: SimTime,
}

pub struct AluVerifier<'a> {
    harness: &'a mut Harness,
}

impl<'a> AluVerifier<'a> {
    pub fn new(harness: &'a mut Harness) -> Self {
        Self { harness }
    }

    /// Same as [`verify`](Self::verify) with a raw operation code.
    pub async fn verify_code(
        &mut self,
        a: u8,
        b: u8,
        code: u8,
        timeout_ns: SimTime,
    ) -> Result<Convergence> {
        let op = AluOp::from_code(code)?;
        self.verify(a, b, op, timeout_ns).await
    }

    /// Loads the operands, puts the ALU on the bus and waits for the result
    /// on every rising edge until it matches or the budget runs out.
    ///
    /// Leaves the ALU driving the bus.
    pub async fn verify(
        &mut self,
        a: u8,
        b: u8,
        op: AluOp,
        timeout_ns: SimTime,
    ) -> Result<Convergence> {
        let harness = &mut *self.harness;

        harness.loader().load(RegisterId::A, a).await?;
        harness.loader().load(RegisterId::B, b).await?;

        harness.release_bus();
        harness.set_line(ControlLine::AluSubtract, op == AluOp::Subtract)?;
        harness.set_line(ControlLine::AluOutputEnable, true)?;

        let expected = op.apply(a, b);
        let start = harness.now();
        let mut cycles = 0;
        loop {
            let signal = harness.edges()?.wait_for_edge(Edge::Rising).await?;
            cycles += 1;
            let elapsed_ns = signal.time - start;
            let last = harness.sample()?;
            debug!("{op} poll #{cycles}: bus {last} after {elapsed_ns} ns");

            if last == BusState::Driven(expected) {
                info!(
                    "{op} operation successful: a={a}, b={b}, result={expected} (Time taken: {elapsed_ns} ns)"
                );
                return Ok(Convergence {
                    result: expected,
                    elapsed_ns,
                    cycles,
                    time_ns: signal.time,
                });
            }
            if elapsed_ns >= timeout_ns {
                warn!("Timeout: {op} did not complete within {timeout_ns} ns");
                return Err(HarnessError::Timeout {
                    op,
                    a,
                    b,
                    expected,
                    last,
                    elapsed_ns,
                    timeout_ns,
                    time_ns: signal.time,
                });
            }
        }
    }
}
