use serde::Serialize;
use thiserror::Error;

use crate::alu::AluOp;
use crate::bus::{BusState, Driver};
use crate::clock::SimTime;
use crate::load::RegisterId;
use crate::output_enable::BusSource;

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Every way a scenario can fail. All of them are fatal to the scenario
/// that raised them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    #[error("bus contention at {time_ns} ns: {requested} tried to drive while {held} holds the bus")]
    Contention {
        held: Driver,
        requested: Driver,
        time_ns: SimTime,
    },

    #[error("sample failed at {time_ns} ns: expected a defined value, bus is {state}")]
    Sample { state: BusState, time_ns: SimTime },

    #[error("bus load failed for register {register} at {time_ns} ns: expected {expected}, got {actual}")]
    BusLoad {
        register: RegisterId,
        expected: u8,
        actual: BusState,
        time_ns: SimTime,
    },

    #[error("{unit} read failed at {time_ns} ns: bus is {actual}")]
    OutputEnable {
        unit: BusSource,
        actual: BusState,
        time_ns: SimTime,
    },

    #[error("timeout: {op} of a={a}, b={b} did not reach {expected} within {timeout_ns} ns (elapsed {elapsed_ns} ns, last bus {last})")]
    Timeout {
        op: AluOp,
        a: u8,
        b: u8,
        expected: u8,
        last: BusState,
        elapsed_ns: SimTime,
        timeout_ns: SimTime,
        time_ns: SimTime,
    },

    #[error("read back {actual} from {driver} at {time_ns} ns, expected {expected}")]
    Readback {
        driver: Driver,
        expected: u8,
        actual: BusState,
        time_ns: SimTime,
    },

    #[error("expected a {expected} at {time_ns} ns but the harness carried on")]
    MissedFault {
        expected: &'static str,
        time_ns: SimTime,
    },

    #[error("unknown register: {name}")]
    InvalidRegister { name: String },

    #[error("unknown operation code: {code}")]
    InvalidOperation { code: u8 },

    #[error("reset validation failed at {time_ns} ns: expected ZZZZZZZZ or XXXXXXXX, got {actual}")]
    ResetValidation { actual: BusState, time_ns: SimTime },

    #[error("invalid harness configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("clock is not running")]
    ClockStopped,
}

/// Flattened, serialisable view of a failure for scenario reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureContext {
    pub kind: &'static str,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub time_ns: Option<SimTime>,
}

impl HarnessError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Contention { .. } => "ContentionError",
            Self::Sample { .. } => "SampleError",
            Self::BusLoad { .. } => "BusLoadError",
            Self::OutputEnable { .. } => "OutputEnableError",
            Self::Timeout { .. } => "TimeoutError",
            Self::Readback { .. } => "ReadbackError",
            Self::MissedFault { .. } => "MissedFaultError",
            Self::InvalidRegister { .. } => "InvalidRegisterError",
            Self::InvalidOperation { .. } => "InvalidOperationError",
            Self::ResetValidation { .. } => "ResetValidationError",
            Self::InvalidConfig { .. } => "InvalidConfigError",
            Self::ClockStopped => "ClockStopped",
        }
    }

    /// Simulated time at which the failure was observed, if it happened on
    /// the clock at all.
    pub fn time_ns(&self) -> Option<SimTime> {
        match self {
            Self::Contention { time_ns, .. }
            | Self::Sample { time_ns, .. }
            | Self::BusLoad { time_ns, .. }
            | Self::OutputEnable { time_ns, .. }
            | Self::Timeout { time_ns, .. }
            | Self::Readback { time_ns, .. }
            | Self::MissedFault { time_ns, .. }
            | Self::ResetValidation { time_ns, .. } => Some(*time_ns),
            Self::InvalidRegister { .. }
            | Self::InvalidOperation { .. }
            | Self::InvalidConfig { .. }
            | Self::ClockStopped => None,
        }
    }

    pub fn context(&self) -> FailureContext {
        let (expected, actual) = match self {
            Self::Contention { held, requested, .. } => {
                (Some(format!("{held} only")), Some(format!("{held} + {requested}")))
            }
            Self::Sample { state, .. } => (Some("defined value".to_string()), Some(state.to_string())),
            Self::BusLoad {
                expected, actual, ..
            } => (Some(BusState::Driven(*expected).to_string()), Some(actual.to_string())),
            Self::OutputEnable { actual, .. } => {
                (Some("driven bus".to_string()), Some(actual.to_string()))
            }
            Self::Timeout { expected, last, .. } => {
                (Some(BusState::Driven(*expected).to_string()), Some(last.to_string()))
            }
            Self::Readback {
                expected, actual, ..
            } => (Some(BusState::Driven(*expected).to_string()), Some(actual.to_string())),
            Self::MissedFault { expected, .. } => (Some((*expected).to_string()), None),
            Self::ResetValidation { actual, .. } => {
                (Some("ZZZZZZZZ | XXXXXXXX".to_string()), Some(actual.to_string()))
            }
            Self::InvalidRegister { name } => (Some("a | b".to_string()), Some(name.clone())),
            Self::InvalidOperation { code } => (Some("0 | 1".to_string()), Some(code.to_string())),
            Self::InvalidConfig { reason } => (None, Some(reason.clone())),
            Self::ClockStopped => (None, None),
        };
        FailureContext {
            kind: self.kind(),
            message: self.to_string(),
            expected,
            actual,
            time_ns: self.time_ns(),
        }
    }
}
