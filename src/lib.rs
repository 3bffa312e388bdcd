pub mod alu;
pub mod bus;
pub mod clock;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod load;
pub mod output_enable;
pub mod reset;
pub mod runner;
pub mod scenario;
pub mod simulator;

pub use alu::{AluOp, AluVerifier, Convergence};
pub use bus::{BusState, Conflict, Driver, SignalBus};
pub use clock::{ClockGenerator, ClockSignal, Edge, EdgeSynchronizer, SimTime};
pub use config::{DeviceConfig, HarnessConfig};
pub use control::{ControlLine, ControlLineSet};
pub use device::{Datapath, Device};
pub use error::{FailureContext, HarnessError, Result};
pub use load::{LoadSequencer, RegisterId};
pub use output_enable::{BusSource, OutputEnableController};
pub use reset::ResetSequencer;
pub use runner::{run_all, run_scenario, NamedScenario, RunSummary, ScenarioReport, SCENARIOS};
pub use scenario::{ScenarioGenerator, ScenarioKind, TestScenario};
pub use simulator::{create_harness_runtime, Harness, RegisterShadow};
