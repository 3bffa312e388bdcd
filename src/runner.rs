//! Named scenarios and the runner that executes each one against its own
//! freshly reset harness.

use std::future::Future;
use std::pin::Pin;

use log::{error, info};
use serde::Serialize;

use crate::alu::AluOp;
use crate::bus::{BusState, Driver};
use crate::clock::{Edge, SimTime};
use crate::config::HarnessConfig;
use crate::control::ControlLine;
use crate::error::{FailureContext, HarnessError, Result};
use crate::load::RegisterId;
use crate::output_enable::BusSource;
use crate::scenario::{ScenarioGenerator, TestScenario};
use crate::simulator::Harness;

pub type ScenarioFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
pub type ScenarioFn = for<'a> fn(&'a mut Harness, &'a mut ScenarioGenerator) -> ScenarioFuture<'a>;

pub struct NamedScenario {
    pub name: &'static str,
    pub description: &'static str,
    pub run: ScenarioFn,
}

impl std::fmt::Debug for NamedScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedScenario").field("name", &self.name).finish()
    }
}

pub static SCENARIOS: &[NamedScenario] = &[
    NamedScenario {
        name: "load_a_128",
        description: "load 128 into RegA, bus reads 128 after the falling-edge settle window",
        run: load_a_128,
    },
    NamedScenario {
        name: "load_a_200_read",
        description: "load 200 into RegA, enable its output, bus reads 200",
        run: load_a_200_read,
    },
    NamedScenario {
        name: "alu_add_10_20",
        description: "10 + 20 converges to 30",
        run: alu_add_10_20,
    },
    NamedScenario {
        name: "alu_subtract_5_10",
        description: "5 - 10 converges to 251",
        run: alu_subtract_5_10,
    },
    NamedScenario {
        name: "alu_subtract_zero",
        description: "0 - 0 converges to 0",
        run: alu_subtract_zero,
    },
    NamedScenario {
        name: "contention_injection",
        description: "RegA and ALU output enables together raise a contention error",
        run: contention_injection,
    },
    NamedScenario {
        name: "accumulator_randint",
        description: "load a random value into RegA",
        run: accumulator_randint,
    },
    NamedScenario {
        name: "accumulator_randint_out",
        description: "load and read back a random value through RegA's output",
        run: accumulator_randint_out,
    },
    NamedScenario {
        name: "accumulator_shuffled_range",
        description: "load and read back every 8-bit value in shuffled order",
        run: accumulator_shuffled_range,
    },
    NamedScenario {
        name: "alu_random",
        description: "random operands through add and subtract",
        run: alu_random,
    },
    NamedScenario {
        name: "random_sequence",
        description: "a chain of random load/read/add/subtract operations on one harness",
        run: random_sequence,
    },
];

pub fn find(name: &str) -> Option<&'static NamedScenario> {
    SCENARIOS.iter().find(|scenario| scenario.name == name)
}

fn expect_bus(harness: &Harness, driver: Driver, expected: u8) -> Result<()> {
    let actual = harness.sample()?;
    if actual != BusState::Driven(expected) {
        return Err(HarnessError::Readback {
            driver,
            expected,
            actual,
            time_ns: harness.now(),
        });
    }
    Ok(())
}

fn load_a_128<'a>(harness: &'a mut Harness, _: &'a mut ScenarioGenerator) -> ScenarioFuture<'a> {
    Box::pin(async move {
        harness.loader().load(RegisterId::A, 128).await?;
        harness.edges()?.edge_then_settle(Edge::Falling).await?;
        expect_bus(harness, Driver::External, 128)
    })
}

fn load_a_200_read<'a>(
    harness: &'a mut Harness,
    _: &'a mut ScenarioGenerator,
) -> ScenarioFuture<'a> {
    Box::pin(async move {
        harness.loader().load(RegisterId::A, 200).await?;
        harness.outputs().read_register_a().await?;
        expect_bus(harness, Driver::RegA, 200)
    })
}

async fn check_alu(harness: &mut Harness, op: AluOp, a: u8, b: u8) -> Result<()> {
    let timeout = harness.config().alu_timeout_ns;
    TestScenario::alu(op, a, b, timeout).execute(harness).await?;
    Ok(())
}

fn alu_add_10_20<'a>(harness: &'a mut Harness, _: &'a mut ScenarioGenerator) -> ScenarioFuture<'a> {
    Box::pin(check_alu(harness, AluOp::Add, 10, 20))
}

fn alu_subtract_5_10<'a>(
    harness: &'a mut Harness,
    _: &'a mut ScenarioGenerator,
) -> ScenarioFuture<'a> {
    Box::pin(check_alu(harness, AluOp::Subtract, 5, 10))
}

fn alu_subtract_zero<'a>(
    harness: &'a mut Harness,
    _: &'a mut ScenarioGenerator,
) -> ScenarioFuture<'a> {
    Box::pin(check_alu(harness, AluOp::Subtract, 0, 0))
}

fn contention_injection<'a>(
    harness: &'a mut Harness,
    _: &'a mut ScenarioGenerator,
) -> ScenarioFuture<'a> {
    Box::pin(async move {
        harness.loader().load(RegisterId::A, 0x55).await?;
        harness.release_bus();
        harness.set_line(ControlLine::RegAOutputEnable, true)?;
        match harness.set_line(ControlLine::AluOutputEnable, true) {
            Err(HarnessError::Contention { held, requested, .. }) => {
                info!("Contention between {held} and {requested} detected as expected");
                Ok(())
            }
            Err(other) => Err(other),
            Ok(()) => Err(HarnessError::MissedFault {
                expected: "ContentionError",
                time_ns: harness.now(),
            }),
        }
    })
}

fn accumulator_randint<'a>(
    harness: &'a mut Harness,
    generator: &'a mut ScenarioGenerator,
) -> ScenarioFuture<'a> {
    Box::pin(async move {
        let value = generator.random_value();
        info!("Test load operation with val={value}");
        harness.loader().load(RegisterId::A, value).await?;
        expect_bus(harness, Driver::External, value)
    })
}

/// Reads RegA back, then checks it keeps the bus for another settle window.
async fn read_and_hold(harness: &mut Harness, value: u8) -> Result<()> {
    harness.outputs().read_register_a().await?;
    info!("Accumulator enable output successful");
    harness.edges()?.edge_then_settle(Edge::Falling).await?;
    expect_bus(harness, Driver::RegA, value)
}

fn accumulator_randint_out<'a>(
    harness: &'a mut Harness,
    generator: &'a mut ScenarioGenerator,
) -> ScenarioFuture<'a> {
    Box::pin(async move {
        let value = generator.random_value();
        info!("Test load operation with val={value}");
        harness.loader().load(RegisterId::A, value).await?;
        read_and_hold(harness, value).await
    })
}

fn accumulator_shuffled_range<'a>(
    harness: &'a mut Harness,
    generator: &'a mut ScenarioGenerator,
) -> ScenarioFuture<'a> {
    Box::pin(async move {
        for value in generator.shuffled_range() {
            harness.loader().load(RegisterId::A, value).await?;
            read_and_hold(harness, value).await?;
            harness.outputs().disable(BusSource::RegA, false).await?;
        }
        Ok(())
    })
}

fn alu_random<'a>(
    harness: &'a mut Harness,
    generator: &'a mut ScenarioGenerator,
) -> ScenarioFuture<'a> {
    Box::pin(async move {
        for op in [AluOp::Add, AluOp::Subtract] {
            let (a, b) = generator.random_operands();
            check_alu(harness, op, a, b).await?;
        }
        Ok(())
    })
}

fn random_sequence<'a>(
    harness: &'a mut Harness,
    generator: &'a mut ScenarioGenerator,
) -> ScenarioFuture<'a> {
    Box::pin(async move {
        let timeout = harness.config().alu_timeout_ns;
        for _ in 0..8 {
            generator.random_scenario(timeout).execute(harness).await?;
        }
        Ok(())
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    pub seed: u64,
    pub sim_time_ns: SimTime,
    pub failure: Option<FailureContext>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub reports: Vec<ScenarioReport>,
}

impl RunSummary {
    pub fn passed(&self) -> bool {
        self.reports.iter().all(|report| report.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.reports.iter().filter(|report| !report.passed).count()
    }

    pub fn first_failure(&self) -> Option<&ScenarioReport> {
        self.reports.iter().find(|report| !report.passed)
    }
}

/// Runs one scenario in its own task so a failure or panic ends only that
/// scenario.
pub async fn run_scenario(
    scenario: &'static NamedScenario,
    config: &HarnessConfig,
    seed: u64,
) -> ScenarioReport {
    info!("Running {} (seed {seed}): {}", scenario.name, scenario.description);
    let config = config.clone();
    let task = tokio::spawn(async move {
        let mut harness = Harness::with_datapath(config);
        let mut generator = ScenarioGenerator::new(seed);
        let outcome = match harness.reset().await {
            Ok(_) => (scenario.run)(&mut harness, &mut generator).await,
            Err(e) => Err(e),
        };
        (outcome, harness.now())
    });

    let (failure, sim_time_ns) = match task.await {
        Ok((Ok(()), now)) => (None, now),
        Ok((Err(e), now)) => {
            error!("{} failed: {e}", scenario.name);
            (Some(e.context()), now)
        }
        Err(join_error) => {
            error!("{} aborted: {join_error}", scenario.name);
            let failure = FailureContext {
                kind: if join_error.is_panic() { "Panic" } else { "Cancelled" },
                message: join_error.to_string(),
                expected: None,
                actual: None,
                time_ns: None,
            };
            (Some(failure), 0)
        }
    };

    if failure.is_none() {
        info!("{} completed successfully at {sim_time_ns} ns", scenario.name);
    }
    ScenarioReport {
        name: scenario.name.to_string(),
        passed: failure.is_none(),
        seed,
        sim_time_ns,
        failure,
    }
}

pub async fn run_all(
    scenarios: &[&'static NamedScenario],
    config: &HarnessConfig,
    seed: u64,
) -> RunSummary {
    let mut summary = RunSummary::default();
    for scenario in scenarios {
        summary.reports.push(run_scenario(scenario, config, seed).await);
    }
    summary
}
