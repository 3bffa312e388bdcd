use datapath_harness::runner::{find, run_scenario};
use datapath_harness::{
    AluOp, BusSource, BusState, ControlLine, ControlLineSet, Datapath, Device, DeviceConfig,
    Driver, Edge, Harness, HarnessConfig, HarnessError, RegisterId, ScenarioGenerator,
    TestScenario,
};

async fn fresh_harness() -> Harness {
    let mut harness = Harness::with_datapath(HarnessConfig::default());
    harness.reset().await.expect("reset");
    harness
}

async fn harness_with<D: Device + 'static>(device: D) -> Harness {
    let mut harness = Harness::new(HarnessConfig::default(), device);
    harness.reset().await.expect("reset");
    harness
}

/// Wraps the reference datapath and lets a test corrupt one piece of it.
struct Faulty {
    inner: Datapath,
    fault: Fault,
}

#[derive(Clone, Copy)]
enum Fault {
    /// Bus bits stuck low wherever the mask has a zero.
    StuckLow(u8),
    OpenPins,
    UndefinedPins,
    AluOffByOne,
    /// ALU drives whenever RegA does.
    AluFollowsRegA,
}

impl Faulty {
    fn new(fault: Fault) -> Self {
        Self {
            inner: Datapath::default(),
            fault,
        }
    }
}

impl Device for Faulty {
    fn name(&self) -> &str {
        "faulty-datapath"
    }

    fn on_falling_edge(&mut self, controls: &ControlLineSet) -> Vec<(Driver, BusState)> {
        let mut drives = self.inner.on_falling_edge(controls);
        match self.fault {
            Fault::AluOffByOne => {
                for (driver, state) in drives.iter_mut() {
                    if let (Driver::Alu, BusState::Driven(v)) = (*driver, *state) {
                        *state = BusState::Driven(v.wrapping_add(1));
                    }
                }
            }
            Fault::AluFollowsRegA => {
                if controls.is_asserted(ControlLine::RegAOutputEnable) {
                    drives.push((Driver::Alu, BusState::Driven(0)));
                }
            }
            _ => {}
        }
        drives
    }

    fn on_rising_edge(&mut self, controls: &ControlLineSet, bus: BusState) {
        self.inner.on_rising_edge(controls, bus);
    }

    fn observe_bus(&mut self, bus: BusState) -> BusState {
        match (self.fault, bus) {
            (Fault::StuckLow(mask), BusState::Driven(v)) => BusState::Driven(v & mask),
            (Fault::OpenPins, _) => BusState::HighZ,
            (Fault::UndefinedPins, _) => BusState::Unknown,
            _ => bus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reset_postcondition() {
        let mut harness = Harness::with_datapath(HarnessConfig::default());
        let state = harness.reset().await.unwrap();
        assert!(state == BusState::HighZ || state == BusState::Unknown);
        assert!(harness.controls().asserted_drivers().next().is_none());
        assert_eq!(harness.controls().bits(), 0b0001_1111);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_a_128_reads_back_after_settle() {
        let mut harness = fresh_harness().await;
        harness.loader().load(RegisterId::A, 128).await.unwrap();

        harness
            .edges()
            .unwrap()
            .edge_then_settle(Edge::Falling)
            .await
            .unwrap();
        assert_eq!(harness.sample_value().unwrap(), 128);
        assert_eq!(harness.shadow().get(RegisterId::A), Some(128));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_a_200_then_enable_output() {
        let mut harness = fresh_harness().await;
        harness.loader().load(RegisterId::A, 200).await.unwrap();

        let value = harness.outputs().read_register_a().await.unwrap();
        assert_eq!(value, 200);
        assert_eq!(harness.sample().unwrap(), BusState::Driven(200));
        // The harness let go of the bus before RegA took it
        assert_eq!(harness.bus_owner(), Some(Driver::RegA));
        assert!(!harness.controls().is_asserted(ControlLine::BusOutputEnable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_10_20_converges_to_30() {
        let mut harness = fresh_harness().await;
        let done = harness.alu().verify(10, 20, AluOp::Add, 200).await.unwrap();
        assert_eq!(done.result, 30);
        assert!(done.elapsed_ns <= 200);
        assert_eq!(harness.sample_value().unwrap(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subtract_5_10_converges_to_251() {
        let mut harness = fresh_harness().await;
        let done = harness.alu().verify(5, 10, AluOp::Subtract, 200).await.unwrap();
        assert_eq!(done.result, 251);
        assert!(done.elapsed_ns <= 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subtract_zero_operands() {
        let mut harness = fresh_harness().await;
        let done = harness.alu().verify_code(0, 0, 1, 200).await.unwrap();
        assert_eq!(done.result, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_output_enables_is_contention() {
        let mut harness = fresh_harness().await;
        harness.loader().load(RegisterId::A, 0x55).await.unwrap();
        harness.release_bus();
        harness.set_line(ControlLine::RegAOutputEnable, true).unwrap();

        let err = harness
            .set_line(ControlLine::AluOutputEnable, true)
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Contention {
                held: Driver::RegA,
                requested: Driver::Alu,
                ..
            }
        ));

        // Nothing merged: only RegA ever reaches the bus
        harness
            .edges()
            .unwrap()
            .edge_then_settle(Edge::Falling)
            .await
            .unwrap();
        assert_eq!(harness.sample().unwrap(), BusState::Driven(0x55));
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_side_contention_surfaces() {
        let mut harness = harness_with(Faulty::new(Fault::AluFollowsRegA)).await;
        harness.loader().load(RegisterId::A, 9).await.unwrap();

        let err = harness.outputs().enable(BusSource::RegA).await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Contention {
                held: Driver::RegA,
                requested: Driver::Alu,
                ..
            }
        ));
        assert_eq!(err.kind(), "ContentionError");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_bit_is_a_bus_load_error() {
        let mut harness = harness_with(Faulty::new(Fault::StuckLow(0x7F))).await;
        let err = harness.loader().load(RegisterId::A, 128).await.unwrap_err();
        match err {
            HarnessError::BusLoad {
                register,
                expected,
                actual,
                ..
            } => {
                assert_eq!(register, RegisterId::A);
                assert_eq!(expected, 128);
                assert_eq!(actual, BusState::Driven(0));
            }
            other => panic!("expected bus load error, got {other}"),
        }
        assert_eq!(harness.shadow().get(RegisterId::A), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undefined_bus_is_a_sample_error() {
        let mut harness = harness_with(Faulty::new(Fault::UndefinedPins)).await;
        let err = harness.loader().load(RegisterId::B, 1).await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Sample {
                state: BusState::Unknown,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_pins_fail_output_enable() {
        let mut harness = harness_with(Faulty::new(Fault::OpenPins)).await;
        let err = harness.outputs().enable(BusSource::RegA).await.unwrap_err();
        assert_eq!(
            err.context().actual.as_deref(),
            Some("ZZZZZZZZ"),
            "{err}"
        );
        assert!(matches!(
            err,
            HarnessError::OutputEnable {
                unit: BusSource::RegA,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_alu_times_out_deterministically() {
        let mut harness = harness_with(Faulty::new(Fault::AluOffByOne)).await;
        let err = harness
            .alu()
            .verify(10, 20, AluOp::Add, 200)
            .await
            .unwrap_err();
        match err {
            HarnessError::Timeout {
                op,
                a,
                b,
                expected,
                last,
                elapsed_ns,
                timeout_ns,
                ..
            } => {
                assert_eq!(op, AluOp::Add);
                assert_eq!((a, b), (10, 20));
                assert_eq!(expected, 30);
                assert_eq!(last, BusState::Driven(31));
                assert_eq!(elapsed_ns, 200);
                assert_eq!(timeout_ns, 200);
            }
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_clock_period_fails_instead_of_hanging() {
        let config = HarnessConfig {
            clock_period_ns: 1,
            device: DeviceConfig {
                alu_latency_cycles: 1_000_000,
            },
            ..HarnessConfig::default()
        };
        let mut harness = Harness::with_datapath(config.clone());

        let err = harness.reset().await.unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig { .. }), "{err}");
        assert!(!harness.is_running());

        // Nothing clock-driven can start on this harness
        let err = harness
            .alu()
            .verify(5, 10, AluOp::Subtract, 200)
            .await
            .unwrap_err();
        assert_eq!(err, HarnessError::ClockStopped);

        let report = run_scenario(find("alu_subtract_5_10").unwrap(), &config, 1).await;
        assert!(!report.passed);
        assert_eq!(report.failure.unwrap().kind, "InvalidConfigError");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_settle_margin_is_rejected() {
        let config = HarnessConfig {
            settle_cycles: 0,
            ..HarnessConfig::default()
        };
        let mut harness = Harness::with_datapath(config);
        let err = harness.reset().await.unwrap_err();
        assert_eq!(err.kind(), "InvalidConfigError");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_register_name() {
        let mut harness = fresh_harness().await;
        let before = harness.now();
        let err = harness.loader().load_named("c", 1).await.unwrap_err();
        assert_eq!(
            err,
            HarnessError::InvalidRegister {
                name: "c".to_string()
            }
        );
        assert_eq!(harness.now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_b_reaches_the_alu() {
        let mut harness = fresh_harness().await;
        harness.loader().load_named("b", 77).await.unwrap();
        // a + b with a = 0 shows RegB on the bus
        let done = harness.alu().verify(0, 77, AluOp::Add, 200).await.unwrap();
        assert_eq!(done.result, 77);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_alu_within_budget() {
        let config = HarnessConfig {
            device: DeviceConfig {
                alu_latency_cycles: 15,
            },
            ..HarnessConfig::default()
        };
        let mut harness = Harness::with_datapath(config);
        harness.reset().await.unwrap();

        let done = harness.alu().verify(200, 100, AluOp::Add, 200).await.unwrap();
        assert_eq!(done.result, 44);
        assert!(done.cycles > 1, "a slow ALU needs more than one poll");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenarios_chain_on_one_harness() {
        let mut harness = fresh_harness().await;
        let steps = [
            TestScenario::load(RegisterId::A, 3),
            TestScenario::read(250),
            TestScenario::alu(AluOp::Subtract, 5, 10, 200),
            TestScenario::load(RegisterId::B, 0),
            TestScenario::alu(AluOp::Add, 255, 255, 200),
            TestScenario::read(1),
        ];
        for step in steps {
            let observed = step.execute(&mut harness).await.unwrap();
            assert_eq!(observed, step.expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shuffled_scan_round_trips_every_value() {
        let mut harness = fresh_harness().await;
        let mut generator = ScenarioGenerator::new(2024);
        let values = generator.shuffled_range();
        assert_eq!(values.len(), 256);

        for value in values {
            harness.loader().load(RegisterId::A, value).await.unwrap();
            assert_eq!(harness.outputs().read_register_a().await.unwrap(), value);
            harness
                .outputs()
                .disable(BusSource::RegA, false)
                .await
                .unwrap();
        }
    }
}
