use log::info;

use crate::bus::BusState;
use crate::clock::Edge;
use crate::error::{HarnessError, Result};
use crate::simulator::Harness;

/// Brings a harness into the known idle configuration before any scenario
/// runs.
pub struct ResetSequencer<'a> {
    harness: &'a mut Harness,
}

impl<'a> ResetSequencer<'a> {
    pub fn new(harness: &'a mut Harness) -> Self {
        Self { harness }
    }

    /// Returns the idle bus state that was observed.
    pub async fn run(self) -> Result<BusState> {
        let harness = self.harness;

        info!("Reset signals on {}", harness.device_name());
        harness.idle_lines();

        info!("Initialize clock");
        harness.start_clock()?;

        info!("Wait for control signals to propagate (control signals and bus updates are falling edge)");
        harness.edges()?.edge_then_settle(Edge::Falling).await?;

        let state = harness.sample()?;
        if !state.is_idle() {
            return Err(HarnessError::ResetValidation {
                actual: state,
                time_ns: harness.now(),
            });
        }
        info!("Reset complete, bus is {state}");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Driver;
    use crate::config::HarnessConfig;
    use crate::control::{ControlLine, ControlLineSet};
    use crate::device::Device;

    #[tokio::test(start_paused = true)]
    async fn test_reset_leaves_bus_floating() {
        let mut harness = Harness::with_datapath(HarnessConfig::default());
        let state = harness.reset().await.unwrap();
        assert_eq!(state, BusState::HighZ);
        assert_eq!(harness.controls(), ControlLineSet::idle());
        // One falling edge plus ten cycles
        assert_eq!(harness.now(), 105);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_pending_lines() {
        let mut harness = Harness::with_datapath(HarnessConfig::default());
        harness.set_line(ControlLine::RegALoad, true).unwrap();
        harness.set_line(ControlLine::AluSubtract, true).unwrap();
        harness.reset().await.unwrap();
        assert!(!harness.controls().is_asserted(ControlLine::RegALoad));
        assert!(!harness.controls().is_asserted(ControlLine::AluSubtract));
    }

    struct AlwaysDriving;

    impl Device for AlwaysDriving {
        fn name(&self) -> &str {
            "always-driving"
        }

        fn on_falling_edge(&mut self, _controls: &ControlLineSet) -> Vec<(Driver, BusState)> {
            vec![(Driver::Alu, BusState::Driven(3))]
        }

        fn on_rising_edge(&mut self, _controls: &ControlLineSet, _bus: BusState) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_rejects_driven_bus() {
        let mut harness = Harness::new(HarnessConfig::default(), AlwaysDriving);
        let err = harness.reset().await.unwrap_err();
        assert_eq!(
            err,
            HarnessError::ResetValidation {
                actual: BusState::Driven(3),
                time_ns: 105,
            }
        );
    }
}
