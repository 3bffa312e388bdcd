use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use eyre::Result as EyreResult;
use log::{debug, error};
use tokio::runtime::{Builder, Runtime};

use crate::alu::AluVerifier;
use crate::bus::{BusState, Conflict, Driver, SignalBus};
use crate::clock::{ClockGenerator, Edge, EdgeSynchronizer, SimTime};
use crate::config::HarnessConfig;
use crate::control::{ControlLine, ControlLineSet};
use crate::device::{Datapath, Device};
use crate::error::{HarnessError, Result};
use crate::load::{LoadSequencer, RegisterId};
use crate::output_enable::OutputEnableController;
use crate::reset::ResetSequencer;

/// Single-threaded runtime on a paused clock: simulated time advances as
/// soon as every task is waiting, so runs are deterministic and instant.
pub fn create_harness_runtime() -> EyreResult<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .map_err(|e| eyre::eyre!("Failed to create runtime: {}", e))
}

/// Oracle copy of what the harness believes the registers hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterShadow {
    a: Option<u8>,
    b: Option<u8>,
}

impl RegisterShadow {
    pub fn get(&self, register: RegisterId) -> Option<u8> {
        match register {
            RegisterId::A => self.a,
            RegisterId::B => self.b,
        }
    }

    pub fn set(&mut self, register: RegisterId, value: u8) {
        match register {
            RegisterId::A => self.a = Some(value),
            RegisterId::B => self.b = Some(value),
        }
    }
}

/// Everything on the device side of the clock: what the harness has asked
/// for, what the device latched, and the resolved bus.
struct Board {
    pending: ControlLineSet,
    pending_drive: Option<u8>,
    latched: ControlLineSet,
    bus: SignalBus,
    device: Box<dyn Device>,
    fault: Option<HarnessError>,
}

impl Board {
    fn on_edge(&mut self, edge: Edge, time: SimTime) {
        match edge {
            Edge::Falling => self.falling_edge(time),
            Edge::Rising => self.device.on_rising_edge(&self.latched, self.bus.sample()),
        }
    }

    fn falling_edge(&mut self, time: SimTime) {
        self.latched = self.pending;
        self.bus.release();

        if self.latched.is_asserted(ControlLine::BusOutputEnable) {
            let driven = match self.pending_drive {
                Some(value) => self.bus.drive(Driver::External, value),
                None => self.bus.drive_undefined(Driver::External),
            };
            self.record(driven, time);
        }

        for (driver, state) in self.device.on_falling_edge(&self.latched) {
            let driven = match state {
                BusState::Driven(value) => self.bus.drive(driver, value),
                BusState::Unknown => self.bus.drive_undefined(driver),
                BusState::HighZ => continue,
            };
            self.record(driven, time);
        }

        let observed = self.device.observe_bus(self.bus.sample());
        self.bus.override_state(observed);
    }

    fn record(&mut self, driven: std::result::Result<(), Conflict>, time: SimTime) {
        if let Err(Conflict { held, requested }) = driven {
            if self.fault.is_none() {
                error!("bus contention at {time} ns: {held} and {requested}");
                self.fault = Some(HarnessError::Contention {
                    held,
                    requested,
                    time_ns: time,
                });
            }
        }
    }
}

/// One device under test wired to the harness. Build a fresh one per
/// scenario.
pub struct Harness {
    config: HarnessConfig,
    board: Arc<Mutex<Board>>,
    device_name: String,
    clock: Option<ClockGenerator>,
    edges: Option<EdgeSynchronizer>,
    shadow: RegisterShadow,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("device", &self.device_name)
            .field("now", &self.now())
            .field("shadow", &self.shadow)
            .finish()
    }
}

impl Harness {
    pub fn new<D>(config: HarnessConfig, device: D) -> Self
    where
        D: Device + 'static,
    {
        let device_name = device.name().to_string();
        let board = Board {
            pending: ControlLineSet::idle(),
            pending_drive: None,
            latched: ControlLineSet::idle(),
            bus: SignalBus::new(),
            device: Box::new(device),
            fault: None,
        };
        Self {
            config,
            board: Arc::new(Mutex::new(board)),
            device_name,
            clock: None,
            edges: None,
            shadow: RegisterShadow::default(),
        }
    }

    /// Harness around the reference datapath.
    pub fn with_datapath(config: HarnessConfig) -> Self {
        let device = Datapath::new(&config.device);
        Self::new(config, device)
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Idempotent; the clock keeps running until the harness is dropped.
    /// Fails on a config whose clock could not advance simulated time.
    pub(crate) fn start_clock(&mut self) -> Result<()> {
        if self.clock.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        let board = Arc::clone(&self.board);
        let clock = ClockGenerator::start(self.config.clock_period_ns, move |edge, time| {
            board
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_edge(edge, time);
        })?;
        self.edges = Some(clock.synchronizer(self.config.settle_cycles));
        self.clock = Some(clock);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_some()
    }

    pub fn now(&self) -> SimTime {
        self.edges.as_ref().map_or(0, EdgeSynchronizer::now)
    }

    pub fn edges(&mut self) -> Result<&mut EdgeSynchronizer> {
        self.edges.as_mut().ok_or(HarnessError::ClockStopped)
    }

    fn check_fault(&self) -> Result<()> {
        match &self.board().fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    fn contention(&self, conflict: Conflict) -> HarnessError {
        HarnessError::Contention {
            held: conflict.held,
            requested: conflict.requested,
            time_ns: self.now(),
        }
    }

    /// Harness-side view of the control lines, before the device latches them.
    pub fn controls(&self) -> ControlLineSet {
        self.board().pending
    }

    /// Control lines as the device saw them at the last falling edge.
    pub fn latched_controls(&self) -> ControlLineSet {
        self.board().latched
    }

    pub fn set_line(&mut self, line: ControlLine, asserted: bool) -> Result<()> {
        self.check_fault()?;
        let result = {
            let mut board = self.board();
            if asserted {
                board.pending.assert(line)
            } else {
                board.pending.deassert(line);
                Ok(())
            }
        };
        debug!("{line} {} at {} ns", if asserted { "asserted" } else { "deasserted" }, self.now());
        result.map_err(|conflict| self.contention(conflict))
    }

    /// Every line deasserted, add selected, bus released.
    pub(crate) fn idle_lines(&mut self) {
        let mut board = self.board();
        for line in ControlLine::ALL {
            board.pending.deassert(line);
        }
        board.pending_drive = None;
    }

    /// Drive `value` through the external buffer. Takes effect on the next
    /// falling edge.
    pub fn drive_bus(&mut self, value: u8) -> Result<()> {
        self.check_fault()?;
        let result = {
            let mut board = self.board();
            let asserted = board.pending.assert(ControlLine::BusOutputEnable);
            if asserted.is_ok() {
                board.pending_drive = Some(value);
            }
            asserted
        };
        debug!("drive bus {value} at {} ns", self.now());
        result.map_err(|conflict| self.contention(conflict))
    }

    pub fn release_bus(&mut self) {
        let mut board = self.board();
        board.pending.deassert(ControlLine::BusOutputEnable);
        board.pending_drive = None;
    }

    /// Current bus state; a contention fault recorded by the board is
    /// reported here.
    pub fn sample(&self) -> Result<BusState> {
        self.check_fault()?;
        let state = self.board().bus.sample();
        debug!("bus {state} at {} ns", self.now());
        Ok(state)
    }

    pub fn sample_value(&self) -> Result<u8> {
        match self.sample()? {
            BusState::Driven(value) => Ok(value),
            state => Err(HarnessError::Sample {
                state,
                time_ns: self.now(),
            }),
        }
    }

    pub fn bus_owner(&self) -> Option<Driver> {
        self.board().bus.owner()
    }

    pub fn shadow(&self) -> &RegisterShadow {
        &self.shadow
    }

    pub(crate) fn shadow_mut(&mut self) -> &mut RegisterShadow {
        &mut self.shadow
    }

    pub async fn reset(&mut self) -> Result<BusState> {
        ResetSequencer::new(self).run().await
    }

    pub fn loader(&mut self) -> LoadSequencer<'_> {
        LoadSequencer::new(self)
    }

    pub fn outputs(&mut self) -> OutputEnableController<'_> {
        OutputEnableController::new(self)
    }

    pub fn alu(&mut self) -> AluVerifier<'_> {
        AluVerifier::new(self)
    }
}
