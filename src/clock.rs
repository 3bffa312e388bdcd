//! Free-running two-phase clock and the edge waits built on it.

use std::time::Duration;

use log::{debug, trace};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{HarnessError, Result};

/// Simulated time in nanoseconds.
pub type SimTime = u64;

/// One simulated nanosecond lasts one millisecond on the runtime's paused
/// clock, the timer wheel's resolution. Nothing waits on wall time because
/// the harness runtime auto-advances.
pub fn sim_duration(ns: SimTime) -> Duration {
    Duration::from_millis(ns)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Edge {
    Rising,
    Falling,
}

/// Published after every edge, once the board has evaluated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSignal {
    pub period: SimTime,
    /// Current phase: `true` while the clock is high.
    pub high: bool,
    /// The edge that produced this phase; `None` before the first one.
    pub edge: Option<Edge>,
    /// Number of edges since start.
    pub sequence: u64,
    pub time: SimTime,
}

impl ClockSignal {
    fn start(period: SimTime) -> Self {
        Self {
            period,
            high: false,
            edge: None,
            sequence: 0,
            time: 0,
        }
    }

    fn advance(&mut self) -> Edge {
        self.high = !self.high;
        self.sequence += 1;
        self.time += self.period / 2;
        let edge = if self.high { Edge::Rising } else { Edge::Falling };
        self.edge = Some(edge);
        edge
    }
}

/// Background task toggling the clock every half period.
///
/// A half-cycle in progress is never interrupted; the task only goes away
/// when the generator is dropped.
#[derive(Debug)]
pub struct ClockGenerator {
    signal: watch::Receiver<ClockSignal>,
    task: JoinHandle<()>,
}

impl ClockGenerator {
    /// `on_edge` runs inside the clock task before the edge is published.
    ///
    /// The period must split into two equal non-zero halves, otherwise
    /// simulated time could never advance.
    pub fn start<F>(period: SimTime, mut on_edge: F) -> Result<Self>
    where
        F: FnMut(Edge, SimTime) + Send + 'static,
    {
        if period == 0 || period % 2 != 0 {
            return Err(HarnessError::InvalidConfig {
                reason: format!("clock period must be a non-zero even number of ns, got {period}"),
            });
        }
        let mut signal = ClockSignal::start(period);
        let (tx, rx) = watch::channel(signal);
        let half = sim_duration(period / 2);

        debug!("clock started, period {period} ns");
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(half).await;
                let edge = signal.advance();
                trace!("{edge:?} edge #{} at {} ns", signal.sequence, signal.time);
                on_edge(edge, signal.time);
                if tx.send(signal).is_err() {
                    break;
                }
            }
        });

        Ok(Self { signal: rx, task })
    }

    pub fn synchronizer(&self, settle_cycles: u32) -> EdgeSynchronizer {
        EdgeSynchronizer {
            signal: self.signal.clone(),
            settle_cycles,
        }
    }
}

impl Drop for ClockGenerator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Suspends the calling flow until clock edges happen.
#[derive(Debug, Clone)]
pub struct EdgeSynchronizer {
    signal: watch::Receiver<ClockSignal>,
    settle_cycles: u32,
}

impl EdgeSynchronizer {
    pub fn now(&self) -> SimTime {
        self.signal.borrow().time
    }

    pub fn current(&self) -> ClockSignal {
        *self.signal.borrow()
    }

    /// Waits for the next occurrence of `edge`, never the current one.
    pub async fn wait_for_edge(&mut self, edge: Edge) -> Result<ClockSignal> {
        let after = self.signal.borrow_and_update().sequence;
        let signal = *self
            .signal
            .wait_for(|s| s.sequence > after && s.edge == Some(edge))
            .await
            .map_err(|_| HarnessError::ClockStopped)?;
        Ok(signal)
    }

    /// Waits `n` rising edges.
    pub async fn cycles(&mut self, n: u32) -> Result<ClockSignal> {
        let mut signal = self.current();
        for _ in 0..n {
            signal = self.wait_for_edge(Edge::Rising).await?;
        }
        Ok(signal)
    }

    pub async fn settle(&mut self) -> Result<ClockSignal> {
        self.cycles(self.settle_cycles).await
    }

    /// Next `edge`, then the settle margin.
    pub async fn edge_then_settle(&mut self, edge: Edge) -> Result<ClockSignal> {
        self.wait_for_edge(edge).await?;
        self.settle().await
    }
}
