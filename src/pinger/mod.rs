//! The driver loop: one probe per interval, a line per result and a summary at the end.

pub mod aggregate;
pub mod report;

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub use aggregate::Aggregate;

use crate::config::model::DEFAULT_INTERVAL;
use crate::probe::{Probe, ProbeContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingerState {
    Idle,
    Running,
    Stopped,
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

#[derive(Debug, Default)]
struct Shared {
    stop: CancellationToken,
    finished: CancellationToken,
    state: AtomicU8,
}

impl Shared {
    fn state(&self) -> PingerState {
        match self.state.load(Ordering::Acquire) {
            IDLE => PingerState::Idle,
            RUNNING => PingerState::Running,
            _ => PingerState::Stopped,
        }
    }

    fn finish(&self) {
        self.state.store(STOPPED, Ordering::Release);
        self.stop.cancel();
        self.finished.cancel();
    }
}

/// Lets another task stop a running [`Pinger`] or wait for it.
#[derive(Debug, Clone)]
pub struct PingerHandle {
    shared: Arc<Shared>,
}

impl PingerHandle {
    /// Ask the run loop to stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.shared.stop.cancel();
    }

    /// Resolves once the run loop has exited.
    pub async fn done(&self) {
        self.shared.finished.cancelled().await
    }

    pub fn state(&self) -> PingerState {
        self.shared.state()
    }
}

pub struct Pinger<W> {
    out: W,
    target: String,
    probe: Arc<dyn Probe>,
    interval: Duration,
    counter: u64,
    colored: bool,
    aggregate: Aggregate,
    shared: Arc<Shared>,
}

impl<W: Write + Send> Pinger<W> {
    /// `counter` of 0 probes until stopped. A zero `interval` falls back to the default.
    pub fn new(
        out: W,
        target: impl Into<String>,
        probe: Arc<dyn Probe>,
        interval: Duration,
        counter: u64,
    ) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            interval
        };
        Self {
            out,
            target: target.into(),
            probe,
            interval,
            counter,
            colored: false,
            aggregate: Aggregate::default(),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Render failed attempts in red.
    pub fn colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    pub fn handle(&self) -> PingerHandle {
        PingerHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn stop(&self) {
        self.shared.stop.cancel();
    }

    pub async fn done(&self) {
        self.shared.finished.cancelled().await
    }

    pub fn state(&self) -> PingerState {
        self.shared.state()
    }

    pub fn aggregate(&self) -> &Aggregate {
        &self.aggregate
    }

    pub fn sink(&self) -> &W {
        &self.out
    }

    pub fn into_sink(self) -> W {
        self.out
    }

    /// Probe until the counter is reached or [`Pinger::stop`] is called.
    ///
    /// The first probe fires immediately. Only I/O errors on the sink end the run early.
    pub async fn run(&mut self) -> io::Result<()> {
        if self
            .shared
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("pinger for {} already started", self.target);
            return Ok(());
        }
        log::debug!(
            "pinging {} every {:?}, counter {}",
            self.target,
            self.interval,
            self.counter
        );

        let result = self.drive().await;
        self.shared.finish();
        result
    }

    async fn drive(&mut self) -> io::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shared.stop.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.limit_reached() {
                break;
            }

            let ctx = ProbeContext::new(self.shared.stop.child_token());
            let stats = self.probe.probe(&ctx).await;
            self.aggregate.record(&stats);

            if stats.is_cancelled() {
                log::debug!("probe of {} cancelled", self.target);
            } else {
                writeln!(
                    self.out,
                    "{}",
                    report::format_line(&self.target, &stats, self.colored)
                )?;
                self.out.flush()?;
            }

            if self.limit_reached() {
                break;
            }
        }
        Ok(())
    }

    fn limit_reached(&self) -> bool {
        self.counter > 0 && self.aggregate.total() >= self.counter
    }

    /// Write the statistics block for everything probed so far.
    pub fn summarize(&mut self) -> io::Result<()> {
        writeln!(
            self.out,
            "{}",
            report::format_summary(&self.target, &self.aggregate)
        )?;
        self.out.flush()
    }
}
