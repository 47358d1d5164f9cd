//! The threaded machine: the CPU loop, the timer unit and the DMA unit
//! sharing one locked [`Computer`].

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{dma, interrupt::Interrupt, timer, Computer};
use crate::constants as C;

/// Timings of the simulated hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Real time represented by one unit of the timer period
    pub tick_unit: Duration,

    /// Polling interval of a disarmed timer
    pub timer_idle: Duration,

    /// Simulated mechanical latency of a DMA transfer
    pub dma_latency: Duration,

    /// Pause between two CPU cycles
    pub cycle_delay: Duration,

    /// Stop the CPU after this many cycles
    pub cycle_limit: Option<usize>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            tick_unit: C::DEFAULT_TICK_UNIT,
            timer_idle: C::DEFAULT_TIMER_IDLE,
            dma_latency: C::DEFAULT_DMA_LATENCY,
            cycle_delay: Duration::ZERO,
            cycle_limit: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum MachineError {
    #[error("no program was dispatched")]
    NotDispatched,

    #[error("could not start the {unit} unit")]
    Spawn {
        unit: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("the {0} unit panicked")]
    UnitPanicked(&'static str),
}

/// Summary of a dispatch, once the machine stopped
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Number of CPU cycles executed
    pub cycles: usize,

    /// Interrupts delivered to the CPU, in order
    pub interrupts: Vec<Interrupt>,

    /// Whether the cycle limit stopped the program
    pub limit_reached: bool,
}

impl RunReport {
    /// The fatal interrupt that ended the dispatch, if any
    #[must_use]
    pub fn fault(&self) -> Option<Interrupt> {
        self.interrupts.iter().copied().find(|i| i.is_fatal())
    }
}

/// State shared by the three units
pub(crate) struct Shared {
    computer: Mutex<Computer>,

    /// Wakes the DMA unit when armed, and every unit on shutdown
    wakeup: Condvar,

    pub(crate) config: MachineConfig,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Computer> {
        self.computer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the machine for `duration`, or until it stops running
    pub(crate) fn pause<'a>(
        &self,
        guard: MutexGuard<'a, Computer>,
        duration: Duration,
    ) -> MutexGuard<'a, Computer> {
        let (guard, _timeout) = self
            .wakeup
            .wait_timeout_while(guard, duration, |computer| computer.running)
            .unwrap_or_else(PoisonError::into_inner);
        guard
    }

    /// Release the machine until the DMA is armed, or the machine stops running
    pub(crate) fn wait_for_dma<'a>(
        &self,
        guard: MutexGuard<'a, Computer>,
    ) -> MutexGuard<'a, Computer> {
        self.wakeup
            .wait_while(guard, |computer| {
                computer.running && !computer.dma.is_active()
            })
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self) {
        self.wakeup.notify_all();
    }
}

/// The machine, with its hardware units
#[derive(Clone)]
pub struct Machine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl Machine {
    #[must_use]
    pub fn new(config: MachineConfig) -> Self {
        Self::with_state(Computer::default(), config)
    }

    /// Build a machine around an existing state
    #[must_use]
    pub fn with_state(computer: Computer, config: MachineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                computer: Mutex::new(computer),
                wakeup: Condvar::new(),
                config,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &MachineConfig {
        &self.shared.config
    }

    /// Get exclusive access to the machine state
    pub fn with_computer<T>(&self, f: impl FnOnce(&mut Computer) -> T) -> T {
        let mut computer = self.shared.lock();
        f(&mut computer)
    }

    fn spawn(
        &self,
        unit: &'static str,
        body: fn(&Shared),
    ) -> Result<JoinHandle<()>, MachineError> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(unit.to_owned())
            .spawn(move || body(&shared))
            .map_err(|source| MachineError::Spawn { unit, source })
    }

    /// Run the dispatched program until it terminates
    ///
    /// The timer and DMA units are started for the duration of the run, and
    /// joined before returning.
    ///
    /// # Errors
    ///
    /// Fails if no program is running, if a unit could not be started or if
    /// it panicked.
    pub fn run(&self) -> Result<RunReport, MachineError> {
        if !self.shared.lock().running {
            return Err(MachineError::NotDispatched);
        }

        let timer = self.spawn("timer", timer::run)?;
        let dma = match self.spawn("dma", dma::run) {
            Ok(handle) => handle,
            Err(e) => {
                self.shutdown();
                let _ = timer.join();
                return Err(e);
            }
        };

        let report = self.cpu_loop();
        self.shutdown();

        timer.join().map_err(|_| MachineError::UnitPanicked("timer"))?;
        dma.join().map_err(|_| MachineError::UnitPanicked("dma"))?;

        info!(
            cycles = report.cycles,
            interrupts = report.interrupts.len(),
            "Machine stopped"
        );
        Ok(report)
    }

    fn cpu_loop(&self) -> RunReport {
        let config = &self.shared.config;
        let mut report = RunReport::default();

        loop {
            let mut computer = self.shared.lock();

            if config.cycle_limit.is_some_and(|limit| report.cycles >= limit) {
                warn!(cycles = report.cycles, "Cycle limit reached, stopping");
                computer.running = false;
                report.limit_reached = true;
                break;
            }

            computer.step();
            report.cycles += 1;
            if let Some(interrupt) = computer.check_interrupts() {
                report.interrupts.push(interrupt);
            }

            let ring = computer.dma.take_doorbell();
            let running = computer.running;
            drop(computer);

            if ring {
                debug!("Waking the DMA unit");
                self.shared.wake();
            }

            if !running {
                break;
            }

            if config.cycle_delay.is_zero() {
                // Let the other units get the lock
                thread::yield_now();
            } else {
                thread::sleep(config.cycle_delay);
            }
        }

        report
    }

    /// Clear the running flag and wake every unit so they can exit
    fn shutdown(&self) {
        self.shared.lock().running = false;
        self.shared.wake();
    }
}
