use std::time::Duration;

use clap::Args;
use decima_emulator::{constants as C, runtime::Mode, MachineConfig};

mod completion;
mod menu;
mod run;

#[derive(clap::Subcommand)]
pub enum Subcommand {
    /// Load a program and run it to completion
    Run(self::run::RunOpt),

    /// Start the interactive console
    Menu(self::menu::MenuOpt),

    /// Generate shell completions
    Completion(self::completion::CompletionOpt),
}

impl Subcommand {
    /// Run a subcommand
    pub fn exec(self) -> anyhow::Result<()> {
        match self {
            Self::Run(opt) => opt.exec(),
            Self::Menu(opt) => opt.exec(),
            Self::Completion(opt) => opt.exec(),
        }
    }
}

/// Timings of the simulated hardware
#[derive(Args, Clone, Debug)]
pub struct TimingOpt {
    /// Milliseconds per timer period unit
    #[arg(long, default_value_t = 1)]
    tick_ms: u64,

    /// Milliseconds between two checks of a disarmed timer
    #[arg(long, default_value_t = 10)]
    timer_idle_ms: u64,

    /// Simulated latency of a DMA transfer, in milliseconds
    #[arg(long, default_value_t = 20)]
    dma_latency_ms: u64,

    /// Pause between two CPU cycles, in microseconds
    #[arg(long, default_value_t = 0)]
    cycle_delay_us: u64,

    /// Stop the program after this many cycles
    #[arg(long)]
    max_cycles: Option<usize>,
}

impl TimingOpt {
    pub fn config(&self) -> MachineConfig {
        MachineConfig {
            tick_unit: Duration::from_millis(self.tick_ms),
            timer_idle: Duration::from_millis(self.timer_idle_ms),
            dma_latency: Duration::from_millis(self.dma_latency_ms),
            cycle_delay: Duration::from_micros(self.cycle_delay_us),
            cycle_limit: self.max_cycles,
        }
    }
}

/// How programs are placed and dispatched
#[derive(Args, Clone, Debug)]
pub struct ProcessOpt {
    /// Words reserved for the stack of each program
    #[arg(
        long,
        default_value_t = C::DEFAULT_STACK_WORDS,
        value_parser = clap::value_parser!(i64).range(0..=C::MEMORY_SIZE),
    )]
    stack: C::Address,

    /// Run programs in kernel mode
    #[arg(long)]
    kernel: bool,
}

impl ProcessOpt {
    pub const fn mode(&self) -> Mode {
        if self.kernel {
            Mode::Kernel
        } else {
            Mode::User
        }
    }
}
