use std::process::exit;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use decima_emulator::{
    constants as C, inspect,
    loader::{LoadError, NativeFilesystem},
    load,
    process::ProcessTable,
    Machine,
};
use tracing::{debug, info, warn};

use super::{ProcessOpt, TimingOpt};

#[derive(Parser, Debug)]
pub struct RunOpt {
    /// Path to the program file
    program: Utf8PathBuf,

    /// Physical address where the program is loaded. Defaults to the start of
    /// the user region.
    #[arg(
        long,
        value_parser = clap::value_parser!(i64).range(C::USER_START..C::MEMORY_SIZE),
    )]
    address: Option<C::Address>,

    #[command(flatten)]
    process: ProcessOpt,

    #[command(flatten)]
    timing: TimingOpt,
}

/// Print a loader diagnostic and exit
fn or_exit<T>(result: Result<T, LoadError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            let report = miette::Report::new(e);
            eprintln!("{report:?}");
            exit(1);
        }
    }
}

impl RunOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        let fs = NativeFilesystem::from_env()?;
        info!(path = %self.program, "Reading program");
        let header = or_exit(inspect(&fs, &self.program));

        let mut table = ProcessTable::new();
        let base = match self.address {
            Some(address) => address,
            None => table
                .next_free(header.size() + self.process.stack)
                .context("the program does not fit in the user region")?,
        };
        let pcb = table.admit(&header, base, self.process.stack)?.clone();

        debug!(config = ?self.timing.config(), "Building machine");
        let machine = Machine::new(self.timing.config());
        machine.with_computer(|computer| {
            or_exit(load(&fs, &self.program, &mut computer.memory, pcb.base));
            computer.dispatch(&pcb, self.process.mode());
        });

        let report = machine.run()?;
        info!(cycles = report.cycles, "Program finished");
        machine.with_computer(|computer| {
            info!("Registers: {}", computer.registers);
            info!("PSW: {}", computer.psw);
        });

        if report.limit_reached {
            warn!("The program was stopped by the cycle limit");
        }

        if let Some(fault) = report.fault() {
            anyhow::bail!("the program stopped on interrupt {}: {}", fault.code(), fault);
        }

        Ok(())
    }
}
