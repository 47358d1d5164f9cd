use camino::Utf8PathBuf;
use clap::Parser;
use decima_emulator::{loader::NativeFilesystem, Machine};
use tracing::debug;

use super::{ProcessOpt, TimingOpt};
use crate::interactive::{run_interactive, Session};

#[derive(Parser, Debug)]
pub struct MenuOpt {
    /// Programs to load before starting the console
    programs: Vec<Utf8PathBuf>,

    #[command(flatten)]
    process: ProcessOpt,

    #[command(flatten)]
    timing: TimingOpt,
}

impl MenuOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        let fs = NativeFilesystem::from_env()?;
        debug!(config = ?self.timing.config(), "Building machine");
        let machine = Machine::new(self.timing.config());
        let mut session = Session::new(fs, machine, self.process.stack, self.process.mode());

        for path in &self.programs {
            session.load_and_report(path, None);
        }

        run_interactive(&mut session)
    }
}
