//! This module implements the interactive console.
//!
//! It is mainly based on two crates:
//!   - rustyline, to handle the line-editting logic
//!   - clap, to handle the parsing of those interactive commands
//!
//! Using Parser to do this is a bit of a hack, and requires some weird options
//! to have it working but works nonetheless.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use decima_emulator::{
    constants::{Address, Word},
    inspect,
    loader::{Filesystem, LoadError},
    load,
    process::{Pcb, ProcessError, ProcessTable},
    runtime::{GeometryError, MachineError, Mode, Reg, RunReport},
    Machine,
};
use rustyline::{
    history::DefaultHistory, Behavior, CompletionType, Config, EditMode, Editor,
};
use thiserror::Error;
use tracing::{debug, info, warn};

mod helper;
use self::helper::RunHelper;

static HELP: &str = r#"
Run "help [command]" for command-specific help.
An empty line re-runs the last valid command."#;

#[derive(Parser, Clone, Debug)]
#[command(
    help_template = "{about}\n\nCOMMANDS:\n{subcommands}\n{after-help}",
    after_help = HELP,
    disable_version_flag = true,
    infer_subcommands = true,
    no_binary_name = true,
    allow_negative_numbers = true,
)]
/// Console commands
enum Command {
    /// Load a program, at the first free address by default
    #[command(alias = "l")]
    Load {
        /// Path to the program file
        path: Utf8PathBuf,

        /// Physical address where the program is loaded
        address: Option<Address>,
    },

    /// List the loaded processes
    Ps,

    /// Dispatch a process and run it until it terminates
    #[command(alias = "r")]
    Run {
        /// Process id, as shown by "ps"
        id: usize,
    },

    /// Remove a process and free its memory region
    Unload {
        /// Process id, as shown by "ps"
        id: usize,
    },

    /// Show the state of registers
    Registers { register: Option<Reg> },

    /// Show the content of a block in memory
    Memory {
        /// The physical address to show
        address: Address,

        /// Number of words to show
        #[arg(default_value = "1")]
        number: usize,
    },

    /// Show the content of a disk sector
    Sector {
        track: Word,
        cylinder: Word,
        sector: Word,
    },

    /// Exit the console
    Exit,
}

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Holds the state of a console session
pub(crate) struct Session<F> {
    fs: F,
    machine: Machine,
    table: ProcessTable,

    /// Words reserved for the stack of each program
    stack: Address,

    /// Mode programs are dispatched in
    mode: Mode,
}

impl<F: Filesystem> Session<F> {
    pub fn new(fs: F, machine: Machine, stack: Address, mode: Mode) -> Self {
        Self {
            fs,
            machine,
            table: ProcessTable::new(),
            stack,
            mode,
        }
    }

    /// Place a program in the user region and register it
    fn load(&mut self, path: &Utf8Path, address: Option<Address>) -> Result<Pcb, SessionError> {
        let header = inspect(&self.fs, path)?;
        let size = header.size() + self.stack;
        let base = match address {
            Some(address) => address,
            None => self
                .table
                .next_free(size)
                .ok_or(ProcessError::NoSpace { size })?,
        };

        let pcb = self.table.admit(&header, base, self.stack)?.clone();
        let loaded = self
            .machine
            .with_computer(|computer| load(&self.fs, path, &mut computer.memory, pcb.base));

        if let Err(e) = loaded {
            self.table.remove(pcb.id)?;
            return Err(e.into());
        }

        Ok(pcb)
    }

    /// Load a program, logging the outcome
    pub fn load_and_report(&mut self, path: &Utf8Path, address: Option<Address>) {
        match self.load(path, address) {
            Ok(pcb) => info!("Loaded process {}", pcb),
            Err(SessionError::Load(e)) => {
                let report = miette::Report::new(e);
                eprintln!("{report:?}");
            }
            Err(e) => warn!(error = %e, "Could not load {}", path),
        }
    }

    fn run(&mut self, id: usize) -> Result<RunReport, SessionError> {
        let pcb = self
            .table
            .get(id)
            .ok_or(ProcessError::NotFound(id))?
            .clone();

        let mode = self.mode;
        self.machine
            .with_computer(|computer| computer.dispatch(&pcb, mode));
        Ok(self.machine.run()?)
    }

    fn processes(&self) -> Vec<String> {
        self.table.iter().map(ToString::to_string).collect()
    }

    fn registers(&self, register: Option<Reg>) -> String {
        self.machine.with_computer(|computer| match register {
            Some(reg) => format!("Register {} = {}", reg, computer.register(reg)),
            None => format!("{}\n{}", computer.registers, computer.psw),
        })
    }

    fn memory(&self, address: Address, number: usize) -> Vec<String> {
        self.machine.with_computer(|computer| {
            computer
                .memory
                .iter_range(address, number)
                .map(|(address, word)| format!("{address:>5}  {word:>9}"))
                .collect()
        })
    }

    fn sector(&self, track: Word, cylinder: Word, sector: Word) -> Result<String, SessionError> {
        self.machine.with_computer(|computer| {
            let content = computer.disk.sector(track, cylinder, sector)?;
            Ok(format!(
                "disk[{track}][{cylinder}][{sector}] = {:?} ({})",
                content.text(),
                content.load()
            ))
        })
    }
}

pub(crate) fn run_interactive<F: Filesystem>(session: &mut Session<F>) -> anyhow::Result<()> {
    info!("Running the console. Type \"help\" to list available commands.");
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .behavior(Behavior::PreferTerm)
        .auto_add_history(true)
        .build();

    let h: RunHelper<Command> = RunHelper::new();
    let mut rl: Editor<RunHelper<Command>, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(h));

    let mut last_command: Option<Command> = None;

    'read: loop {
        // A macro to unwrap an error, log it and continue the loop
        macro_rules! warn_and_continue {
            ($e:expr) => {
                match $e {
                    Ok(o) => o,
                    Err(e) => {
                        tracing::warn!(error = %e);
                        continue 'read;
                    }
                }
            };
        }

        let Ok(readline) = rl.readline(">> ") else {
            info!("EOF, exitting");
            return Ok(());
        };

        let command = if readline.is_empty() {
            if let Some(command) = &last_command {
                command.clone()
            } else {
                info!("Type \"help\" to get the list of available commands");
                continue 'read;
            }
        } else {
            let Ok(words) = shell_words::split(readline.as_str()) else {
                warn!("Invalid input");
                continue 'read;
            };

            let command = warn_and_continue!(Command::try_parse_from(words));
            last_command = Some(command.clone());
            command
        };

        debug!("Executing command: {:?}", command);

        match command {
            Command::Exit => break,

            Command::Load { path, address } => session.load_and_report(&path, address),

            Command::Ps => {
                let processes = session.processes();
                if processes.is_empty() {
                    info!("No processes");
                }
                for line in processes {
                    info!("{}", line);
                }
            }

            Command::Run { id } => {
                let report = warn_and_continue!(session.run(id));
                info!(
                    cycles = report.cycles,
                    interrupts = report.interrupts.len(),
                    "Process {} finished",
                    id
                );
                if let Some(fault) = report.fault() {
                    warn!(code = fault.code(), "Process {} stopped: {}", id, fault);
                }
            }

            Command::Unload { id } => {
                let pcb = warn_and_continue!(session.table.remove(id));
                info!("Unloaded process {}", pcb);
            }

            Command::Registers { register } => {
                info!("{}", session.registers(register));
            }

            Command::Memory { address, number } => {
                for line in session.memory(address, number) {
                    info!("{}", line);
                }
            }

            Command::Sector {
                track,
                cylinder,
                sector,
            } => {
                info!("{}", warn_and_continue!(session.sector(track, cylinder, sector)));
            }
        }
    }

    Ok(())
}
