use std::borrow::Cow;
use std::collections::BTreeSet;
use std::marker::PhantomData;

use anstyle::Style;
use clap::{Command, CommandFactory};
use rustyline::{
    completion::Completer,
    highlight::Highlighter,
    hint::Hinter,
    validate::{ValidationContext, ValidationResult, Validator},
    Context,
};
use rustyline_derive::Helper;

const REGISTERS: [&str; 9] = [
    "%ac", "%mar", "%mdr", "%ir", "%rb", "%rl", "%rx", "%sp", "%pc",
];

/// Rustyline helper, that handles interactive completion, highlighting and hinting.
#[derive(Helper, Debug)]
pub(crate) struct RunHelper<T: CommandFactory> {
    app: PhantomData<T>,
}

impl<T: CommandFactory> RunHelper<T> {
    pub fn new() -> Self {
        RunHelper { app: PhantomData }
    }
}

/// Split the line up to the cursor, with an empty last word if the cursor is
/// after a blank
fn words_before(line: &str, pos: usize) -> Option<Vec<String>> {
    let line = line.get(..pos)?;
    let mut words = shell_words::split(line).ok()?;
    if line.ends_with([' ', '\t']) || words.is_empty() {
        words.push(String::new());
    }
    Some(words)
}

/// Files of the working directory, for the `load` command
fn program_files(prefix: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(".") else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(prefix))
        .collect()
}

/// Candidates for the last word of `input`, and the length of that word
fn suggest(command: &Command, input: &[String]) -> (usize, BTreeSet<String>) {
    match input {
        [] => (0, BTreeSet::new()),

        [last] => {
            let mut candidates: BTreeSet<String> = command
                .get_subcommands()
                .flat_map(|cmd| {
                    std::iter::once(cmd.get_name().to_owned())
                        .chain(cmd.get_visible_aliases().map(ToOwned::to_owned))
                })
                .collect();

            // If the app has subcommands, it has a `help` command
            if command.has_subcommands() {
                candidates.insert("help".to_owned());
            }

            candidates.retain(|candidate| candidate.starts_with(last.as_str()));
            (last.len(), candidates)
        }

        [head, tail @ ..] => {
            let Some(sub) = command.find_subcommand(head) else {
                return (0, BTreeSet::new());
            };

            if sub.has_subcommands() {
                return suggest(sub, tail);
            }

            // Positional argument under the cursor
            let last = tail.last().map_or("", String::as_str);
            let candidates = match sub
                .get_positionals()
                .nth(tail.len() - 1)
                .map(|arg| arg.get_id().as_str())
            {
                Some("register") => REGISTERS
                    .iter()
                    .filter(|reg| reg.starts_with(last))
                    .map(|&reg| reg.to_owned())
                    .collect(),
                Some("path") => program_files(last).into_iter().collect(),
                _ => BTreeSet::new(),
            };

            (last.len(), candidates)
        }
    }
}

impl<T: CommandFactory> Completer for RunHelper<T> {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        let Some(words) = words_before(line, pos) else {
            return Ok((0, Vec::new()));
        };

        let (offset, candidates) = suggest(&T::command(), &words);
        Ok((pos - offset, candidates.into_iter().collect()))
    }
}

impl<T: CommandFactory> Highlighter for RunHelper<T> {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        let style = Style::new().dimmed();
        Cow::Owned(format!("{}{hint}{}", style.render(), style.render_reset()))
    }

    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        _default: bool,
    ) -> Cow<'b, str> {
        let style = Style::new().bold();
        Cow::Owned(format!("{}{prompt}{}", style.render(), style.render_reset()))
    }
}

impl<T: CommandFactory> Hinter for RunHelper<T> {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        // Only hint at the end of the line
        if pos < line.len() {
            return None;
        }

        let words = words_before(line, pos)?;
        let (offset, candidates) = suggest(&T::command(), &words);

        // Hint only when there is a single candidate
        let mut candidates = candidates.into_iter();
        match (candidates.next(), candidates.next()) {
            (Some(candidate), None) => candidate.get(offset..).map(ToOwned::to_owned),
            _ => None,
        }
    }
}

impl<T: CommandFactory> Validator for RunHelper<T> {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        // Unbalanced quotes continue on the next line
        if shell_words::split(ctx.input()).is_err() {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}
