//! Program loader.
//!
//! A program is a text file with one signed decimal word per line:
//!
//! ```text
//! # Add two numbers
//! .name  sum
//! _start 0
//! .words 3
//! 04100005   # load #5
//! 00100003   # add #3
//! 13100000   # svc #0
//! ```
//!
//! Lines starting with `#` or `;` are comments. `_start` sets the entry point
//! relative to the load address, `.words` declares the word count and `.name`
//! names the program.

use std::io::Read;

use camino::Utf8Path;
use miette::{Diagnostic, NamedSource, SourceSpan};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{digit1, one_of, space0, space1},
    combinator::{all_consuming, map, map_res, opt, recognize, rest, value},
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::constants::{Address, Word, MEMORY_SIZE, USER_START, WORD_MAX, WORD_MIN};
use crate::runtime::Memory;

mod fs;

pub use self::fs::{Filesystem, InMemoryFilesystem, NativeFilesystem};

#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("could not read {path}")]
    #[diagnostic(code(decima::loader::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid syntax on line {line}")]
    #[diagnostic(
        code(decima::loader::syntax),
        help("expected a signed decimal word, a comment, `_start`, `.words` or `.name`")
    )]
    Syntax {
        line: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("value {value} on line {line} does not fit in a word")]
    #[diagnostic(code(decima::loader::range))]
    WordOutOfRange {
        line: usize,
        value: i64,
        #[source_code]
        src: NamedSource<String>,
        #[label("out of range")]
        span: SourceSpan,
    },

    #[error("program {name} has no words")]
    #[diagnostic(code(decima::loader::empty))]
    Empty { name: String },

    #[error("start offset {start} is outside of the program ({word_count} words)")]
    #[diagnostic(code(decima::loader::start))]
    StartOutOfRange { start: i64, word_count: usize },

    #[error("program declares {declared} words but has {actual}")]
    #[diagnostic(code(decima::loader::count))]
    CountMismatch { declared: i64, actual: usize },

    #[error("program of {word_count} words does not fit in the user region at address {address}")]
    #[diagnostic(code(decima::loader::placement))]
    DoesNotFit { address: Address, word_count: usize },
}

/// Metadata of a program, known before it is placed in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramHeader {
    pub name: String,

    /// Entry point, relative to the load address
    pub start_offset: Address,

    pub word_count: usize,
}

impl ProgramHeader {
    /// Number of words the program occupies
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn size(&self) -> Address {
        self.word_count as Address
    }
}

/// Result of a successful load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadInfo {
    pub address: Address,
    pub start_offset: Address,
    pub name: String,
    pub word_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item<'a> {
    Start(i64),
    Words(i64),
    Name(&'a str),
    Word(i64),
}

fn number(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), str::parse::<i64>)(input)
}

fn directive(input: &str) -> IResult<&str, Item<'_>> {
    alt((
        map(preceded(pair(tag("_start"), space1), number), Item::Start),
        map(preceded(pair(tag(".words"), space1), number), Item::Words),
        map(
            preceded(pair(tag(".name"), space1), take_till1(char::is_whitespace)),
            Item::Name,
        ),
    ))(input)
}

fn comment(input: &str) -> IResult<&str, ()> {
    value((), pair(one_of("#;"), rest))(input)
}

/// Parse one line, `None` for blank and comment lines
fn line(input: &str) -> IResult<&str, Option<Item<'_>>> {
    all_consuming(preceded(
        space0,
        terminated(
            opt(alt((directive, map(number, Item::Word)))),
            tuple((space0, opt(comment))),
        ),
    ))(input)
}

/// A parsed program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub header: ProgramHeader,
    pub words: Vec<Word>,
}

impl Program {
    /// Parse the text of a program
    ///
    /// `name` is used when the program has no `.name` directive, and to label
    /// diagnostics.
    ///
    /// # Errors
    ///
    /// Fails on syntax errors, out of range words, an invalid start offset or
    /// a word count not matching the `.words` directive
    pub fn parse(name: &str, source: &str) -> Result<Self, LoadError> {
        let mut start = 0;
        let mut declared = None;
        let mut program_name = None;
        let mut words = Vec::new();

        let mut offset = 0;
        for (index, text) in source.split_inclusive('\n').enumerate() {
            let line_number = index + 1;
            let content = text.trim_end_matches(['\n', '\r']);
            let span = SourceSpan::from((offset, content.len()));
            offset += text.len();

            let item = match line(content) {
                Ok((_, item)) => item,
                Err(_) => {
                    return Err(LoadError::Syntax {
                        line: line_number,
                        src: NamedSource::new(name, source.to_owned()),
                        span,
                    })
                }
            };

            match item {
                None => {}
                Some(Item::Start(value)) => start = value,
                Some(Item::Words(value)) => declared = Some(value),
                Some(Item::Name(value)) => program_name = Some(value.to_owned()),
                Some(Item::Word(value)) => {
                    let word = Word::try_from(value)
                        .ok()
                        .filter(|word| (WORD_MIN..=WORD_MAX).contains(word))
                        .ok_or_else(|| LoadError::WordOutOfRange {
                            line: line_number,
                            value,
                            src: NamedSource::new(name, source.to_owned()),
                            span,
                        })?;
                    words.push(word);
                }
            }
        }

        let name = program_name.unwrap_or_else(|| name.to_owned());
        let word_count = words.len();

        if word_count == 0 {
            return Err(LoadError::Empty { name });
        }

        if let Some(declared) = declared {
            if usize::try_from(declared).ok() != Some(word_count) {
                return Err(LoadError::CountMismatch {
                    declared,
                    actual: word_count,
                });
            }
        }

        let start_offset = usize::try_from(start)
            .ok()
            .filter(|&start| start < word_count)
            .and_then(|start| Address::try_from(start).ok())
            .ok_or(LoadError::StartOutOfRange { start, word_count })?;

        Ok(Self {
            header: ProgramHeader {
                name,
                start_offset,
                word_count,
            },
            words,
        })
    }
}

fn read<F: Filesystem>(fs: &F, path: &Utf8Path) -> Result<Program, LoadError> {
    let io_error = |source| LoadError::Io {
        path: path.to_string(),
        source,
    };

    let mut source = String::new();
    fs.open(path)
        .map_err(io_error)?
        .read_to_string(&mut source)
        .map_err(io_error)?;

    let name = path.file_stem().unwrap_or(path.as_str());
    Program::parse(name, &source)
}

/// Read the metadata of a program without loading it
///
/// # Errors
///
/// Fails if the file cannot be read or is not a valid program
pub fn inspect<F: Filesystem>(fs: &F, path: &Utf8Path) -> Result<ProgramHeader, LoadError> {
    let program = read(fs, path)?;
    debug!(header = ?program.header, %path, "Inspected program");
    Ok(program.header)
}

/// Load a program in memory at a physical address of the user region
///
/// # Errors
///
/// Fails if the file cannot be read, is not a valid program, or if it does not
/// fit in the user region at this address
pub fn load<F: Filesystem>(
    fs: &F,
    path: &Utf8Path,
    memory: &mut Memory,
    address: Address,
) -> Result<LoadInfo, LoadError> {
    let program = read(fs, path)?;
    let header = program.header;

    if address < USER_START || address + header.size() > MEMORY_SIZE {
        return Err(LoadError::DoesNotFit {
            address,
            word_count: header.word_count,
        });
    }

    memory
        .write_block(address, &program.words)
        .map_err(|_| LoadError::DoesNotFit {
            address,
            word_count: header.word_count,
        })?;

    info!(
        name = %header.name,
        address,
        words = header.word_count,
        start = header.start_offset,
        "Program loaded"
    );

    Ok(LoadInfo {
        address,
        start_offset: header.start_offset,
        name: header.name,
        word_count: header.word_count,
    })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    const SUM: &str = indoc! {"
        # Add two numbers
        .name  sum
        _start 1
        .words 4

        00000000
        04100005   # load #5
        00100003   ; add #3
        13100000
    "};

    fn fs() -> InMemoryFilesystem {
        [
            ("sum.txt", SUM),
            ("plain.txt", "-42\n+7\n"),
            ("broken.txt", "1\nhello\n"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn parse_line_test() {
        assert_eq!(line(""), Ok(("", None)));
        assert_eq!(line("   # comment"), Ok(("", None)));
        assert_eq!(line("; comment"), Ok(("", None)));
        assert_eq!(line("_start 3"), Ok(("", Some(Item::Start(3)))));
        assert_eq!(line(".words\t10"), Ok(("", Some(Item::Words(10)))));
        assert_eq!(line(".name hello # x"), Ok(("", Some(Item::Name("hello")))));
        assert_eq!(line("  -12 # x"), Ok(("", Some(Item::Word(-12)))));
        assert!(line("12 13").is_err());
        assert!(line("_start").is_err());
        assert!(line("abc").is_err());
    }

    #[test]
    fn inspect_test() {
        let header = inspect(&fs(), Utf8Path::new("sum.txt")).unwrap();
        assert_eq!(
            header,
            ProgramHeader {
                name: "sum".to_owned(),
                start_offset: 1,
                word_count: 4,
            }
        );

        // Without a `.name`, the file stem is used
        let header = inspect(&fs(), Utf8Path::new("plain.txt")).unwrap();
        assert_eq!(header.name, "plain");
        assert_eq!(header.start_offset, 0);
    }

    #[test]
    fn load_test() {
        let mut memory = Memory::default();
        let info = load(&fs(), Utf8Path::new("sum.txt"), &mut memory, 500).unwrap();

        assert_eq!(
            info,
            LoadInfo {
                address: 500,
                start_offset: 1,
                name: "sum".to_owned(),
                word_count: 4,
            }
        );
        let words: Vec<Word> = memory.iter_range(500, 5).map(|(_, word)| word).collect();
        assert_eq!(words, [0, 4_100_005, 100_003, 13_100_000, 0]);
    }

    #[test]
    fn placement_test() {
        let mut memory = Memory::default();
        let fs = fs();
        let path = Utf8Path::new("sum.txt");

        assert!(matches!(
            load(&fs, path, &mut memory, 299),
            Err(LoadError::DoesNotFit { address: 299, .. })
        ));
        assert!(matches!(
            load(&fs, path, &mut memory, 1997),
            Err(LoadError::DoesNotFit { .. })
        ));
        assert!(load(&fs, path, &mut memory, 1996).is_ok());
        assert_eq!(memory.get(1999), Ok(13_100_000));
    }

    #[test]
    fn errors_test() {
        let mut memory = Memory::default();

        let err = load(&fs(), Utf8Path::new("broken.txt"), &mut memory, 300).unwrap_err();
        assert!(matches!(err, LoadError::Syntax { line: 2, .. }));
        assert_eq!(err.to_string(), "invalid syntax on line 2");
        // Nothing is written on failure
        assert_eq!(memory.get(300), Ok(0));

        let err = inspect(&fs(), Utf8Path::new("missing.txt")).unwrap_err();
        assert_eq!(err.to_string(), "could not read missing.txt");

        let err = Program::parse("big", "100000000\n").unwrap_err();
        assert!(matches!(
            err,
            LoadError::WordOutOfRange {
                line: 1,
                value: 100_000_000,
                ..
            }
        ));

        let err = Program::parse("start", "_start 2\n1\n2\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "start offset 2 is outside of the program (2 words)"
        );

        let err = Program::parse("count", ".words 3\n1\n2\n").unwrap_err();
        assert_eq!(err.to_string(), "program declares 3 words but has 2");

        let err = Program::parse("empty", "# nothing\n").unwrap_err();
        assert_eq!(err.to_string(), "program empty has no words");
    }
}
