//!         INP
//!         STA first
//!         INP
//!         ADD first
//!         OUT
//!         HLT
//! first   DAT

use std::borrow::Cow;
use std::error;
use std::fmt;

pub mod lexer;

use crate::instruction::{Arity, Mnemonic};
use crate::memory::{CellKind, StdMem, Word, MAILBOXES, WORD_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    UnknownMnemonic,
    MissingOperand,
    UnexpectedOperand,
    InvalidLabel,
    DuplicateLabel,
    UndefinedLabel,
    AddressOutOfRange,
    ValueOutOfRange,
    ProgramTooLarge,
}

impl fmt::Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmErrorKind::UnknownMnemonic => f.write_str("unknown mnemonic"),
            AsmErrorKind::MissingOperand => f.write_str("missing operand"),
            AsmErrorKind::UnexpectedOperand => f.write_str("unexpected operand"),
            AsmErrorKind::InvalidLabel => f.write_str("invalid label"),
            AsmErrorKind::DuplicateLabel => f.write_str("duplicate label"),
            AsmErrorKind::UndefinedLabel => f.write_str("undefined label"),
            AsmErrorKind::AddressOutOfRange => f.write_str("mailbox address out of range"),
            AsmErrorKind::ValueOutOfRange => f.write_str("value out of range"),
            AsmErrorKind::ProgramTooLarge => f.write_str("program does not fit in memory"),
        }
    }
}

/// The single diagnostic an assembly attempt can produce. The first error
/// found aborts the whole pass; no partial image is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmError {
    kind: AsmErrorKind,
    context: Option<Cow<'static, str>>,
    line_nr: usize,
}

impl AsmError {
    fn new<C, S>(kind: AsmErrorKind, context: C, line_nr: usize) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
            line_nr,
        }
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }

    /// 1-based source line the diagnostic points at.
    pub fn line(&self) -> usize {
        self.line_nr
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(
                f,
                "error [ln: {}]: {} - {}",
                self.line_nr, self.kind, context
            )
        } else {
            write!(f, "error [ln: {}]: {}", self.line_nr, self.kind)
        }
    }
}

impl error::Error for AsmError {}

pub type Result<T, E = AsmError> = std::result::Result<T, E>;

/// A label bound to a mailbox address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: Word,
}

/// Label definitions collected in pass 1, matched case-insensitively.
/// Immutable once assembly finishes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SymbolTable {
    entries: Vec<Symbol>,
}

impl SymbolTable {
    fn define(&mut self, name: &str, address: Word) -> bool {
        if self.address_of(name).is_some() {
            return false;
        }
        self.entries.push(Symbol {
            name: name.to_string(),
            address,
        });
        true
    }

    /// The address a label resolves to.
    pub fn address_of(&self, name: &str) -> Option<Word> {
        self.entries
            .iter()
            .find(|symbol| symbol.name.eq_ignore_ascii_case(name))
            .map(|symbol| symbol.address)
    }

    /// The label defined at `address`, if any.
    pub fn label_at(&self, address: Word) -> Option<&str> {
        self.entries
            .iter()
            .find(|symbol| symbol.address == address)
            .map(|symbol| symbol.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A successfully assembled program: the memory image (with per-cell
/// code/data classification) and the symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub memory: StdMem,
    pub symbols: SymbolTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Statement<'a> {
    line_nr: usize,
    address: Word,
    body: Body<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body<'a> {
    Code {
        mnemonic: Mnemonic,
        argument: Option<&'a str>,
    },
    /// A bare 1-3 digit code, stored verbatim.
    Word(Word),
}

/// Assembles `source` into a program image.
///
/// Pass 1 collects label definitions so forward references resolve; pass 2
/// encodes each line into its mailbox.
pub fn assemble(source: &str) -> Result<Program> {
    let lines = lexer::tokenize(source);

    // Pass 1: labels. Each non-blank line claims the next mailbox.
    let mut symbols = SymbolTable::default();
    let mut statements = Vec::new();
    for line in &lines {
        if line.tokens.is_empty() {
            continue;
        }
        if statements.len() >= MAILBOXES {
            return Err(AsmError::new(
                AsmErrorKind::ProgramTooLarge,
                format!("only {} mailboxes available", MAILBOXES),
                line.number,
            ));
        }
        let address = statements.len() as Word;
        let mut rest: &[&str] = &line.tokens;

        let first = rest[0];
        if Mnemonic::lookup(first).is_none() && code_literal(first).is_none() {
            if first.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(AsmError::new(
                    AsmErrorKind::InvalidLabel,
                    format!("`{}` may not begin with a digit", first),
                    line.number,
                ));
            }
            if !symbols.define(first, address) {
                return Err(AsmError::new(
                    AsmErrorKind::DuplicateLabel,
                    format!("`{}` is already defined", first),
                    line.number,
                ));
            }
            rest = &rest[1..];
        }

        let body = match rest.split_first() {
            // a label alone still claims its mailbox, holding 0
            None => Body::Code {
                mnemonic: Mnemonic::Data,
                argument: None,
            },
            Some((&word, args)) => {
                let argument = match args {
                    [] => None,
                    [argument] => Some(*argument),
                    _ => {
                        return Err(AsmError::new(
                            AsmErrorKind::UnexpectedOperand,
                            format!("trailing `{}`", args[1]),
                            line.number,
                        ))
                    }
                };
                if let Some(mnemonic) = Mnemonic::lookup(word) {
                    Body::Code { mnemonic, argument }
                } else if let Some(value) = code_literal(word) {
                    if let Some(argument) = argument {
                        return Err(AsmError::new(
                            AsmErrorKind::UnexpectedOperand,
                            format!("`{}` after a literal code", argument),
                            line.number,
                        ));
                    }
                    Body::Word(value)
                } else {
                    return Err(AsmError::new(
                        AsmErrorKind::UnknownMnemonic,
                        format!("`{}`", word),
                        line.number,
                    ));
                }
            }
        };

        statements.push(Statement {
            line_nr: line.number,
            address,
            body,
        });
    }

    // Pass 2: encoding, with operands resolved against the symbol table.
    let mut memory = StdMem::default();
    for statement in &statements {
        let (value, kind) = encode(statement, &symbols)?;
        memory.set(statement.address, value);
        memory.classify(statement.address, kind);
    }

    Ok(Program { memory, symbols })
}

fn encode(statement: &Statement<'_>, symbols: &SymbolTable) -> Result<(Word, CellKind)> {
    let (mnemonic, argument) = match statement.body {
        Body::Word(value) => return Ok((value, CellKind::Data)),
        Body::Code { mnemonic, argument } => (mnemonic, argument),
    };

    let operand = match (mnemonic.arity(), argument) {
        (Arity::Zero, None) => 0,
        (Arity::Zero, Some(argument)) => {
            return Err(AsmError::new(
                AsmErrorKind::UnexpectedOperand,
                format!("`{}` takes no operand, got `{}`", mnemonic, argument),
                statement.line_nr,
            ))
        }
        (Arity::One, None) => {
            return Err(AsmError::new(
                AsmErrorKind::MissingOperand,
                format!("`{}` needs a mailbox operand", mnemonic),
                statement.line_nr,
            ))
        }
        (Arity::One, Some(argument)) => resolve(
            argument,
            symbols,
            MAILBOXES as Word - 1,
            AsmErrorKind::AddressOutOfRange,
            statement.line_nr,
        )?,
        (Arity::Optional, None) => 0,
        (Arity::Optional, Some(argument)) => resolve(
            argument,
            symbols,
            WORD_LIMIT - 1,
            AsmErrorKind::ValueOutOfRange,
            statement.line_nr,
        )?,
    };

    let value = mnemonic.encode(operand);
    if value >= WORD_LIMIT {
        return Err(AsmError::new(
            AsmErrorKind::ValueOutOfRange,
            format!("`{}` does not fit in a mailbox", value),
            statement.line_nr,
        ));
    }

    let kind = match mnemonic {
        Mnemonic::Op(_) => CellKind::Code,
        Mnemonic::Data => CellKind::Data,
    };
    Ok((value, kind))
}

/// Resolves an argument token: a bare number up to `limit`, or a label.
fn resolve(
    argument: &str,
    symbols: &SymbolTable,
    limit: Word,
    range_error: AsmErrorKind,
    line_nr: usize,
) -> Result<Word> {
    if argument.bytes().all(|b| b.is_ascii_digit()) {
        let value = argument.parse::<u32>().unwrap_or(u32::MAX);
        if value > u32::from(limit) {
            return Err(AsmError::new(
                range_error,
                format!("`{}` exceeds {}", argument, limit),
                line_nr,
            ));
        }
        Ok(value as Word)
    } else {
        symbols.address_of(argument).ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::UndefinedLabel,
                format!("`{}`", argument),
                line_nr,
            )
        })
    }
}

/// A bare 1-3 digit instruction code.
fn code_literal(token: &str) -> Option<Word> {
    if token.len() <= 3 && token.bytes().all(|b| b.is_ascii_digit()) {
        token.parse().ok()
    } else {
        None
    }
}
