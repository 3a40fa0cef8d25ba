//! Read-only projection of a memory image back into mnemonic form, used
//! both for display listings and for round-tripping through the
//! assembler.

use std::fmt;

use crate::assembler::Program;
use crate::instruction::{decode, Arity};
use crate::memory::{CellKind, Word, MAILBOXES};

/// One rendered mailbox of the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub address: Word,
    /// The raw stored value.
    pub value: Word,
    /// Label defined at this address, if any.
    pub label: Option<String>,
    /// Mnemonic rendering: instruction plus operand for code cells,
    /// literal data otherwise.
    pub text: String,
}

impl Row {
    /// The row as a line of assembly source, fit for reassembly.
    pub fn source_line(&self) -> String {
        match &self.label {
            Some(label) => format!("{} {}", label, self.text),
            None => self.text.clone(),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}  {:03}  ", self.address, self.value)?;
        match &self.label {
            Some(label) => write!(f, "{:<8} {}", label, self.text),
            None => write!(f, "{:<8} {}", "", self.text),
        }
    }
}

/// Renders every mailbox of an assembled program.
pub fn disassemble(program: &Program) -> Vec<Row> {
    (0..MAILBOXES as Word)
        .map(|address| row(program, address))
        .collect()
}

/// Reconstructs assembly source for the whole image. Feeding it back
/// through the assembler reproduces the identical memory image.
pub fn source(program: &Program) -> String {
    let mut out = String::new();
    for row in disassemble(program) {
        out.push_str(&row.source_line());
        out.push('\n');
    }
    out
}

/// The listing an external display should show: the disassembled program,
/// or the raw source echoed unchanged while nothing is assembled yet.
pub fn listing(program: Option<&Program>, source_text: &str) -> Vec<String> {
    match program {
        Some(program) => disassemble(program)
            .iter()
            .map(Row::to_string)
            .collect(),
        None => source_text.lines().map(str::to_string).collect(),
    }
}

fn row(program: &Program, address: Word) -> Row {
    let value = program.memory.get(address);
    let text = match program.memory.kind(address) {
        CellKind::Code => render_code(program, value),
        CellKind::Data => render_data(value),
    };

    Row {
        address,
        value,
        label: program.symbols.label_at(address).map(String::from),
        text,
    }
}

fn render_code(program: &Program, value: Word) -> String {
    match decode(value) {
        Some((opcode, operand)) if opcode.arity() == Arity::One => {
            match program.symbols.label_at(operand) {
                Some(label) => format!("{} {}", opcode, label),
                None => format!("{} {}", opcode, operand),
            }
        }
        Some((opcode, _)) => opcode.to_string(),
        // a code cell STA overwrote may no longer decode
        None => render_data(value),
    }
}

fn render_data(value: Word) -> String {
    format!("DAT {}", value)
}
