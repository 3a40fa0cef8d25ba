//! Assembler and emulator for a little decimal mailbox computer: 100
//! mailboxes of three decimal digits each, one accumulator, a program
//! counter and a negative flag.
//!
//! ```
//! use lmc::assembler::assemble;
//! use lmc::processor::ports::{Capture, Fifo};
//! use lmc::processor::{Processor, Step};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut program = assemble("INP\nADD one\nOUT\nHLT\none DAT 1")?;
//! let mut cpu = Processor::default();
//! let mut input = Fifo::new([41]);
//! let mut output = Capture::default();
//!
//! let outcome = cpu.run(&mut program.memory, &mut input, &mut output);
//!
//! assert_eq!(outcome, Step::Halted);
//! assert_eq!(output.numbers, [42]);
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod disassembler;
pub mod instruction;
pub mod memory;
pub mod processor;
