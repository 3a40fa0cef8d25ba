use color_eyre::eyre::Result;

use lmc::assembler::assemble;
use lmc::processor::ports::{Capture, NoInput};
use lmc::processor::Processor;
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Prints a greeting one character code at a time through OTC.
const SOURCE: &str = "\
        LDA h
        OTC
        LDA i
        OTC
        LDA bang
        OTC
        HLT
h       DAT 72
i       DAT 73
bang    DAT 33
";

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap(); // logging

    let mut program = assemble(SOURCE)?;
    let mut cpu = Processor::default();
    let mut output = Capture::default();

    let outcome = cpu.run(&mut program.memory, &mut NoInput, &mut output);
    log::info!("{:?}: {}", outcome, output.text);

    Ok(())
}
