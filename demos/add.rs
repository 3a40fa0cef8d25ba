use color_eyre::eyre::Result;

use lmc::assembler::assemble;
use lmc::processor::ports::{Capture, Fifo};
use lmc::processor::Processor;
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Reads two numbers and prints their sum.
const SOURCE: &str = "\
        INP
        STA first
        INP
        ADD first
        OUT
        HLT
first   DAT
";

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Debug)
        .init()
        .unwrap(); // logging

    let mut program = assemble(SOURCE)?;
    let mut cpu = Processor::default();
    let mut input = Fifo::new([19, 23]);
    let mut output = Capture::default();

    let outcome = cpu.run(&mut program.memory, &mut input, &mut output);
    log::info!("{:?}, output: {:?}", outcome, output.numbers);

    Ok(())
}
