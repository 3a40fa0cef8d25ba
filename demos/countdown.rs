use color_eyre::eyre::Result;

use lmc::assembler::assemble;
use lmc::processor::ports::{Console, NoInput};
use lmc::processor::Processor;
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Counts down from 10 to 0, then stops on the SUB that would go
/// negative.
const SOURCE: &str = "\
        LDA start
loop    OUT
        SUB one
        BRP loop
        HLT
start   DAT 10
one     DAT 1
";

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap(); // logging

    let mut program = assemble(SOURCE)?;
    let mut cpu = Processor::default();

    let outcome = cpu.run(&mut program.memory, &mut NoInput, &mut Console);
    log::info!("{:?}", outcome);

    Ok(())
}
