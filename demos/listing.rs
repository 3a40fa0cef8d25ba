use color_eyre::eyre::Result;

use lmc::assembler::assemble;
use lmc::disassembler::disassemble;
use simple_logger::SimpleLogger;

const SOURCE: &str = "\
        INP
        STA value
        LDA value
        OUT
        HLT
value   DAT
";

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().init().unwrap(); // logging

    let program = assemble(SOURCE)?;
    for row in disassemble(&program).iter().take(8) {
        println!("{}", row);
    }

    Ok(())
}
