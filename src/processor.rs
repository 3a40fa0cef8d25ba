use std::error;
use std::fmt;

use log::*;

use crate::instruction::{decode, Opcode};
use crate::memory::{wrap, Memory, Word, WORD_LIMIT};

pub mod ports;

use self::ports::{InputPort, OutputPort};

/// Behavioral switches for the ambiguous corners of the machine. Each
/// default follows the strictest observed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Policies {
    /// ADD overflow past 999 sets the negative flag (SUB underflow always
    /// does, regardless of this switch).
    pub flag_on_overflow: bool,
    /// BRZ only branches while the negative flag is clear, in addition to
    /// the accumulator being zero.
    pub brz_checks_flag: bool,
    /// STA, BRZ, OUT and OTC fault when the accumulator no longer holds a
    /// well-defined value after an overflow or underflow.
    pub forbid_undefined_acc: bool,
    /// Falling off mailbox 99 back to 0 is fatal unless a branch or HLT
    /// moved the counter there deliberately.
    pub forbid_counter_wrap: bool,
    /// Codes in the undefined opcode ranges fault instead of acting as
    /// no-ops.
    pub strict_decode: bool,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            flag_on_overflow: true,
            brz_checks_flag: true,
            forbid_undefined_acc: true,
            forbid_counter_wrap: true,
            strict_decode: true,
        }
    }
}

/// Where the machine stands between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Program loaded, no step taken yet.
    Loaded,
    /// Mid-program; more instructions to execute.
    Running,
    /// INP found no input. Resumable: the counter still points at the INP.
    AwaitingInput,
    /// HLT executed.
    Halted,
    /// A runtime fault occurred. Terminal until [`Processor::reset`].
    Faulted,
}

/// What a single step did, and why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum Step {
    /// An instruction executed; the machine can continue.
    Executed,
    Halted,
    AwaitingInput,
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The fetched value decodes to no instruction.
    InvalidInstruction { code: Word },
    /// The counter fell off mailbox 99 back to 0.
    CounterWrapped,
    /// An overflowed or underflowed accumulator was used where a
    /// well-defined value is required.
    UndefinedAccumulator,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::InvalidInstruction { code } => {
                write!(f, "invalid instruction code `{:03}`", code)
            }
            FaultKind::CounterWrapped => {
                f.write_str("program counter wrapped past the last mailbox")
            }
            FaultKind::UndefinedAccumulator => {
                f.write_str("accumulator holds no well-defined value")
            }
        }
    }
}

/// A runtime diagnostic. Preserved on the processor until the next reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fault {
    pub kind: FaultKind,
    /// Mailbox of the faulting instruction.
    pub address: Word,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault [box: {:02}]: {}", self.address, self.kind)
    }
}

impl error::Error for Fault {}

/// Emulates the machine registers and the fetch-decode-execute loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Processor {
    /// Accumulator
    pub acc: Word,
    /// False after an overflow/underflow left the accumulator unreliable.
    /// Only LDA and INP restore it.
    pub acc_defined: bool,
    /// Negative flag. Set by SUB underflow (and, by policy, ADD overflow);
    /// cleared only by LDA and INP.
    pub flag: bool,
    /// Program counter
    pub pc: Word,
    policies: Policies,
    status: Status,
    fault: Option<Fault>,
}

impl Default for Processor {
    /// Initializes a new processor with the default policies.
    fn default() -> Self {
        Self::new(Policies::default())
    }
}

impl Processor {
    pub fn new(policies: Policies) -> Self {
        Self {
            acc: 0,
            acc_defined: true,
            flag: false,
            pc: 0,
            policies,
            status: Status::Loaded,
            fault: None,
        }
    }

    /// Returns the registers to their zero state and clears any fault, as
    /// after a fresh program load.
    pub fn reset(&mut self) {
        *self = Self::new(self.policies);
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// The preserved runtime diagnostic, if execution faulted.
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn policies(&self) -> Policies {
        self.policies
    }

    /// Executes a single instruction.
    ///
    /// The counter is advanced past the fetched cell *before* dispatch;
    /// HLT, INP-without-input and taken branches override it.
    pub fn step<const S: usize, I, O>(
        &mut self,
        memory: &mut Memory<S>,
        input: &mut I,
        output: &mut O,
    ) -> Step
    where
        I: InputPort,
        O: OutputPort,
    {
        if self.status == Status::Faulted {
            return Step::Faulted;
        }

        let at = self.pc;
        let code = memory.get(at);
        self.pc = wrap(i64::from(at) + 1, S as i64);

        let mut jumped = false;
        let step = match decode(code) {
            Some((opcode, operand)) => {
                self.execute_instruction(opcode, operand, at, &mut jumped, memory, input, output)
            }
            None if self.policies.strict_decode => {
                self.fault_at(FaultKind::InvalidInstruction { code }, at)
            }
            None => {
                debug!("{:03} (no-op)", code);
                Step::Executed
            }
        };

        if step == Step::Executed {
            if self.policies.forbid_counter_wrap && at as usize == S - 1 && !jumped {
                return self.fault_at(FaultKind::CounterWrapped, at);
            }
            self.status = Status::Running;
        }
        step
    }

    /// Runs until the program halts, stalls on input, or faults, and
    /// reports which of the three stopped it.
    pub fn run<const S: usize, I, O>(
        &mut self,
        memory: &mut Memory<S>,
        input: &mut I,
        output: &mut O,
    ) -> Step
    where
        I: InputPort,
        O: OutputPort,
    {
        loop {
            match self.step(memory, input, output) {
                Step::Executed => {}
                Step::Halted => {
                    info!("program halted at mailbox {:02}", self.pc);
                    return Step::Halted;
                }
                stopped => return stopped,
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_instruction<const S: usize, I, O>(
        &mut self,
        opcode: Opcode,
        operand: Word,
        at: Word,
        jumped: &mut bool,
        memory: &mut Memory<S>,
        input: &mut I,
        output: &mut O,
    ) -> Step
    where
        I: InputPort,
        O: OutputPort,
    {
        match opcode {
            Opcode::HLT => {
                self.pc = at; // undo the advance so re-stepping stays here
                self.status = Status::Halted;

                debug!("HLT");
                return Step::Halted;
            }
            Opcode::ADD => {
                let sum = i64::from(self.acc) + i64::from(memory.get(operand));
                if sum >= i64::from(WORD_LIMIT) {
                    self.acc_defined = false;
                    if self.policies.flag_on_overflow {
                        self.flag = true;
                    }
                }
                self.acc = wrap(sum, i64::from(WORD_LIMIT));

                debug!("ADD {:02}: acc={}", operand, self.acc);
            }
            Opcode::SUB => {
                let diff = i64::from(self.acc) - i64::from(memory.get(operand));
                if diff < 0 {
                    self.flag = true;
                    self.acc_defined = false;
                }
                self.acc = wrap(diff, i64::from(WORD_LIMIT));

                debug!("SUB {:02}: acc={} flag={}", operand, self.acc, self.flag);
            }
            Opcode::STA => {
                if let Some(step) = self.guard_acc(at) {
                    return step;
                }
                memory.set(operand, self.acc);

                debug!("STA {:02}: {}", operand, self.acc);
            }
            Opcode::LDA => {
                self.load(memory.get(operand));

                debug!("LDA {:02}: acc={}", operand, self.acc);
            }
            Opcode::BRA => {
                self.pc = operand;
                *jumped = true;

                debug!("BRA {:02}", operand);
            }
            Opcode::BRZ => {
                if let Some(step) = self.guard_acc(at) {
                    return step;
                }
                let taken = self.acc == 0 && !(self.policies.brz_checks_flag && self.flag);
                if taken {
                    self.pc = operand;
                    *jumped = true;
                }

                debug!("BRZ {:02}: {}", operand, taken);
            }
            Opcode::BRP => {
                // consults the flag alone, never the accumulator
                let taken = !self.flag;
                if taken {
                    self.pc = operand;
                    *jumped = true;
                }

                debug!("BRP {:02}: {}", operand, taken);
            }
            Opcode::INP => match input.poll() {
                None => {
                    self.pc = at; // resumable: retry this cell once input exists
                    self.status = Status::AwaitingInput;

                    debug!("INP: awaiting input");
                    return Step::AwaitingInput;
                }
                Some(value) => {
                    self.load(wrap(i64::from(value), i64::from(WORD_LIMIT)));

                    debug!("INP: acc={}", self.acc);
                }
            },
            Opcode::OUT => {
                if let Some(step) = self.guard_acc(at) {
                    return step;
                }
                output.number(self.acc);

                debug!("OUT: {}", self.acc);
            }
            Opcode::OTC => {
                if let Some(step) = self.guard_acc(at) {
                    return step;
                }
                let ch = char::from_u32(u32::from(self.acc)).unwrap_or('\u{fffd}');
                output.character(ch);

                debug!("OTC: {:?}", ch);
            }
        }

        Step::Executed
    }

    /// Loads a well-defined value: clears the flag and restores the
    /// accumulator. Shared by LDA and INP.
    fn load(&mut self, value: Word) {
        self.acc = value;
        self.acc_defined = true;
        self.flag = false;
    }

    fn guard_acc(&mut self, at: Word) -> Option<Step> {
        if self.policies.forbid_undefined_acc && !self.acc_defined {
            Some(self.fault_at(FaultKind::UndefinedAccumulator, at))
        } else {
            None
        }
    }

    fn fault_at(&mut self, kind: FaultKind, address: Word) -> Step {
        let fault = Fault { kind, address };
        error!("{}", fault);
        self.fault = Some(fault);
        self.status = Status::Faulted;
        Step::Faulted
    }
}

#[cfg(test)]
mod tests {
    use super::ports::{Capture, Fifo, NoInput};
    use super::*;
    use crate::assembler::assemble;
    use crate::memory::StdMem;
    use crate::write_words;
    use color_eyre::eyre::Result;

    fn strict_except(tweak: impl FnOnce(&mut Policies)) -> Policies {
        let mut policies = Policies::default();
        tweak(&mut policies);
        policies
    }

    #[test]
    fn test_store_output_halt_in_four_steps() -> Result<()> {
        let mut program = assemble("INP\nSTA 20\nOUT\nHLT")?;
        let mut cpu = Processor::default();
        let mut input = Fifo::new([7]);
        let mut output = Capture::default();

        for _ in 0..3 {
            let step = cpu.step(&mut program.memory, &mut input, &mut output);
            assert_eq!(step, Step::Executed);
        }
        let step = cpu.step(&mut program.memory, &mut input, &mut output);
        assert_eq!(step, Step::Halted);

        assert_eq!(program.memory.get(20), 7);
        assert_eq!(output.numbers, [7]);
        assert_eq!(cpu.status(), Status::Halted);

        Ok(())
    }

    #[test]
    fn test_add_overflow_wraps_and_sets_flag() -> Result<()> {
        let mut mem = StdMem::default();
        write_words!(mem : 0 => 150, 0);
        mem.set(50, 2);

        let mut cpu = Processor::default();
        cpu.acc = 999;
        let step = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

        assert_eq!(step, Step::Executed);
        assert_eq!(cpu.acc, 1);
        assert!(cpu.flag);
        assert!(!cpu.acc_defined);

        Ok(())
    }

    #[test]
    fn test_add_overflow_flag_policy_off() -> Result<()> {
        let mut mem = StdMem::default();
        write_words!(mem : 0 => 150, 0);
        mem.set(50, 2);

        let mut cpu = Processor::new(strict_except(|p| p.flag_on_overflow = false));
        cpu.acc = 999;
        let _ = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

        assert_eq!(cpu.acc, 1);
        assert!(!cpu.flag);
        // the value is unreliable either way
        assert!(!cpu.acc_defined);

        Ok(())
    }

    #[test]
    fn test_add_never_clears_flag() -> Result<()> {
        let mut mem = StdMem::default();
        write_words!(mem : 0 => 150, 0);
        mem.set(50, 1);

        let mut cpu = Processor::default();
        cpu.flag = true;
        let _ = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

        assert!(cpu.flag);

        Ok(())
    }

    #[test]
    fn test_sub_underflow_wraps_to_complement() -> Result<()> {
        for policies in [
            Policies::default(),
            strict_except(|p| p.flag_on_overflow = false),
        ] {
            let mut mem = StdMem::default();
            write_words!(mem : 0 => 250, 0);
            mem.set(50, 1);

            let mut cpu = Processor::new(policies);
            let _ = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

            assert_eq!(cpu.acc, 999);
            // SUB sets the flag unconditionally
            assert!(cpu.flag);
            assert!(!cpu.acc_defined);
        }

        Ok(())
    }

    #[test]
    fn test_lda_clears_flag_and_restores_acc() -> Result<()> {
        let mut mem = StdMem::default();
        write_words!(mem : 0 => 250, 550, 0);
        mem.set(50, 1);

        let mut cpu = Processor::default();
        let _ = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());
        assert!(cpu.flag);

        let _ = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());
        assert_eq!(cpu.acc, 1);
        assert!(!cpu.flag);
        assert!(cpu.acc_defined);

        Ok(())
    }

    #[test]
    fn test_brp_consults_only_the_flag() -> Result<()> {
        // SUB underflows (flag set), then ADD leaves a positive-looking
        // value without clearing the flag: BRP must still fall through.
        let source = "\
LDA zero
SUB one
ADD six
BRP target
HLT
target DAT
zero DAT
one DAT 1
six DAT 6
";
        let mut program = assemble(source)?;
        let mut cpu = Processor::default();
        let mut output = Capture::default();

        let step = cpu.run(&mut program.memory, &mut NoInput, &mut output);

        assert_eq!(step, Step::Halted);
        assert_eq!(cpu.acc, 5);
        assert!(cpu.flag);
        assert_eq!(cpu.pc, 4);

        Ok(())
    }

    #[test]
    fn test_brp_branches_while_flag_clear() -> Result<()> {
        // 998 would conventionally look negative; BRP ignores the value.
        let mut program = assemble("LDA big\nBRP 4\nHLT\nHLT\nHLT\nbig DAT 998")?;
        let mut cpu = Processor::default();

        let _ = cpu.run(&mut program.memory, &mut NoInput, &mut Capture::default());

        assert_eq!(cpu.pc, 4);

        Ok(())
    }

    #[test]
    fn test_bra_is_unconditional() -> Result<()> {
        let mut mem = StdMem::default();
        write_words!(mem : 0 => 642);

        let mut cpu = Processor::default();
        cpu.flag = true;
        let step = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

        assert_eq!(step, Step::Executed);
        assert_eq!(cpu.pc, 42);

        Ok(())
    }

    #[test]
    fn test_brz_zero_and_flag_interplay() -> Result<()> {
        // acc == 0 but flag set: the default policy refuses the branch
        let mut mem = StdMem::default();
        write_words!(mem : 0 => 710);

        let mut cpu = Processor::default();
        cpu.flag = true;
        let _ = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());
        assert_eq!(cpu.pc, 1);

        // with the policy off the flag is ignored
        let mut cpu = Processor::new(strict_except(|p| p.brz_checks_flag = false));
        cpu.flag = true;
        let _ = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());
        assert_eq!(cpu.pc, 10);

        // nonzero accumulator never branches
        let mut cpu = Processor::default();
        cpu.acc = 3;
        let _ = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());
        assert_eq!(cpu.pc, 1);

        Ok(())
    }

    #[test]
    fn test_undefined_acc_faults_sta_out_brz() -> Result<()> {
        for code in [320, 902, 700] {
            let mut mem = StdMem::default();
            write_words!(mem : 0 => code);

            let mut cpu = Processor::default();
            cpu.acc_defined = false;
            let step = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

            assert_eq!(step, Step::Faulted);
            assert_eq!(cpu.status(), Status::Faulted);
            let fault = cpu.fault().expect("fault preserved");
            assert_eq!(fault.kind, FaultKind::UndefinedAccumulator);
            assert_eq!(fault.address, 0);
        }

        Ok(())
    }

    #[test]
    fn test_undefined_acc_allowed_when_policy_off() -> Result<()> {
        let mut mem = StdMem::default();
        write_words!(mem : 0 => 320);

        let mut cpu = Processor::new(strict_except(|p| p.forbid_undefined_acc = false));
        cpu.acc = 5;
        cpu.acc_defined = false;
        let step = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

        assert_eq!(step, Step::Executed);
        assert_eq!(mem.get(20), 5);

        Ok(())
    }

    #[test]
    fn test_halt_is_re_steppable() -> Result<()> {
        let mut program = assemble("HLT")?;
        let mut cpu = Processor::default();

        let step = cpu.step(&mut program.memory, &mut NoInput, &mut Capture::default());
        assert_eq!(step, Step::Halted);
        assert_eq!(cpu.pc, 0);

        // stepping again re-executes the same cell
        let step = cpu.step(&mut program.memory, &mut NoInput, &mut Capture::default());
        assert_eq!(step, Step::Halted);
        assert_eq!(cpu.pc, 0);

        Ok(())
    }

    #[test]
    fn test_input_stall_is_resumable() -> Result<()> {
        let mut program = assemble("INP\nOUT\nHLT")?;
        let mut cpu = Processor::default();
        let mut input = Fifo::default();
        let mut output = Capture::default();

        let step = cpu.run(&mut program.memory, &mut input, &mut output);
        assert_eq!(step, Step::AwaitingInput);
        assert_eq!(cpu.status(), Status::AwaitingInput);
        assert_eq!(cpu.pc, 0);

        input.push(12);
        let step = cpu.run(&mut program.memory, &mut input, &mut output);
        assert_eq!(step, Step::Halted);
        assert_eq!(output.numbers, [12]);

        Ok(())
    }

    #[test]
    fn test_invalid_code_faults() -> Result<()> {
        let mut mem = StdMem::default();
        write_words!(mem : 0 => 450);

        let mut cpu = Processor::default();
        let step = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

        assert_eq!(step, Step::Faulted);
        let fault = cpu.fault().expect("fault preserved");
        assert_eq!(fault.kind, FaultKind::InvalidInstruction { code: 450 });
        assert_eq!(fault.address, 0);

        // terminal until reset
        let step = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());
        assert_eq!(step, Step::Faulted);

        cpu.reset();
        assert_eq!(cpu.status(), Status::Loaded);
        assert!(cpu.fault().is_none());

        Ok(())
    }

    #[test]
    fn test_lenient_decode_treats_unknown_as_noop() -> Result<()> {
        let mut mem = StdMem::default();
        write_words!(mem : 0 => 450, 0);

        let mut cpu = Processor::new(strict_except(|p| p.strict_decode = false));
        let step = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

        assert_eq!(step, Step::Executed);
        assert_eq!(cpu.pc, 1);

        Ok(())
    }

    #[test]
    fn test_counter_wrap_faults_by_default() -> Result<()> {
        let mut mem = StdMem::default();
        // LDA 0 in every mailbox: nothing ever branches or halts
        mem.load(0, &[500; 100]);

        let mut cpu = Processor::default();
        let step = cpu.run(&mut mem, &mut NoInput, &mut Capture::default());

        assert_eq!(step, Step::Faulted);
        let fault = cpu.fault().expect("fault preserved");
        assert_eq!(fault.kind, FaultKind::CounterWrapped);
        assert_eq!(fault.address, 99);

        Ok(())
    }

    #[test]
    fn test_branch_at_last_mailbox_does_not_wrap_fault() -> Result<()> {
        let mut mem = StdMem::default();
        mem.set(99, 600); // BRA 0

        let mut cpu = Processor::default();
        cpu.pc = 99;
        let step = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

        assert_eq!(step, Step::Executed);
        assert_eq!(cpu.pc, 0);

        Ok(())
    }

    #[test]
    fn test_counter_wraps_silently_when_allowed() -> Result<()> {
        let mut mem = StdMem::default();
        mem.set(99, 500); // LDA 0

        let mut cpu = Processor::new(strict_except(|p| p.forbid_counter_wrap = false));
        cpu.pc = 99;
        let step = cpu.step(&mut mem, &mut NoInput, &mut Capture::default());

        assert_eq!(step, Step::Executed);
        assert_eq!(cpu.pc, 0);

        Ok(())
    }

    #[test]
    fn test_otc_emits_characters() -> Result<()> {
        let mut program = assemble("LDA h\nOTC\nLDA i\nOTC\nHLT\nh DAT 72\ni DAT 73")?;
        let mut cpu = Processor::default();
        let mut output = Capture::default();

        let step = cpu.run(&mut program.memory, &mut NoInput, &mut output);

        assert_eq!(step, Step::Halted);
        assert_eq!(output.text, "HI");
        assert!(output.numbers.is_empty());

        Ok(())
    }

    #[test]
    fn test_countdown_program() -> Result<()> {
        let source = "\
        LDA start
loop    OUT
        SUB one
        BRP loop
        HLT
start   DAT 3
one     DAT 1
";
        let mut program = assemble(source)?;
        let mut cpu = Processor::default();
        let mut output = Capture::default();

        let step = cpu.run(&mut program.memory, &mut NoInput, &mut output);

        assert_eq!(step, Step::Halted);
        assert_eq!(output.numbers, [3, 2, 1, 0]);

        Ok(())
    }

    #[test]
    fn test_sta_writes_through_to_memory() -> Result<()> {
        let mut program = assemble("INP\nSTA 30\nINP\nADD 30\nOUT\nHLT")?;
        let mut cpu = Processor::default();
        let mut input = Fifo::new([19, 23]);
        let mut output = Capture::default();

        let step = cpu.run(&mut program.memory, &mut input, &mut output);

        assert_eq!(step, Step::Halted);
        assert_eq!(program.memory.get(30), 19);
        assert_eq!(output.numbers, [42]);

        Ok(())
    }
}
