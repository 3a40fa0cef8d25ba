use std::convert::TryFrom;
use std::fmt;

use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;

use crate::memory::Word;

/// How many operands an instruction takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// The full three-digit code is the instruction.
    Zero,
    /// The last two digits address a mailbox.
    One,
    /// An operand may be given; 0 is assumed otherwise.
    Optional,
}

macro_rules! opcodes {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $code:literal, $mnemonic:literal $( | $alias:literal )* => $arity:ident , )+ ) => {
        /// Executable instruction codes.
        ///
        /// The discriminant is the stored opcode: the hundreds digit for
        /// operand-taking instructions, the full value otherwise.
        #[repr(u16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Opcode {
            $(
                $( #[doc = $doc] )+
                $name = $code,
            )+
        }

        impl Opcode {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            /// The canonical mnemonic.
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $( Self::$name => $mnemonic , )+
                }
            }

            /// Alternate spellings accepted by the assembler.
            pub fn aliases(&self) -> &'static [&'static str] {
                match self {
                    $( Self::$name => &[ $( $alias , )* ] , )+
                }
            }

            pub fn arity(&self) -> Arity {
                match self {
                    $( Self::$name => Arity::$arity , )+
                }
            }
        }

        impl fmt::Display for Opcode {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.mnemonic())
            }
        }
    }
}

opcodes! {
    /// Stop execution; the counter stays on the halting cell
    HLT = 0, "HLT" | "COB" => Zero,
    /// Add a mailbox to the accumulator
    ADD = 100, "ADD" => One,
    /// Subtract a mailbox from the accumulator
    SUB = 200, "SUB" => One,
    /// Store the accumulator into a mailbox
    STA = 300, "STA" | "STO" => One,
    /// Load a mailbox into the accumulator
    LDA = 500, "LDA" => One,
    /// Jump unconditionally
    BRA = 600, "BRA" | "BR" => One,
    /// Jump if the accumulator is zero
    BRZ = 700, "BRZ" => One,
    /// Jump if the negative flag is clear
    BRP = 800, "BRP" => One,
    /// Read the next input value into the accumulator
    INP = 901, "INP" => Zero,
    /// Emit the accumulator as a number
    OUT = 902, "OUT" => Zero,
    /// Emit the accumulator as a character code
    OTC = 922, "OTC" => Zero,
}

/// What a source mnemonic stands for: an executable instruction, or the
/// `DAT` pseudo-instruction that stores its operand verbatim and has no
/// opcode of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Op(Opcode),
    Data,
}

impl Mnemonic {
    /// Resolves a source token to a mnemonic, case-insensitively, trying
    /// canonical names and aliases.
    pub fn lookup(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("DAT") {
            return Some(Self::Data);
        }

        Opcode::ALL
            .iter()
            .find(|opcode| {
                opcode.mnemonic().eq_ignore_ascii_case(token)
                    || opcode
                        .aliases()
                        .iter()
                        .any(|alias| alias.eq_ignore_ascii_case(token))
            })
            .copied()
            .map(Self::Op)
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::Op(opcode) => opcode.arity(),
            Self::Data => Arity::Optional,
        }
    }

    /// The stored value with `operand` folded in.
    pub fn encode(&self, operand: Word) -> Word {
        match self {
            Self::Op(opcode) => Word::from(*opcode) + operand,
            Self::Data => operand,
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Op(opcode) => opcode.fmt(f),
            Self::Data => f.write_str("DAT"),
        }
    }
}

/// Decodes a stored value into an executable instruction and its operand.
///
/// The hundreds group (value minus its last two digits) selects an
/// operand-taking instruction; failing that, the full three-digit value
/// must name a zero-operand instruction. Everything else is invalid.
pub fn decode(value: Word) -> Option<(Opcode, Word)> {
    let group = value - value % 100;
    if let Ok(opcode) = Opcode::try_from(group) {
        if opcode.arity() == Arity::One {
            return Some((opcode, value % 100));
        }
    }

    match Opcode::try_from(value) {
        Ok(opcode) if opcode.arity() == Arity::Zero => Some((opcode, 0)),
        _ => None,
    }
}
