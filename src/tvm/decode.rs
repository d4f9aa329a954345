//! T3 instruction model and decoder.
//!
//! Every instruction occupies one 27-trit memory word:
//!
//! ```text
//! trits  0..=3   opcode      (4 trits, -40..=40)
//! trits  4..=7   op1         (4 trits)
//! trits  8..=11  op2         (4 trits)
//! trits 12..=15  op3         (4 trits)
//! trits 16..=26  immediate   (11 trits, holds any i16)
//! ```
//!
//! The all-zero word decodes to `HALT`, so execution that runs off the end
//! of a program into zeroed memory stops cleanly.

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::ternary::{Trit, TritWord, Word};

const OPCODE_AT: usize = 0;
const OP1_AT: usize = 4;
const OP2_AT: usize = 8;
const OP3_AT: usize = 12;
const IMM_AT: usize = 16;
const FIELD_WIDTH: usize = 4;
const IMM_WIDTH: usize = 11;

/// Operand-mode values carried in `op3` by the two-operand data movement opcodes.
pub mod mode {
    /// `LOAD rD, imm` / `STORE rS, rD` / `LEA rD, imm`
    pub const PLAIN: i8 = 0;
    /// `LOAD rD, rS` / `LEA rD, rB, imm`
    pub const REGISTER: i8 = 1;
    /// `LOAD rD, [rB + imm]` / `STORE rS, [rB + imm]`
    pub const MEMORY: i8 = 2;
}

/// T3 opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // System
    Halt,
    Nop,
    Syscall,
    Iret,
    Cli,
    Sti,
    Int,
    // Data movement
    Load,
    Store,
    Mov,
    Lea,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    // Logic
    And,
    Or,
    Not,
    Xor,
    // Comparison
    Cmp,
    Tst,
    // Control flow
    Jmp,
    Jz,
    Jnz,
    Call,
    Ret,
    // Stack
    Push,
    Pop,
    // Introspection
    Cpuid,
    Rdtsc,
    // Ternary gate
    Tgate,
}

impl Opcode {
    /// Every opcode, in code order.
    pub const ALL: [Opcode; 31] = [
        Opcode::Halt, Opcode::Nop, Opcode::Syscall, Opcode::Iret, Opcode::Cli,
        Opcode::Sti, Opcode::Int, Opcode::Load, Opcode::Store, Opcode::Mov,
        Opcode::Lea, Opcode::Add, Opcode::Sub, Opcode::Mul, Opcode::Div,
        Opcode::And, Opcode::Or, Opcode::Not, Opcode::Xor, Opcode::Cmp,
        Opcode::Tst, Opcode::Jmp, Opcode::Jz, Opcode::Jnz, Opcode::Call,
        Opcode::Ret, Opcode::Push, Opcode::Pop, Opcode::Cpuid, Opcode::Rdtsc,
        Opcode::Tgate,
    ];

    /// Numeric code stored in the opcode field.
    pub fn code(self) -> i8 {
        // ALL is in code order and has fewer than 40 entries
        Self::ALL.iter().position(|&op| op == self).unwrap_or(0) as i8
    }

    /// Opcode for a numeric code.
    pub fn from_code(code: i8) -> Option<Opcode> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Stable mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Halt => "HALT",
            Opcode::Nop => "NOP",
            Opcode::Syscall => "SYSCALL",
            Opcode::Iret => "IRET",
            Opcode::Cli => "CLI",
            Opcode::Sti => "STI",
            Opcode::Int => "INT",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Mov => "MOV",
            Opcode::Lea => "LEA",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Not => "NOT",
            Opcode::Xor => "XOR",
            Opcode::Cmp => "CMP",
            Opcode::Tst => "TST",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Cpuid => "CPUID",
            Opcode::Rdtsc => "RDTSC",
            Opcode::Tgate => "TGATE",
        }
    }

    /// Look up an opcode by mnemonic (case-insensitive).
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        let upper = name.to_ascii_uppercase();
        Self::ALL.iter().copied().find(|op| op.mnemonic() == upper)
    }

    /// Opcodes that may write PC themselves.
    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Jz | Opcode::Jnz | Opcode::Call | Opcode::Ret | Opcode::Iret
        )
    }

    /// Opcodes consulted by the branch predictor.
    pub fn is_conditional_branch(self) -> bool {
        matches!(self, Opcode::Jz | Opcode::Jnz)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A decoded T3 instruction.
///
/// Register fields are kept as decoded; whether they name a real register
/// is checked when the instruction executes. There is no `valid` flag:
/// a word that does not decode yields a [`DecodeError`] instead of an
/// `Instruction`, so every value of this type is a valid instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub op1: i8,
    pub op2: i8,
    pub op3: i8,
    pub imm: i16,
}

impl Instruction {
    pub const fn new(opcode: Opcode, op1: i8, op2: i8, op3: i8, imm: i16) -> Self {
        Self { opcode, op1, op2, op3, imm }
    }

    /// An instruction with no operands.
    pub const fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, 0, 0, 0, 0)
    }

    pub const fn halt() -> Self {
        Self::bare(Opcode::Halt)
    }

    /// `LOAD rD, imm`
    pub const fn load_imm(rd: u8, imm: i16) -> Self {
        Self::new(Opcode::Load, rd as i8, 0, mode::PLAIN, imm)
    }

    /// `LEA rD, imm`
    pub const fn lea(rd: u8, imm: i16) -> Self {
        Self::new(Opcode::Lea, rd as i8, 0, mode::PLAIN, imm)
    }

    /// Three-register form: `OP rD, rA, rB`.
    pub const fn rrr(opcode: Opcode, rd: u8, ra: u8, rb: u8) -> Self {
        Self::new(opcode, rd as i8, ra as i8, rb as i8, 0)
    }

    /// Register-plus-immediate form: `OP rA, imm`.
    pub const fn ri(opcode: Opcode, ra: u8, imm: i16) -> Self {
        Self::new(opcode, ra as i8, 0, 0, imm)
    }

    /// Immediate-only form: `OP imm`.
    pub const fn imm(opcode: Opcode, imm: i16) -> Self {
        Self::new(opcode, 0, 0, 0, imm)
    }

    /// Single-register form: `OP rA`.
    pub const fn r(opcode: Opcode, ra: u8) -> Self {
        Self::new(opcode, ra as i8, 0, 0, 0)
    }
}

fn put_field<const K: usize>(trits: &mut [Trit; Word::WIDTH], at: usize, value: i64) {
    // Callers pass values that fit K trits
    let field = TritWord::<K>::from_i64_saturating(value);
    trits[at..at + K].copy_from_slice(field.trits());
}

fn get_field(trits: &[Trit; Word::WIDTH], at: usize, width: usize) -> i64 {
    trits[at..at + width]
        .iter()
        .rev()
        .fold(0i64, |acc, t| acc * 3 + t.to_i8().unwrap_or(0) as i64)
}

/// Encode an instruction into a memory word.
pub fn encode(instr: &Instruction) -> Word {
    let mut trits = [Trit::O; Word::WIDTH];
    put_field::<FIELD_WIDTH>(&mut trits, OPCODE_AT, instr.opcode.code() as i64);
    put_field::<FIELD_WIDTH>(&mut trits, OP1_AT, instr.op1 as i64);
    put_field::<FIELD_WIDTH>(&mut trits, OP2_AT, instr.op2 as i64);
    put_field::<FIELD_WIDTH>(&mut trits, OP3_AT, instr.op3 as i64);
    put_field::<IMM_WIDTH>(&mut trits, IMM_AT, instr.imm as i64);
    // Every trit was produced from a valid field
    Word::from_trits(trits).unwrap_or_default()
}

/// Decode a memory word into an instruction.
pub fn decode(word: Word) -> Result<Instruction, DecodeError> {
    let trits = word.trits();
    let code = get_field(trits, OPCODE_AT, FIELD_WIDTH) as i8;
    let opcode = Opcode::from_code(code).ok_or(DecodeError::InvalidOpcode(code))?;

    let imm_val = get_field(trits, IMM_AT, IMM_WIDTH);
    let imm = i16::try_from(imm_val).map_err(|_| DecodeError::ImmediateOutOfRange(imm_val))?;

    Ok(Instruction {
        opcode,
        op1: get_field(trits, OP1_AT, FIELD_WIDTH) as i8,
        op2: get_field(trits, OP2_AT, FIELD_WIDTH) as i8,
        op3: get_field(trits, OP3_AT, FIELD_WIDTH) as i8,
        imm,
    })
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode: {0}")]
    InvalidOpcode(i8),

    #[error("immediate {0} does not fit in 16 bits")]
    ImmediateOutOfRange(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_word_is_halt() {
        assert_eq!(decode(Word::zero()), Ok(Instruction::halt()));
    }

    #[test]
    fn test_opcode_codes_are_dense() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(op.code() as usize, i);
            assert_eq!(Opcode::from_code(op.code()), Some(*op));
            assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(*op));
        }
        assert_eq!(Opcode::from_mnemonic("tgate"), Some(Opcode::Tgate));
    }

    #[test]
    fn test_encode_decode_extremes() {
        let cases = [
            Instruction::new(Opcode::Tgate, 15, -40, 40, i16::MIN),
            Instruction::new(Opcode::Jmp, 0, 0, 0, i16::MAX),
            Instruction::rrr(Opcode::Add, 2, 0, 1),
            Instruction::load_imm(0, 1),
        ];
        for instr in cases {
            assert_eq!(decode(encode(&instr)), Ok(instr));
        }
    }

    #[test]
    fn test_decode_rejects_unknown_opcode() {
        let mut word = Word::zero();
        // opcode field = 40 (all P)
        for i in 0..FIELD_WIDTH {
            word.set(i, Trit::P);
        }
        assert_eq!(decode(word), Err(DecodeError::InvalidOpcode(40)));
    }

    #[test]
    fn test_decode_rejects_wide_immediate() {
        let mut word = encode(&Instruction::bare(Opcode::Nop));
        for i in IMM_AT..Word::WIDTH {
            word.set(i, Trit::P);
        }
        assert!(matches!(decode(word), Err(DecodeError::ImmediateOutOfRange(88573))));
    }

    #[test]
    fn test_control_flow_classes() {
        assert!(Opcode::Jz.is_conditional_branch());
        assert!(Opcode::Jz.is_control_flow());
        assert!(Opcode::Ret.is_control_flow());
        assert!(!Opcode::Syscall.is_control_flow());
    }
}
