//! Two-pass assembler for T3 programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//! start:                  ; Define a label
//!     LEA   r1, 5         ; r1 <- 5
//!     LOAD  r2, [r1+3]    ; r2 <- mem[r1 + 3]
//!     STORE r2, [sp-1]    ; mem[sp - 1] <- r2
//!     ADD   r3, r1, r2    ; r3 <- trit(r1) + trit(r2)
//!     JZ    cr, start     ; branch on a zero register
//!     TGATE r3, r1, r2, 3 ; consensus gate
//!     HALT
//!
//!     .org 50             ; Set origin address
//!     .word 42            ; Define a data word
//! ```
//!
//! Immediates may be decimal, hex (`0x`), balanced ternary (`0tPON`) or a label.

use std::collections::HashMap;
use thiserror::Error;
use crate::ternary::Word;
use crate::tvm::decode::{encode, mode, Instruction, Opcode};
use crate::tvm::registers::Registers;

/// Assemble source code to a memory image starting at word 0.
///
/// Gaps left by `.org` are zero (which decodes as `HALT`).
pub fn assemble(source: &str) -> Result<Vec<Word>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// A statement placed at a fixed address during pass 1.
struct Statement {
    addr: usize,
    line: usize,
    mnemonic: String,
    operands: Vec<String>,
}

/// The assembler state.
struct Assembler {
    /// Current address (origin).
    current_addr: usize,
    /// Symbol table (label -> address).
    symbols: HashMap<String, i64>,
    /// Statements awaiting encoding.
    statements: Vec<Statement>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            current_addr: 0,
            symbols: HashMap::new(),
            statements: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<Word>, AssemblerError> {
        // Pass 1: Collect labels and fix addresses
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: Encode with every label known
        let mut output = vec![Word::zero(); self.current_addr];
        let statements = std::mem::take(&mut self.statements);
        for stmt in &statements {
            output[stmt.addr] = self.encode_statement(stmt)?;
        }

        Ok(output)
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let mut line = match line.find([';', '#']) {
            Some(idx) => line[..idx].trim(),
            None => line.trim(),
        };

        // Leading labels, possibly several
        while let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim();
            if !is_identifier(label) {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("bad label '{}'", label),
                });
            }
            let key = label.to_uppercase();
            if self.symbols.insert(key, self.current_addr as i64).is_some() {
                return Err(AssemblerError::DuplicateLabel { line: line_num, label: label.to_string() });
            }
            line = line[colon_idx + 1..].trim();
        }

        if line.is_empty() {
            return Ok(());
        }

        let (mnemonic, rest) = match line.find(char::is_whitespace) {
            Some(idx) => (&line[..idx], line[idx..].trim()),
            None => (line, ""),
        };
        let mnemonic = mnemonic.to_uppercase();
        let operands: Vec<String> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(|s| s.trim().to_string()).collect()
        };

        if mnemonic == ".ORG" {
            let [target] = operands.as_slice() else {
                return Err(AssemblerError::SyntaxError { line: line_num, message: ".org requires an address".into() });
            };
            let addr = parse_number(target)
                .and_then(|a| usize::try_from(a).ok())
                .ok_or_else(|| AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("bad origin '{}'", target),
                })?;
            if addr < self.current_addr {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!(".org {} moves backwards from {}", addr, self.current_addr),
                });
            }
            self.current_addr = addr;
            return Ok(());
        }

        self.statements.push(Statement {
            addr: self.current_addr,
            line: line_num,
            mnemonic,
            operands,
        });
        self.current_addr += 1;
        Ok(())
    }

    fn encode_statement(&self, stmt: &Statement) -> Result<Word, AssemblerError> {
        if stmt.mnemonic == ".WORD" || stmt.mnemonic == ".DAT" {
            let [value] = stmt.operands.as_slice() else {
                return Err(AssemblerError::SyntaxError { line: stmt.line, message: ".word requires a value".into() });
            };
            let value = self.value(value, stmt.line)?;
            return Word::try_from_i64(value)
                .ok_or(AssemblerError::ValueOutOfRange { line: stmt.line, value });
        }

        let opcode = Opcode::from_mnemonic(&stmt.mnemonic).ok_or_else(|| AssemblerError::UnknownMnemonic {
            line: stmt.line,
            mnemonic: stmt.mnemonic.clone(),
        })?;
        let instr = self.parse_instruction(opcode, &stmt.operands, stmt.line)?;
        Ok(encode(&instr))
    }

    fn parse_instruction(&self, opcode: Opcode, ops: &[String], line: usize) -> Result<Instruction, AssemblerError> {
        let arity = |n: usize| -> Result<(), AssemblerError> {
            if ops.len() == n {
                Ok(())
            } else {
                Err(AssemblerError::OperandCount { line, mnemonic: opcode.mnemonic(), expected: n, got: ops.len() })
            }
        };

        let instr = match opcode {
            Opcode::Halt | Opcode::Nop | Opcode::Syscall | Opcode::Iret
            | Opcode::Cli | Opcode::Sti | Opcode::Ret => {
                arity(0)?;
                Instruction::bare(opcode)
            }

            Opcode::Int | Opcode::Jmp | Opcode::Call => {
                arity(1)?;
                Instruction::imm(opcode, self.imm(&ops[0], line)?)
            }

            Opcode::Push | Opcode::Pop | Opcode::Rdtsc | Opcode::Tst => {
                arity(1)?;
                Instruction::r(opcode, reg(&ops[0], line)?)
            }

            Opcode::Jz | Opcode::Jnz | Opcode::Cpuid => {
                arity(2)?;
                Instruction::ri(opcode, reg(&ops[0], line)?, self.imm(&ops[1], line)?)
            }

            Opcode::Mov | Opcode::Not | Opcode::Cmp => {
                arity(2)?;
                Instruction::new(opcode, reg(&ops[0], line)? as i8, reg(&ops[1], line)? as i8, 0, 0)
            }

            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div
            | Opcode::And | Opcode::Or | Opcode::Xor => {
                arity(3)?;
                Instruction::rrr(opcode, reg(&ops[0], line)?, reg(&ops[1], line)?, reg(&ops[2], line)?)
            }

            Opcode::Tgate => {
                arity(4)?;
                Instruction::new(
                    opcode,
                    reg(&ops[0], line)? as i8,
                    reg(&ops[1], line)? as i8,
                    reg(&ops[2], line)? as i8,
                    self.imm(&ops[3], line)?,
                )
            }

            Opcode::Load => {
                arity(2)?;
                let rd = reg(&ops[0], line)? as i8;
                if let Some((base, offset)) = self.memory_operand(&ops[1], line)? {
                    Instruction::new(opcode, rd, base as i8, mode::MEMORY, offset)
                } else if let Some(rs) = Registers::parse_name(&ops[1]) {
                    Instruction::new(opcode, rd, rs as i8, mode::REGISTER, 0)
                } else {
                    Instruction::new(opcode, rd, 0, mode::PLAIN, self.imm(&ops[1], line)?)
                }
            }

            Opcode::Store => {
                arity(2)?;
                let rs = reg(&ops[0], line)? as i8;
                match self.memory_operand(&ops[1], line)? {
                    Some((base, offset)) => Instruction::new(opcode, rs, base as i8, mode::MEMORY, offset),
                    None => Instruction::new(opcode, rs, reg(&ops[1], line)? as i8, mode::PLAIN, 0),
                }
            }

            Opcode::Lea => {
                let rd = reg(ops.first().map(String::as_str).unwrap_or(""), line)? as i8;
                match ops.len() {
                    2 => Instruction::new(opcode, rd, 0, mode::PLAIN, self.imm(&ops[1], line)?),
                    3 => Instruction::new(opcode, rd, reg(&ops[1], line)? as i8, mode::REGISTER, self.imm(&ops[2], line)?),
                    got => return Err(AssemblerError::OperandCount { line, mnemonic: "LEA", expected: 2, got }),
                }
            }
        };

        Ok(instr)
    }

    /// `[rB]`, `[rB+imm]` or `[rB-imm]`; `None` if not bracketed.
    fn memory_operand(&self, operand: &str, line: usize) -> Result<Option<(u8, i16)>, AssemblerError> {
        let Some(inner) = operand.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
            return Ok(None);
        };
        let inner = inner.trim();
        let (base, offset) = match inner.find(['+', '-']) {
            Some(idx) => {
                let offset = self.imm(inner[idx + 1..].trim(), line)?;
                let offset = if inner.as_bytes()[idx] == b'-' { -offset } else { offset };
                (inner[..idx].trim(), offset)
            }
            None => (inner, 0),
        };
        Ok(Some((reg(base, line)?, offset)))
    }

    fn value(&self, operand: &str, line: usize) -> Result<i64, AssemblerError> {
        if let Some(n) = parse_number(operand) {
            return Ok(n);
        }
        if is_identifier(operand) {
            return self.symbols.get(&operand.to_uppercase()).copied().ok_or_else(|| {
                AssemblerError::UndefinedLabel { line, label: operand.to_string() }
            });
        }
        Err(AssemblerError::SyntaxError { line, message: format!("bad operand '{}'", operand) })
    }

    fn imm(&self, operand: &str, line: usize) -> Result<i16, AssemblerError> {
        let value = self.value(operand, line)?;
        i16::try_from(value).map_err(|_| AssemblerError::ValueOutOfRange { line, value })
    }
}

fn reg(operand: &str, line: usize) -> Result<u8, AssemblerError> {
    Registers::parse_name(operand)
        .map(|r| r as u8)
        .ok_or_else(|| AssemblerError::BadRegister { line, operand: operand.to_string() })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Parse a numeric literal: decimal, `0x` hex or `0t` balanced ternary.
fn parse_number(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.starts_with("0t") || digits.starts_with("0T") {
        Word::parse(&digits[2..]).ok()?.to_i64()
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: {mnemonic} takes {expected} operands, got {got}")]
    OperandCount { line: usize, mnemonic: &'static str, expected: usize, got: usize },

    #[error("bad register on line {line}: {operand}")]
    BadRegister { line: usize, operand: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::decode::decode;
    use crate::tvm::registers::CR;

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            ; E2: 1 + 1
            LOAD r0, 1
            LOAD r1, 1
            ADD  r2, r0, r1
            HALT
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(decode(result[2]), Ok(Instruction::rrr(Opcode::Add, 2, 0, 1)));
        assert_eq!(decode(result[3]), Ok(Instruction::halt()));
    }

    #[test]
    fn test_assemble_with_forward_labels() {
        let source = r#"
        start:
            LEA r1, 10
            JMP end
            NOP
        end: HALT
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(decode(result[1]), Ok(Instruction::imm(Opcode::Jmp, 3)));
    }

    #[test]
    fn test_operand_modes() {
        let result = assemble(
            "LOAD r2, [r1+3]\nLOAD r2, [sp-1]\nLOAD r2, r5\nSTORE r2, r6\nLEA r4, r3, -2\nJZ cr, 0",
        )
        .unwrap();
        assert_eq!(decode(result[0]), Ok(Instruction::new(Opcode::Load, 2, 1, mode::MEMORY, 3)));
        assert_eq!(decode(result[1]), Ok(Instruction::new(Opcode::Load, 2, 14, mode::MEMORY, -1)));
        assert_eq!(decode(result[2]), Ok(Instruction::new(Opcode::Load, 2, 5, mode::REGISTER, 0)));
        assert_eq!(decode(result[3]), Ok(Instruction::new(Opcode::Store, 2, 6, mode::PLAIN, 0)));
        assert_eq!(decode(result[4]), Ok(Instruction::new(Opcode::Lea, 4, 3, mode::REGISTER, -2)));
        assert_eq!(decode(result[5]), Ok(Instruction::ri(Opcode::Jz, CR as u8, 0)));
    }

    #[test]
    fn test_assemble_data_and_org() {
        let source = r#"
            .word 42
            .word -0x11
            .org 5
            .word 0tPN
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result.len(), 6);
        assert_eq!(result[0].to_i64(), 42);
        assert_eq!(result[1].to_i64(), -17);
        assert!(result[2].is_zero());
        assert_eq!(result[5].to_i64(), 2);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(assemble("FROB r1"), Err(AssemblerError::UnknownMnemonic { line: 1, .. })));
        assert!(matches!(assemble("JMP nowhere"), Err(AssemblerError::UndefinedLabel { .. })));
        assert!(matches!(assemble("ADD r1, r2"), Err(AssemblerError::OperandCount { expected: 3, got: 2, .. })));
        assert!(matches!(assemble("PUSH r16"), Err(AssemblerError::BadRegister { .. })));
        assert!(matches!(assemble("a:\na: HALT"), Err(AssemblerError::DuplicateLabel { line: 2, .. })));
        assert!(matches!(assemble("LEA r1, 40000"), Err(AssemblerError::ValueOutOfRange { .. })));
    }
}
