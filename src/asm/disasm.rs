//! Disassembler for T3 programs.
//!
//! Converts encoded words back to assembly the assembler accepts.

use crate::ternary::Word;
use crate::tvm::decode::{decode, mode, Instruction, Opcode};
use crate::tvm::registers::Registers;

/// Disassemble a single word to text.
pub fn disassemble_instruction(word: Word) -> String {
    match decode(word) {
        Ok(decoded) => format_instruction(&decoded),
        Err(_) => format!(".word {}", word.to_i64()),
    }
}

/// Disassemble a slice of words, one line per address.
pub fn disassemble(words: &[Word]) -> String {
    let mut output = String::new();
    output.push_str("; T3 Disassembly\n");
    output.push_str("; ---------------\n\n");

    for (addr, word) in words.iter().enumerate() {
        let line = disassemble_instruction(*word);
        output.push_str(&format!("{:04}: {:<24} ; {}\n", addr, line, word));
    }

    output
}

fn r(index: i8) -> String {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < crate::tvm::T3_REGISTER_COUNT)
        .map(Registers::name)
        .unwrap_or_else(|| format!("r?{}", index))
}

fn mem(base: i8, offset: i16) -> String {
    match offset {
        0 => format!("[{}]", r(base)),
        o if o < 0 => format!("[{}-{}]", r(base), -(o as i32)),
        o => format!("[{}+{}]", r(base), o),
    }
}

/// Format a decoded instruction as assembly text.
pub fn format_instruction(instr: &Instruction) -> String {
    let m = instr.opcode.mnemonic();
    let Instruction { op1, op2, op3, imm, .. } = *instr;

    match instr.opcode {
        Opcode::Halt | Opcode::Nop | Opcode::Syscall | Opcode::Iret
        | Opcode::Cli | Opcode::Sti | Opcode::Ret => m.to_string(),

        Opcode::Int | Opcode::Jmp | Opcode::Call => format!("{} {}", m, imm),

        Opcode::Push | Opcode::Pop | Opcode::Rdtsc | Opcode::Tst => format!("{} {}", m, r(op1)),

        Opcode::Jz | Opcode::Jnz | Opcode::Cpuid => format!("{} {}, {}", m, r(op1), imm),

        Opcode::Mov | Opcode::Not | Opcode::Cmp => format!("{} {}, {}", m, r(op1), r(op2)),

        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div
        | Opcode::And | Opcode::Or | Opcode::Xor => format!("{} {}, {}, {}", m, r(op1), r(op2), r(op3)),

        Opcode::Tgate => format!("{} {}, {}, {}, {}", m, r(op1), r(op2), r(op3), imm),

        Opcode::Load => match op3 {
            mode::REGISTER => format!("{} {}, {}", m, r(op1), r(op2)),
            mode::MEMORY => format!("{} {}, {}", m, r(op1), mem(op2, imm)),
            _ => format!("{} {}, {}", m, r(op1), imm),
        },

        Opcode::Store => match op3 {
            mode::MEMORY => format!("{} {}, {}", m, r(op1), mem(op2, imm)),
            _ => format!("{} {}, {}", m, r(op1), r(op2)),
        },

        Opcode::Lea => match op3 {
            mode::REGISTER => format!("{} {}, {}, {}", m, r(op1), r(op2), imm),
            _ => format!("{} {}, {}", m, r(op1), imm),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use crate::tvm::decode::encode;

    #[test]
    fn test_disassemble_halt() {
        assert_eq!(disassemble_instruction(Word::zero()), "HALT");
    }

    #[test]
    fn test_disassemble_forms() {
        let cases = [
            (Instruction::rrr(Opcode::Add, 2, 0, 1), "ADD r2, r0, r1"),
            (Instruction::new(Opcode::Load, 2, 14, mode::MEMORY, -1), "LOAD r2, [sp-1]"),
            (Instruction::ri(Opcode::Jz, 12, 7), "JZ cr, 7"),
            (Instruction::new(Opcode::Tgate, 3, 1, 2, 3), "TGATE r3, r1, r2, 3"),
        ];
        for (instr, text) in cases {
            assert_eq!(disassemble_instruction(encode(&instr)), text);
        }
    }

    #[test]
    fn test_output_reassembles() {
        let source = "LEA r1, r3, -2\nSTORE r2, [r1+4]\nLOAD r5, r6\nCALL 0\nRET\nHALT";
        let words = assemble(source).unwrap();
        let text: Vec<String> = words.iter().map(|w| disassemble_instruction(*w)).collect();
        assert_eq!(assemble(&text.join("\n")).unwrap(), words);
    }
}
