//! Lowering closed terms to T3 programs.
//!
//! The program pushes the preorder encoding of the term onto the TVM stack,
//! one word per node:
//!
//! | node     | code    |
//! |----------|---------|
//! | `Var(i)` | `i + 1` |
//! | `Abs`    | `0`     |
//! | `App`    | `-1`    |
//!
//! then leaves the node count in r7 and halts. Running the program and
//! reading the stack back with [`decompile_from_tvm`] gives a term
//! α-equivalent to the input.

use std::rc::Rc;
use crate::asm::image;
use crate::lambda::term::{Term, TermRef};
use crate::lambda::LambdaError;
use crate::ternary::Word;
use crate::tvm::decode::{encode, Instruction, Opcode};
use crate::tvm::registers::R_RESULT;
use crate::tvm::Tvm;

const SCRATCH: u8 = 1;

fn preorder(t: &Term, out: &mut Vec<i64>) {
    match t {
        Term::Var(i) => out.push(*i as i64 + 1),
        Term::Abs(b) => {
            out.push(0);
            preorder(b, out);
        }
        Term::App(f, a) => {
            out.push(-1);
            preorder(f, out);
            preorder(a, out);
        }
    }
}

fn imm(value: i64, len: usize) -> Result<i16, LambdaError> {
    i16::try_from(value).map_err(|_| LambdaError::TermTooLarge(len))
}

/// Lower a closed term into T3 words.
pub fn compile_words(t: &Term) -> Result<Vec<Word>, LambdaError> {
    if !t.is_closed() {
        return Err(LambdaError::NotClosed);
    }
    let mut codes = Vec::new();
    preorder(t, &mut codes);

    let mut program = Vec::with_capacity(codes.len() * 2 + 2);
    for &code in &codes {
        program.push(encode(&Instruction::lea(SCRATCH, imm(code, codes.len())?)));
        program.push(encode(&Instruction::r(Opcode::Push, SCRATCH)));
    }
    program.push(encode(&Instruction::lea(R_RESULT as u8, imm(codes.len() as i64, codes.len())?)));
    program.push(encode(&Instruction::halt()));
    Ok(program)
}

/// Memory a TVM needs to run the compiled program: code plus stack.
pub fn required_memory_words(t: &Term) -> usize {
    let nodes = t.size();
    nodes * 2 + 2 + nodes + 1
}

/// Lower a closed term into a binary image in `buf`. Returns the byte count.
pub fn compile_to_t3(t: &Term, buf: &mut [u8]) -> Result<usize, LambdaError> {
    let words = compile_words(t)?;
    let bytes = image::to_bytes(&words);
    if bytes.len() > buf.len() {
        return Err(LambdaError::Capacity { needed: bytes.len(), available: buf.len() });
    }
    buf[..bytes.len()].copy_from_slice(&bytes);
    Ok(bytes.len())
}

fn rebuild(codes: &mut impl Iterator<Item = i64>) -> Result<TermRef, LambdaError> {
    let code = codes.next().ok_or_else(|| LambdaError::Decompile("stack ended mid-term".into()))?;
    match code {
        c if c > 0 => Ok(Rc::new(Term::Var((c - 1) as u32))),
        0 => Ok(Rc::new(Term::Abs(rebuild(codes)?))),
        -1 => {
            let f = rebuild(codes)?;
            let a = rebuild(codes)?;
            Ok(Rc::new(Term::App(f, a)))
        }
        other => Err(LambdaError::Decompile(format!("bad node code {}", other))),
    }
}

/// Read back the term a compiled program left on the stack.
///
/// `stack_top` is the SP the program started with; r7 holds the node count.
pub fn decompile_from_tvm(vm: &Tvm, stack_top: i64) -> Result<TermRef, LambdaError> {
    if !vm.is_halted() || vm.has_error() {
        return Err(LambdaError::Decompile("program did not halt cleanly".into()));
    }
    let count = vm.regs.value(R_RESULT);
    let mut codes = Vec::new();
    for k in 0..count {
        let addr = usize::try_from(stack_top - k)
            .map_err(|_| LambdaError::Decompile(format!("stack slot {} out of range", stack_top - k)))?;
        let word = vm.mem.read_word(addr).map_err(|e| LambdaError::Decompile(e.to_string()))?;
        codes.push(word.to_i64());
    }
    let mut iter = codes.into_iter();
    let t = rebuild(&mut iter)?;
    if iter.next().is_some() {
        return Err(LambdaError::Decompile("trailing nodes".into()));
    }
    Ok(t)
}
