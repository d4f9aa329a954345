//! # tritos
//!
//! An experimental kernel built on balanced ternary.
//!
//! Values are trits (-1, 0, +1). Programs run on the T3 virtual machine,
//! processes are scheduled by priority with round-robin inside a class,
//! and lambda-calculus reduction is exposed as syscalls, so a proof can be
//! checked by reducing it and comparing the result with its theorem.

pub mod ternary;
pub mod tvm;
pub mod asm;
pub mod lambda;
pub mod kernel;
pub mod config;

// Re-export commonly used types
pub use ternary::{Trit, TritWord, Word};
pub use tvm::{Tvm, TvmCounters, VmFault, Instruction, Opcode};
pub use asm::{assemble, disassemble, AssemblerError, load_image, save_image, ImageError};
pub use lambda::{Term, TermRef, LambdaError};
pub use kernel::{Kernel, KernelError, KernelStats, Pid, ProcessState};
pub use config::{KernelConfig, TvmConfig, LambdaConfig, ConfigError};
