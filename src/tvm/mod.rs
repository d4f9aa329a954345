//! T3 ternary virtual machine.
//!
//! This module contains:
//! - Trit-addressed memory viewed as 27-trit words
//! - The 16-register file
//! - Instruction encoding/decoding
//! - The direct-mapped instruction cache and branch predictor
//! - The fetch-decode-execute engine

pub mod memory;
pub mod registers;
pub mod decode;
pub mod icache;
pub mod predictor;
pub mod execute;

pub use memory::{TritMemory, MemoryError, WORD_TRITS};
pub use registers::{Registers, T3_REGISTER_COUNT, CR, LR, SP, PC, R_STATUS, R_ARG0, R_RESULT};
pub use decode::{Opcode, Instruction, DecodeError, encode, decode, mode};
pub use icache::ICache;
pub use predictor::{BranchPredictor, PREDICTOR_ENTRIES};
pub use execute::{Tvm, TvmCounters, VmFault, StepEvent, InterruptKind, SyscallHost, HostReply};
