//! Balanced ternary number system primitives.
//!
//! This module provides the core types for working with balanced ternary:
//! - [`Trit`] - A single balanced ternary digit (-1, 0, +1) or `X`
//! - [`TritWord`] - A fixed-width balanced ternary integer
//! - [`Word`] - The 27-trit kernel word
//! - [`Alu`] - Saturating trit arithmetic with sticky flags

mod trit;
mod word;
mod ops;
pub mod alu;
pub mod arith;

pub use trit::{Trit, Saturation};
pub use word::{TritWord, Word, ParseError};
pub use ops::{TritOps, Gate, gate_eval};
pub use alu::{Alu, AluFlags};
