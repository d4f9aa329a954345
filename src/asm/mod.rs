//! Assembler, disassembler and image formats for T3 programs.
//!
//! This module provides:
//! - A two-pass assembler (text → words)
//! - A disassembler (words → readable text)
//! - Text and binary program images

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, AssemblerError};
pub use disasm::{disassemble, disassemble_instruction};
pub use image::{load_image, save_image, ImageError};
