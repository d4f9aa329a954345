//! Lambda-calculus engine.
//!
//! De Bruijn terms with shared ownership, normal-order reduction, Church
//! encodings, a text parser, simple type inference and lowering to T3.

pub mod term;
pub mod reduce;
pub mod church;
pub mod parse;
pub mod types;
pub mod compile;

use thiserror::Error;

pub use term::{alpha_equiv, clone_term, create_abs, create_app, create_var, release, Term, TermRef};
pub use reduce::{beta_step, is_normal_form, optimize_term, reduce, reduce_to_normal_form, substitute, ReductionContext};
pub use parse::{parse_term, parse_term_bounded, MAX_PARSE_NESTING};
pub use types::{infer_type, is_well_formed, Type};
pub use compile::{compile_to_t3, compile_words, decompile_from_tvm};

/// Errors from parsing, typing and compiling terms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LambdaError {
    #[error("parse error at byte {pos}: {message}")]
    Parse { pos: usize, message: String },

    #[error("unbound identifier '{0}'")]
    UnboundIdentifier(String),

    #[error("free variable with index {0}")]
    FreeVariable(u32),

    #[error("occurs check failed: term has no simple type")]
    OccursCheck,

    #[error("term is not closed")]
    NotClosed,

    #[error("term with {0} nodes is too large to compile")]
    TermTooLarge(usize),

    #[error("buffer too small: need {needed} bytes, have {available}")]
    Capacity { needed: usize, available: usize },

    #[error("cannot decompile: {0}")]
    Decompile(String),
}
