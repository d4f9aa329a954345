//! Church encodings.
//!
//! Every constructor returns a fresh owned term.

use crate::lambda::term::{create_abs, create_app, create_var, Term, TermRef};

fn v(i: u32) -> TermRef {
    create_var(i)
}

fn ap(f: TermRef, a: TermRef) -> TermRef {
    create_app(&f, &a)
}

// ==================== Numerals ====================

/// `λf. λx. f^n x`, built directly in normal form. It is α-equivalent to
/// the result of reducing `SUCC^n ZERO`.
pub fn numeral(n: u32) -> TermRef {
    let body = (0..n).fold(v(0), |acc, _| ap(v(1), acc));
    Term::abs_n(2, body)
}

pub fn zero() -> TermRef {
    numeral(0)
}

pub fn one() -> TermRef {
    numeral(1)
}

pub fn two() -> TermRef {
    numeral(2)
}

/// `λn. λf. λx. f (n f x)`
pub fn succ() -> TermRef {
    Term::abs_n(3, ap(v(1), ap(ap(v(2), v(1)), v(0))))
}

/// `λm. λn. λf. λx. m f (n f x)`
pub fn add() -> TermRef {
    Term::abs_n(4, ap(ap(v(3), v(1)), ap(ap(v(2), v(1)), v(0))))
}

/// `λm. λn. λf. m (n f)`
pub fn mul() -> TermRef {
    Term::abs_n(3, ap(v(2), ap(v(1), v(0))))
}

/// Decode `λf. λx. f (f (... x))` into its count.
pub fn as_numeral(t: &Term) -> Option<u32> {
    let Term::Abs(outer) = t else { return None };
    let Term::Abs(body) = &**outer else { return None };
    let mut n = 0;
    let mut cur: &Term = body;
    loop {
        match cur {
            Term::Var(0) => return Some(n),
            Term::App(f, a) if **f == Term::Var(1) => {
                n += 1;
                cur = a;
            }
            _ => return None,
        }
    }
}

// ==================== Booleans ====================

/// `λt. λf. t`
pub fn church_true() -> TermRef {
    Term::abs_n(2, v(1))
}

/// `λt. λf. f`
pub fn church_false() -> TermRef {
    Term::abs_n(2, v(0))
}

pub fn boolean(b: bool) -> TermRef {
    if b { church_true() } else { church_false() }
}

/// `λp. λq. p q p`
pub fn and() -> TermRef {
    Term::abs_n(2, ap(ap(v(1), v(0)), v(1)))
}

/// `λp. λq. p p q`
pub fn or() -> TermRef {
    Term::abs_n(2, ap(ap(v(1), v(1)), v(0)))
}

/// `λp. λa. λb. p b a`
pub fn not() -> TermRef {
    Term::abs_n(3, ap(ap(v(2), v(0)), v(1)))
}

pub fn as_boolean(t: &Term) -> Option<bool> {
    let Term::Abs(outer) = t else { return None };
    match &**outer {
        Term::Abs(body) => match **body {
            Term::Var(1) => Some(true),
            Term::Var(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

// ==================== Pairs ====================

/// `λa. λb. λf. f a b`
pub fn pair() -> TermRef {
    Term::abs_n(3, ap(ap(v(0), v(2)), v(1)))
}

/// `λp. p TRUE`
pub fn first() -> TermRef {
    create_abs(&ap(v(0), church_true()))
}

/// `λp. p FALSE`
pub fn second() -> TermRef {
    create_abs(&ap(v(0), church_false()))
}

// ==================== Combinators ====================

/// `λx. x`
pub fn identity() -> TermRef {
    create_abs(&v(0))
}

/// `(λx. x x) (λx. x x)`, which has no normal form.
pub fn omega() -> TermRef {
    let half = create_abs(&ap(v(0), v(0)));
    create_app(&half, &half)
}
