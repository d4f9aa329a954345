//! Single balanced ternary digit (trit).
//!
//! A trit holds one of three values: -1, 0, or +1, plus an `X` carrier for
//! results that have no balanced value. We use a 2-bit Binary-Coded
//! Ternary (BCT) encoding:
//! - `0b00` = 0 (Zero)
//! - `0b01` = +1 (Positive)
//! - `0b10` = -1 (Negative)
//! - `0b11` = Invalid
//!
//! Every operation here is total. If any input is `X` the output is `X`.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A single balanced ternary digit.
///
/// Represented internally using 2-bit BCT encoding for efficient
/// bitwise operations while maintaining the balanced ternary semantics.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Trit {
    /// Negative (-1)
    N = 0b10,
    /// Zero (0)
    O = 0b00,
    /// Positive (+1)
    P = 0b01,
    /// Invalid: no balanced value
    X = 0b11,
}

/// Which way a saturating operation clipped its host result.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Saturation {
    /// The host result was already in {-1, 0, +1}.
    #[default]
    Exact,
    /// The host result exceeded +1.
    Overflow,
    /// The host result was below -1.
    Underflow,
}

impl Trit {
    /// All valid trit values in order: N, O, P
    pub const ALL: [Trit; 3] = [Trit::N, Trit::O, Trit::P];

    /// Every carrier value, including `X`.
    pub const EVERY: [Trit; 4] = [Trit::N, Trit::O, Trit::P, Trit::X];

    /// Create a trit from a raw BCT byte. Only the low two bits are used.
    #[inline]
    pub const fn from_bct(byte: u8) -> Self {
        match byte & 0b11 {
            0b00 => Trit::O,
            0b01 => Trit::P,
            0b10 => Trit::N,
            _ => Trit::X,
        }
    }

    /// Get the raw BCT byte representation.
    #[inline]
    pub const fn to_bct(self) -> u8 {
        self as u8
    }

    /// Create a trit from an integer value, `X` if outside {-1, 0, 1}.
    #[inline]
    pub const fn from_i8(value: i8) -> Self {
        match value {
            -1 => Trit::N,
            0 => Trit::O,
            1 => Trit::P,
            _ => Trit::X,
        }
    }

    /// Convert to integer value. `None` for `X`.
    #[inline]
    pub const fn to_i8(self) -> Option<i8> {
        match self {
            Trit::N => Some(-1),
            Trit::O => Some(0),
            Trit::P => Some(1),
            Trit::X => None,
        }
    }

    /// Clamp a host integer into a trit, reporting which way it clipped.
    #[inline]
    pub const fn saturate(value: i64) -> (Self, Saturation) {
        if value > 1 {
            (Trit::P, Saturation::Overflow)
        } else if value < -1 {
            (Trit::N, Saturation::Underflow)
        } else if value == 1 {
            (Trit::P, Saturation::Exact)
        } else if value == -1 {
            (Trit::N, Saturation::Exact)
        } else {
            (Trit::O, Saturation::Exact)
        }
    }

    /// The sign of a host integer as a trit.
    #[inline]
    pub const fn signum(value: i64) -> Self {
        Trit::saturate(value).0
    }

    /// True unless this is `X`.
    #[inline]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Trit::X)
    }

    /// Negate the trit (flip N ↔ P, O stays O).
    #[inline]
    pub const fn neg(self) -> Self {
        match self {
            Trit::N => Trit::P,
            Trit::O => Trit::O,
            Trit::P => Trit::N,
            Trit::X => Trit::X,
        }
    }

    /// Ternary NOT. Same as negation.
    #[inline]
    pub const fn not(self) -> Self {
        self.neg()
    }

    /// Minimum (ternary AND) - returns the lesser value.
    #[inline]
    pub const fn min(self, other: Self) -> Self {
        match (self.to_i8(), other.to_i8()) {
            (Some(a), Some(b)) if a <= b => self,
            (Some(_), Some(_)) => other,
            _ => Trit::X,
        }
    }

    /// Maximum (ternary OR) - returns the greater value.
    #[inline]
    pub const fn max(self, other: Self) -> Self {
        match (self.to_i8(), other.to_i8()) {
            (Some(a), Some(b)) if a >= b => self,
            (Some(_), Some(_)) => other,
            _ => Trit::X,
        }
    }

    /// Ternary XOR: equal inputs give O, differing inputs give P.
    #[inline]
    pub const fn xor(self, other: Self) -> Self {
        match (self.to_i8(), other.to_i8()) {
            (Some(a), Some(b)) if a == b => Trit::O,
            (Some(_), Some(_)) => Trit::P,
            _ => Trit::X,
        }
    }

    /// Consensus - returns the value if both inputs match, else O.
    #[inline]
    pub const fn consensus(self, other: Self) -> Self {
        match (self, other) {
            (Trit::X, _) | (_, Trit::X) => Trit::X,
            (Trit::P, Trit::P) => Trit::P,
            (Trit::N, Trit::N) => Trit::N,
            _ => Trit::O,
        }
    }

    /// Any (gullibility) - accepts any non-zero input, prefers first.
    /// Used in carry chain combination.
    #[inline]
    pub const fn any(self, other: Self) -> Self {
        match (self, other) {
            (Trit::X, _) | (_, Trit::X) => Trit::X,
            (Trit::O, _) => other,
            _ => self,
        }
    }

    /// Saturating addition.
    #[inline]
    pub const fn add(self, other: Self) -> Self {
        self.add_sat(other).0
    }

    /// Saturating addition, also reporting saturation.
    #[inline]
    pub const fn add_sat(self, other: Self) -> (Self, Saturation) {
        match (self.to_i8(), other.to_i8()) {
            (Some(a), Some(b)) => Trit::saturate(a as i64 + b as i64),
            _ => (Trit::X, Saturation::Exact),
        }
    }

    /// Saturating subtraction.
    #[inline]
    pub const fn sub(self, other: Self) -> Self {
        self.sub_sat(other).0
    }

    /// Saturating subtraction, also reporting saturation.
    #[inline]
    pub const fn sub_sat(self, other: Self) -> (Self, Saturation) {
        match (self.to_i8(), other.to_i8()) {
            (Some(a), Some(b)) => Trit::saturate(a as i64 - b as i64),
            _ => (Trit::X, Saturation::Exact),
        }
    }

    /// Single-trit multiplication (never carries, never saturates).
    #[inline]
    pub const fn mul(self, other: Self) -> Self {
        match (self, other) {
            (Trit::X, _) | (_, Trit::X) => Trit::X,
            (Trit::O, _) | (_, Trit::O) => Trit::O,
            (Trit::P, Trit::P) | (Trit::N, Trit::N) => Trit::P,
            (Trit::P, Trit::N) | (Trit::N, Trit::P) => Trit::N,
        }
    }

    /// Truncating division. Division by O is `X`.
    #[inline]
    pub const fn div(self, other: Self) -> Self {
        match (self.to_i8(), other.to_i8()) {
            (Some(_), Some(0)) => Trit::X,
            (Some(a), Some(b)) => Trit::from_i8(a / b),
            _ => Trit::X,
        }
    }

    /// Multiply by 3^n and saturate.
    #[inline]
    pub const fn shift_left(self, n: u32) -> (Self, Saturation) {
        match self.to_i8() {
            None => (Trit::X, Saturation::Exact),
            Some(v) if n == 0 || v == 0 => (self, Saturation::Exact),
            Some(v) if v > 0 => (Trit::P, Saturation::Overflow),
            Some(_) => (Trit::N, Saturation::Underflow),
        }
    }

    /// Divide by 3^n, truncating toward zero.
    #[inline]
    pub const fn shift_right(self, n: u32) -> Self {
        match self {
            Trit::X => Trit::X,
            _ if n == 0 => self,
            _ => Trit::O,
        }
    }

    /// Equality as a trit: P for true, O for false.
    #[inline]
    pub const fn eq_t(self, other: Self) -> Self {
        match (self.to_i8(), other.to_i8()) {
            (Some(a), Some(b)) => Trit::from_bool(a == b),
            _ => Trit::X,
        }
    }

    /// Greater-than as a trit: P for true, O for false.
    #[inline]
    pub const fn gt_t(self, other: Self) -> Self {
        match (self.to_i8(), other.to_i8()) {
            (Some(a), Some(b)) => Trit::from_bool(a > b),
            _ => Trit::X,
        }
    }

    /// Less-than as a trit: P for true, O for false.
    #[inline]
    pub const fn lt_t(self, other: Self) -> Self {
        match (self.to_i8(), other.to_i8()) {
            (Some(a), Some(b)) => Trit::from_bool(a < b),
            _ => Trit::X,
        }
    }

    /// Truth as a trit: P or O.
    #[inline]
    pub const fn from_bool(b: bool) -> Self {
        if b { Trit::P } else { Trit::O }
    }

    /// Half-adder sum: (a + b) mod 3, normalized to {-1, 0, 1}.
    #[inline]
    pub const fn sum(self, other: Self) -> Self {
        match (self.to_i8(), other.to_i8()) {
            (Some(a), Some(b)) => match a + b {
                -2 => Trit::P,   // -2 → +1 (wrap)
                2 => Trit::N,    // +2 → -1 (wrap)
                t => Trit::from_i8(t),
            },
            _ => Trit::X,
        }
    }

    /// Half-adder carry: carry output when adding two trits.
    #[inline]
    pub const fn carry(self, other: Self) -> Self {
        match (self.to_i8(), other.to_i8()) {
            (Some(a), Some(b)) => match a + b {
                -2 => Trit::N,   // Borrow
                2 => Trit::P,    // Carry
                _ => Trit::O,
            },
            _ => Trit::X,
        }
    }

    /// Full adder: adds three trits (a, b, c_in), returns (sum, carry_out).
    #[inline]
    pub const fn full_add(self, other: Self, carry_in: Self) -> (Self, Self) {
        let s1 = self.sum(other);
        let c1 = self.carry(other);

        let sum = s1.sum(carry_in);
        let c2 = s1.carry(carry_in);

        // The two carries can't both be non-zero
        let carry_out = c1.any(c2);

        (sum, carry_out)
    }

    /// Returns true if this trit is zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        matches!(self, Trit::O)
    }

    /// Returns true if this trit is positive.
    #[inline]
    pub const fn is_positive(self) -> bool {
        matches!(self, Trit::P)
    }

    /// Returns true if this trit is negative.
    #[inline]
    pub const fn is_negative(self) -> bool {
        matches!(self, Trit::N)
    }
}

impl Default for Trit {
    fn default() -> Self {
        Trit::O
    }
}

impl fmt::Debug for Trit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trit::N => write!(f, "N"),
            Trit::O => write!(f, "O"),
            Trit::P => write!(f, "P"),
            Trit::X => write!(f, "X"),
        }
    }
}

impl fmt::Display for Trit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trit::N => write!(f, "-"),
            Trit::O => write!(f, "0"),
            Trit::P => write!(f, "+"),
            Trit::X => write!(f, "?"),
        }
    }
}

impl std::ops::Neg for Trit {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Trit::neg(self)
    }
}

impl From<i8> for Trit {
    fn from(value: i8) -> Self {
        Trit::from_i8(value)
    }
}

impl From<bool> for Trit {
    fn from(value: bool) -> Self {
        Trit::from_bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_trit() -> impl Strategy<Value = Trit> {
        prop::sample::select(Trit::EVERY.to_vec())
    }

    #[test]
    fn test_negation_involution() {
        for t in Trit::EVERY {
            assert_eq!(t.not().not(), t, "not(not({:?})) should equal {:?}", t, t);
        }
    }

    #[test]
    fn test_saturating_add() {
        assert_eq!(Trit::P.add_sat(Trit::P), (Trit::P, Saturation::Overflow));
        assert_eq!(Trit::P.add_sat(Trit::N), (Trit::O, Saturation::Exact));
        assert_eq!(Trit::N.add_sat(Trit::N), (Trit::N, Saturation::Underflow));
        assert_eq!(Trit::N.sub_sat(Trit::P), (Trit::N, Saturation::Underflow));
    }

    #[test]
    fn test_division() {
        assert_eq!(Trit::P.div(Trit::N), Trit::N);
        assert_eq!(Trit::O.div(Trit::P), Trit::O);
        assert_eq!(Trit::P.div(Trit::O), Trit::X);
    }

    #[test]
    fn test_multiplication_table() {
        assert_eq!(Trit::N.mul(Trit::N), Trit::P);
        assert_eq!(Trit::N.mul(Trit::O), Trit::O);
        assert_eq!(Trit::N.mul(Trit::P), Trit::N);
        assert_eq!(Trit::P.mul(Trit::P), Trit::P);
        assert_eq!(Trit::X.mul(Trit::O), Trit::X);
    }

    #[test]
    fn test_comparisons_never_negative() {
        for a in Trit::ALL {
            for b in Trit::ALL {
                for r in [a.eq_t(b), a.gt_t(b), a.lt_t(b)] {
                    assert_ne!(r, Trit::N);
                }
            }
        }
        assert_eq!(Trit::N.lt_t(Trit::P), Trit::P);
        assert_eq!(Trit::O.eq_t(Trit::X), Trit::X);
    }

    #[test]
    fn test_shifts() {
        assert_eq!(Trit::P.shift_left(0), (Trit::P, Saturation::Exact));
        assert_eq!(Trit::P.shift_left(2), (Trit::P, Saturation::Overflow));
        assert_eq!(Trit::N.shift_left(1), (Trit::N, Saturation::Underflow));
        assert_eq!(Trit::O.shift_left(5), (Trit::O, Saturation::Exact));
        assert_eq!(Trit::N.shift_right(1), Trit::O);
        assert_eq!(Trit::N.shift_right(0), Trit::N);
    }

    #[test]
    fn test_full_adder() {
        assert_eq!(Trit::O.full_add(Trit::O, Trit::O), (Trit::O, Trit::O));
        // 1 + 1 + 0 = -1, carry 1 (2 = -1 + 3)
        assert_eq!(Trit::P.full_add(Trit::P, Trit::O), (Trit::N, Trit::P));
        // 1 + 1 + 1 = 0, carry 1 (3 = 0 + 3)
        assert_eq!(Trit::P.full_add(Trit::P, Trit::P), (Trit::O, Trit::P));
        // -1 + -1 + -1 = 0, carry -1 (-3 = 0 - 3)
        assert_eq!(Trit::N.full_add(Trit::N, Trit::N), (Trit::O, Trit::N));
    }

    #[test]
    fn test_bct_roundtrip() {
        for t in Trit::EVERY {
            assert_eq!(Trit::from_bct(t.to_bct()), t);
        }
    }

    proptest! {
        #[test]
        fn prop_totality_and_propagation(a in any_trit(), b in any_trit()) {
            let results = [
                a.add(b), a.sub(b), a.mul(b), a.div(b), a.min(b), a.max(b),
                a.xor(b), a.eq_t(b), a.gt_t(b), a.lt_t(b), a.not(),
            ];
            for r in results {
                prop_assert!(Trit::EVERY.contains(&r));
                if a == Trit::X || b == Trit::X {
                    prop_assert_eq!(r, Trit::X);
                }
            }
        }

        #[test]
        fn prop_identities(x in any_trit()) {
            prop_assert_eq!(x.not().not(), x);
            prop_assert_eq!(x.min(Trit::P), x);
            prop_assert_eq!(x.max(Trit::N), x);
            prop_assert_eq!(x.add(Trit::O), x);
            prop_assert_eq!(x.mul(Trit::P), x);
            if x.is_valid() {
                prop_assert_eq!(x.mul(Trit::O), Trit::O);
                prop_assert_eq!(x.min(x), x);
                prop_assert_eq!(x.max(x), x);
            }
        }

        #[test]
        fn prop_lattice_laws(a in any_trit(), b in any_trit(), c in any_trit()) {
            prop_assert_eq!(a.min(b), b.min(a));
            prop_assert_eq!(a.max(b), b.max(a));
            prop_assert_eq!(a.min(b).min(c), a.min(b.min(c)));
            prop_assert_eq!(a.max(b).max(c), a.max(b.max(c)));
            prop_assert_eq!(a.add(b), b.add(a));
            prop_assert_eq!(a.mul(b), b.mul(a));
        }
    }
}
