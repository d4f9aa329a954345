//! Fixed-width balanced ternary words.
//!
//! `TritWord<N>` is an N-trit integer in canonical balanced form: every
//! digit is N, O or P, so there is no negative zero. The kernel word is
//! [`Word`], 27 trits wide, which covers every signed 32-bit host value.
//!
//! Widths up to 39 trits are supported (the value must fit an `i64`).

use std::fmt;
use serde::{Serialize, Deserialize, Serializer, Deserializer};
use serde::de::Error as _;
use thiserror::Error;
use crate::ternary::Trit;

/// An N-trit balanced ternary integer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TritWord<const N: usize> {
    /// Trits stored from least significant (index 0) to most significant (index N-1)
    trits: [Trit; N],
}

/// The 27-trit kernel word used by registers, addresses and memory words.
pub type Word = TritWord<27>;

/// Largest value representable in `n` trits: (3^n - 1) / 2.
const fn max_for_width(n: usize) -> i64 {
    let mut power: i64 = 1;
    let mut i = 0;
    while i < n {
        power *= 3;
        i += 1;
    }
    (power - 1) / 2
}

impl<const N: usize> TritWord<N> {
    /// Number of trits in the word.
    pub const WIDTH: usize = N;

    /// Maximum positive value (all P's).
    pub const MAX: i64 = max_for_width(N);

    /// Minimum negative value (all N's).
    pub const MIN: i64 = -max_for_width(N);

    /// Create a word with all zeros.
    #[inline]
    pub const fn zero() -> Self {
        Self { trits: [Trit::O; N] }
    }

    /// Create a word from an array of trits (LSB first).
    ///
    /// Returns `None` if any trit is `X`; words are always canonical.
    pub fn from_trits(trits: [Trit; N]) -> Option<Self> {
        if trits.iter().all(|t| t.is_valid()) {
            Some(Self { trits })
        } else {
            None
        }
    }

    /// Get the underlying trit array.
    #[inline]
    pub const fn trits(&self) -> &[Trit; N] {
        &self.trits
    }

    /// Get a single trit by index (0 = LSB).
    #[inline]
    pub const fn get(&self, index: usize) -> Trit {
        self.trits[index]
    }

    /// Set a single trit by index (0 = LSB). `X` is ignored.
    #[inline]
    pub fn set(&mut self, index: usize, trit: Trit) {
        if trit.is_valid() {
            self.trits[index] = trit;
        }
    }

    /// Create from a host integer, `None` if it does not fit.
    pub fn try_from_i64(value: i64) -> Option<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return None;
        }
        let mut trits = [Trit::O; N];
        let negative = value < 0;
        let mut value = value.unsigned_abs();

        for slot in trits.iter_mut() {
            let (trit, carry) = match value % 3 {
                0 => (Trit::O, 0),
                1 => (Trit::P, 0),
                _ => (Trit::N, 1), // 2 = -1 + 3
            };
            *slot = if negative { trit.neg() } else { trit };
            value = value / 3 + carry;
        }

        Some(Self { trits })
    }

    /// Create from a host integer, clamping into `[MIN, MAX]`.
    pub fn from_i64_saturating(value: i64) -> Self {
        let clamped = value.clamp(Self::MIN, Self::MAX);
        // In range by construction
        Self::try_from_i64(clamped).unwrap_or_else(Self::zero)
    }

    /// Widen a single trit into a word. `X` widens to zero.
    pub fn from_trit(t: Trit) -> Self {
        let mut word = Self::zero();
        if N > 0 {
            word.set(0, t);
        }
        word
    }

    /// Convert to a host integer.
    pub fn to_i64(&self) -> i64 {
        let mut result: i64 = 0;
        let mut power: i64 = 1;

        for trit in &self.trits {
            result += trit.to_i8().unwrap_or(0) as i64 * power;
            power = power.saturating_mul(3);
        }

        result
    }

    /// Negate all trits.
    #[inline]
    pub fn neg(&self) -> Self {
        let mut trits = [Trit::O; N];
        for (dst, src) in trits.iter_mut().zip(self.trits.iter()) {
            *dst = src.neg();
        }
        Self { trits }
    }

    /// Check if this word is zero.
    pub fn is_zero(&self) -> bool {
        self.trits.iter().all(|t| t.is_zero())
    }

    /// Get the sign of this word (the leading non-zero trit).
    pub fn sign(&self) -> Trit {
        self.trits
            .iter()
            .rev()
            .copied()
            .find(|t| !t.is_zero())
            .unwrap_or(Trit::O)
    }

    /// The word read as a single trit: its value saturated into {-1, 0, +1}.
    #[inline]
    pub fn to_trit(&self) -> Trit {
        self.sign()
    }

    /// Parse from a string like "0tPON" (MSB first). Shorter strings are
    /// zero-extended.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();
        let s = s.strip_prefix("0t").unwrap_or(s);

        let len = s.chars().count();
        if len == 0 || len > N {
            return Err(ParseError::WrongLength { expected: N, got: len });
        }

        let mut trits = [Trit::O; N];
        for (i, c) in s.chars().rev().enumerate() {
            trits[i] = match c {
                'N' | 'n' | '-' => Trit::N,
                'O' | 'o' | '0' => Trit::O,
                'P' | 'p' | '+' => Trit::P,
                _ => return Err(ParseError::InvalidChar(c)),
            };
        }

        Ok(Self { trits })
    }
}

impl<const N: usize> Default for TritWord<N> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<const N: usize> fmt::Debug for TritWord<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word{}(0t", N)?;
        for t in self.trits.iter().rev() {
            write!(f, "{:?}", t)?;
        }
        write!(f, " = {})", self.to_i64())
    }
}

impl<const N: usize> fmt::Display for TritWord<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0t")?;
        for t in self.trits.iter().rev() {
            write!(f, "{:?}", t)?;
        }
        Ok(())
    }
}

impl<const N: usize> std::ops::Neg for TritWord<N> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        TritWord::neg(&self)
    }
}

impl<const N: usize> Serialize for TritWord<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.to_i64())
    }
}

impl<'de, const N: usize> Deserialize<'de> for TritWord<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        Self::try_from_i64(value)
            .ok_or_else(|| D::Error::custom(format!("{} does not fit in {} trits", value, N)))
    }
}

/// Errors that can occur when parsing ternary strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected at most {expected} trits, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("invalid trit character: '{0}' (expected N/O/P)")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_zero() {
        let zero = Word::zero();
        assert_eq!(zero.to_i64(), 0);
        assert!(zero.is_zero());
        assert_eq!(zero.sign(), Trit::O);
    }

    #[test]
    fn test_range_constants() {
        assert_eq!(TritWord::<9>::MAX, 9_841);
        assert_eq!(TritWord::<18>::MAX, 193_710_244);
        assert!(Word::MAX > i32::MAX as i64);
        assert_eq!(Word::MIN, -Word::MAX);
    }

    #[test]
    fn test_from_i64() {
        for v in [0i64, 1, -1, 42, -42, 9841, i32::MAX as i64, i32::MIN as i64, Word::MAX, Word::MIN] {
            assert_eq!(Word::try_from_i64(v).map(|w| w.to_i64()), Some(v));
        }
        assert!(Word::try_from_i64(Word::MAX + 1).is_none());
        assert_eq!(Word::from_i64_saturating(i64::MIN).to_i64(), Word::MIN);
    }

    #[test]
    fn test_canonical_no_negative_zero() {
        let zero = Word::zero();
        assert_eq!(zero.neg(), zero);
        assert!(Word::from_trits([Trit::X; 27]).is_none());
    }

    #[test]
    fn test_trit_view_saturates() {
        assert_eq!(Word::try_from_i64(500).map(|w| w.to_trit()), Some(Trit::P));
        assert_eq!(Word::try_from_i64(-2).map(|w| w.to_trit()), Some(Trit::N));
        assert_eq!(Word::from_trit(Trit::N).to_i64(), -1);
    }

    #[test]
    fn test_parse() {
        // MSB first: P O N = 9 - 1 = 8
        assert_eq!(Word::parse("0tPON").map(|w| w.to_i64()), Ok(8));
        assert_eq!(TritWord::<9>::parse("PPPPPPPPP").map(|w| w.to_i64()), Ok(9841));
        assert!(matches!(Word::parse("PQ"), Err(ParseError::InvalidChar('Q'))));

        let w = Word::try_from_i64(-12345).unwrap_or_default();
        assert_eq!(Word::parse(&w.to_string()), Ok(w));
    }

    #[test]
    fn test_serde_as_integer() {
        let w = Word::try_from_i64(-77).unwrap_or_default();
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, "-77");
        let back: Word = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }
}
