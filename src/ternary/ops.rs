//! Tritwise operations and the two-input gate table.
//!
//! [`TritOps`] applies the scalar logic operations digit by digit to words.
//! [`Gate`] is the table the `TGATE` instruction indexes by gate id.

use serde::{Serialize, Deserialize};
use crate::ternary::{Trit, TritWord};

/// Trait for types that support tritwise operations.
pub trait TritOps {
    /// The output type for operations that return a value of the same size.
    type Output;

    /// Negate all trits (flip N ↔ P).
    fn ternary_neg(&self) -> Self::Output;

    /// Tritwise minimum (ternary AND).
    fn ternary_min(&self, other: &Self) -> Self::Output;

    /// Tritwise maximum (ternary OR).
    fn ternary_max(&self, other: &Self) -> Self::Output;

    /// Tritwise consensus.
    fn ternary_consensus(&self, other: &Self) -> Self::Output;
}

impl TritOps for Trit {
    type Output = Trit;

    #[inline]
    fn ternary_neg(&self) -> Trit {
        self.neg()
    }

    #[inline]
    fn ternary_min(&self, other: &Self) -> Trit {
        Trit::min(*self, *other)
    }

    #[inline]
    fn ternary_max(&self, other: &Self) -> Trit {
        Trit::max(*self, *other)
    }

    #[inline]
    fn ternary_consensus(&self, other: &Self) -> Trit {
        self.consensus(*other)
    }
}

impl<const N: usize> TritWord<N> {
    fn zip_with(&self, other: &Self, f: impl Fn(Trit, Trit) -> Trit) -> Self {
        let mut result = *self;
        for i in 0..N {
            result.set(i, f(self.get(i), other.get(i)));
        }
        result
    }
}

impl<const N: usize> TritOps for TritWord<N> {
    type Output = Self;

    fn ternary_neg(&self) -> Self {
        self.neg()
    }

    fn ternary_min(&self, other: &Self) -> Self {
        self.zip_with(other, Trit::min)
    }

    fn ternary_max(&self, other: &Self) -> Self {
        self.zip_with(other, Trit::max)
    }

    fn ternary_consensus(&self, other: &Self) -> Self {
        self.zip_with(other, Trit::consensus)
    }
}

/// Two-input three-valued gates, indexed by gate id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gate {
    Min = 0,
    Max = 1,
    Xor = 2,
    Consensus = 3,
    Any = 4,
    Sum = 5,
    Carry = 6,
    Mul = 7,
    Eq = 8,
    Gt = 9,
    Lt = 10,
    /// Łukasiewicz implication: min(1, 1 - a + b).
    Implies = 11,
}

impl Gate {
    pub const ALL: [Gate; 12] = [
        Gate::Min, Gate::Max, Gate::Xor, Gate::Consensus, Gate::Any, Gate::Sum,
        Gate::Carry, Gate::Mul, Gate::Eq, Gate::Gt, Gate::Lt, Gate::Implies,
    ];

    /// Look up a gate by id.
    pub fn from_id(id: i64) -> Option<Gate> {
        usize::try_from(id).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Evaluate the gate.
    pub fn eval(self, a: Trit, b: Trit) -> Trit {
        match self {
            Gate::Min => a.min(b),
            Gate::Max => a.max(b),
            Gate::Xor => a.xor(b),
            Gate::Consensus => a.consensus(b),
            Gate::Any => a.any(b),
            Gate::Sum => a.sum(b),
            Gate::Carry => a.carry(b),
            Gate::Mul => a.mul(b),
            Gate::Eq => a.eq_t(b),
            Gate::Gt => a.gt_t(b),
            Gate::Lt => a.lt_t(b),
            Gate::Implies => match (a.to_i8(), b.to_i8()) {
                (Some(x), Some(y)) => Trit::from_i8((1 - x + y).min(1)),
                _ => Trit::X,
            },
        }
    }
}

/// Evaluate gate `id` on two trits. Unknown ids give `X`.
pub fn gate_eval(id: i64, a: Trit, b: Trit) -> Trit {
    match Gate::from_id(id) {
        Some(gate) => gate.eval(a, b),
        None => Trit::X,
    }
}
