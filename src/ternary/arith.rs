//! Multi-trit arithmetic operations.
//!
//! Provides addition, subtraction, multiplication, division and shifts
//! for balanced ternary words using ripple-carry algorithms.

use crate::ternary::{Trit, TritWord};

/// Negate a word.
#[inline]
pub fn negate<const N: usize>(a: &TritWord<N>) -> TritWord<N> {
    a.neg()
}

/// Add two words, returning (result, carry_out).
///
/// A non-zero carry means the true sum did not fit in N trits.
pub fn add<const N: usize>(a: &TritWord<N>, b: &TritWord<N>) -> (TritWord<N>, Trit) {
    let mut result = TritWord::<N>::zero();
    let mut carry = Trit::O;

    for i in 0..N {
        let (sum, new_carry) = a.get(i).full_add(b.get(i), carry);
        result.set(i, sum);
        carry = new_carry;
    }

    (result, carry)
}

/// Subtract two words (a - b), returning (result, borrow_out).
#[inline]
pub fn subtract<const N: usize>(a: &TritWord<N>, b: &TritWord<N>) -> (TritWord<N>, Trit) {
    add(a, &b.neg())
}

/// Multiply two words, returning the 2N-trit product as (low, high).
///
/// Schoolbook multiplication. Single-trit multiplication never carries,
/// which keeps the partial products simple.
pub fn multiply<const N: usize>(a: &TritWord<N>, b: &TritWord<N>) -> (TritWord<N>, TritWord<N>) {
    let mut product = vec![Trit::O; 2 * N];

    for i in 0..N {
        if a.get(i).is_zero() {
            continue;
        }

        let mut carry = Trit::O;
        for j in 0..N {
            let partial = a.get(i).mul(b.get(j));
            let (sum1, c1) = product[i + j].full_add(partial, Trit::O);
            let (sum2, c2) = sum1.full_add(carry, Trit::O);
            product[i + j] = sum2;
            carry = c1.any(c2);
        }

        let mut k = i + N;
        while !carry.is_zero() && k < 2 * N {
            let (sum, new_carry) = product[k].full_add(carry, Trit::O);
            product[k] = sum;
            carry = new_carry;
            k += 1;
        }
    }

    let mut low = TritWord::<N>::zero();
    let mut high = TritWord::<N>::zero();
    for i in 0..N {
        low.set(i, product[i]);
        high.set(i, product[i + N]);
    }

    (low, high)
}

/// Truncating division, returning (quotient, remainder). `None` on a zero divisor.
pub fn divide<const N: usize>(a: &TritWord<N>, b: &TritWord<N>) -> Option<(TritWord<N>, TritWord<N>)> {
    if b.is_zero() {
        return None;
    }
    let (x, y) = (a.to_i64(), b.to_i64());
    // |x / y| <= |x| and |x % y| < |y|, so both fit.
    Some((
        TritWord::from_i64_saturating(x / y),
        TritWord::from_i64_saturating(x % y),
    ))
}

/// Shift a word left by n trit positions (multiply by 3^n).
/// Fills vacated positions with zeros. Trits shifted out are lost.
pub fn shift_left<const N: usize>(a: &TritWord<N>, n: usize) -> TritWord<N> {
    let mut result = TritWord::<N>::zero();
    for i in 0..N.saturating_sub(n) {
        result.set(i + n, a.get(i));
    }
    result
}

/// Shift a word right by n trit positions (divide by 3^n).
/// In balanced ternary, truncation of trits rounds to nearest.
pub fn shift_right<const N: usize>(a: &TritWord<N>, n: usize) -> TritWord<N> {
    let mut result = TritWord::<N>::zero();
    for i in n..N {
        result.set(i - n, a.get(i));
    }
    result
}

/// Compare two words.
pub fn compare<const N: usize>(a: &TritWord<N>, b: &TritWord<N>) -> std::cmp::Ordering {
    a.to_i64().cmp(&b.to_i64())
}

/// Check if addition would overflow (result outside representable range).
#[inline]
pub fn would_overflow<const N: usize>(a: &TritWord<N>, b: &TritWord<N>) -> bool {
    let (_, carry) = add(a, b);
    !carry.is_zero()
}
