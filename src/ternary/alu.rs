//! Flag-tracking wrapper around the scalar trit operations.
//!
//! `zero`, `negative` and `positive` describe the last produced value.
//! `overflow` and `underflow` are sticky until [`Alu::clear`].

use serde::{Serialize, Deserialize};
use crate::ternary::{Trit, Saturation};

/// ALU status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AluFlags {
    pub overflow: bool,
    pub underflow: bool,
    pub zero: bool,
    pub negative: bool,
    pub positive: bool,
}

/// A trit ALU context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alu {
    pub flags: AluFlags,
}

impl Alu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every flag, including the sticky ones.
    pub fn clear(&mut self) {
        self.flags = AluFlags::default();
    }

    fn record(&mut self, (value, sat): (Trit, Saturation)) -> Trit {
        match sat {
            Saturation::Overflow => self.flags.overflow = true,
            Saturation::Underflow => self.flags.underflow = true,
            Saturation::Exact => {}
        }
        self.flags.zero = value == Trit::O;
        self.flags.negative = value == Trit::N;
        self.flags.positive = value == Trit::P;
        value
    }

    fn plain(&mut self, value: Trit) -> Trit {
        self.record((value, Saturation::Exact))
    }

    pub fn add(&mut self, a: Trit, b: Trit) -> Trit {
        self.record(a.add_sat(b))
    }

    pub fn sub(&mut self, a: Trit, b: Trit) -> Trit {
        self.record(a.sub_sat(b))
    }

    pub fn mul(&mut self, a: Trit, b: Trit) -> Trit {
        self.plain(a.mul(b))
    }

    /// Division; a zero divisor gives `X` and sets overflow.
    pub fn div(&mut self, a: Trit, b: Trit) -> Trit {
        if b == Trit::O && a.is_valid() {
            self.flags.overflow = true;
        }
        self.plain(a.div(b))
    }

    pub fn not(&mut self, a: Trit) -> Trit {
        self.plain(a.not())
    }

    pub fn and(&mut self, a: Trit, b: Trit) -> Trit {
        self.plain(a.min(b))
    }

    pub fn or(&mut self, a: Trit, b: Trit) -> Trit {
        self.plain(a.max(b))
    }

    pub fn xor(&mut self, a: Trit, b: Trit) -> Trit {
        self.plain(a.xor(b))
    }

    pub fn eq(&mut self, a: Trit, b: Trit) -> Trit {
        self.plain(a.eq_t(b))
    }

    pub fn gt(&mut self, a: Trit, b: Trit) -> Trit {
        self.plain(a.gt_t(b))
    }

    pub fn lt(&mut self, a: Trit, b: Trit) -> Trit {
        self.plain(a.lt_t(b))
    }

    pub fn shift_left(&mut self, a: Trit, n: u32) -> Trit {
        self.record(a.shift_left(n))
    }

    pub fn shift_right(&mut self, a: Trit, n: u32) -> Trit {
        self.plain(a.shift_right(n))
    }
}
