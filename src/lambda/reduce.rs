//! β-reduction in normal order.

use std::rc::Rc;
use log::debug;
use serde::{Serialize, Deserialize};
use crate::lambda::term::{Term, TermRef};

/// Default step limit for a reduction.
pub const DEFAULT_MAX_STEPS: u64 = 10_000;
/// Default bound on term height during a reduction.
pub const DEFAULT_MAX_DEPTH: usize = 4096;

/// Limits and bookkeeping for one reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionContext {
    pub max_steps: u64,
    pub max_depth: usize,
    /// β-steps performed so far.
    pub reduction_count: u64,
    /// Height of the current term, refreshed every step.
    pub current_depth: usize,
    /// Set when a limit stopped the reduction.
    pub timeout: bool,
}

impl ReductionContext {
    pub fn new(max_steps: u64, max_depth: usize) -> Self {
        Self {
            max_steps,
            max_depth,
            reduction_count: 0,
            current_depth: 0,
            timeout: false,
        }
    }

    pub fn with_steps(max_steps: u64) -> Self {
        Self::new(max_steps, DEFAULT_MAX_DEPTH)
    }
}

impl Default for ReductionContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS, DEFAULT_MAX_DEPTH)
    }
}

/// Add `d` to every index at or above `cutoff`.
pub fn shift(t: &TermRef, d: i64, cutoff: u32) -> TermRef {
    if d == 0 {
        return Rc::clone(t);
    }
    match &**t {
        Term::Var(i) if *i >= cutoff => Rc::new(Term::Var((*i as i64 + d).max(0) as u32)),
        Term::Var(_) => Rc::clone(t),
        Term::Abs(b) => Rc::new(Term::Abs(shift(b, d, cutoff + 1))),
        Term::App(f, a) => Rc::new(Term::App(shift(f, d, cutoff), shift(a, d, cutoff))),
    }
}

/// Replace index `depth` in `body` by `arg`, shifting `arg` under binders
/// and lowering the indices above `depth` that lose their binder.
pub fn substitute(body: &TermRef, depth: u32, arg: &TermRef) -> TermRef {
    match &**body {
        Term::Var(i) if *i == depth => shift(arg, depth as i64, 0),
        Term::Var(i) if *i > depth => Rc::new(Term::Var(i - 1)),
        Term::Var(_) => Rc::clone(body),
        Term::Abs(b) => Rc::new(Term::Abs(substitute(b, depth + 1, arg))),
        Term::App(f, a) => Rc::new(Term::App(substitute(f, depth, arg), substitute(a, depth, arg))),
    }
}

/// Contract the leftmost-outermost redex. `None` means `t` is in normal form.
pub fn beta_step(t: &TermRef) -> Option<TermRef> {
    match &**t {
        Term::Var(_) => None,
        Term::Abs(b) => beta_step(b).map(|b| Rc::new(Term::Abs(b))),
        Term::App(f, a) => {
            if let Term::Abs(body) = &**f {
                return Some(substitute(body, 0, a));
            }
            if let Some(f2) = beta_step(f) {
                return Some(Rc::new(Term::App(f2, Rc::clone(a))));
            }
            beta_step(a).map(|a2| Rc::new(Term::App(Rc::clone(f), a2)))
        }
    }
}

/// Whether no β-redex remains anywhere in `t`.
pub fn is_normal_form(t: &Term) -> bool {
    match t {
        Term::Var(_) => true,
        Term::Abs(b) => is_normal_form(b),
        Term::App(f, a) => !matches!(**f, Term::Abs(_)) && is_normal_form(f) && is_normal_form(a),
    }
}

/// Reduce in normal order until no redex remains or a limit is hit.
///
/// On a limit, `ctx.timeout` is set and the partially reduced term is
/// returned.
pub fn reduce_to_normal_form(t: &TermRef, ctx: &mut ReductionContext) -> TermRef {
    let mut current = Rc::clone(t);
    loop {
        ctx.current_depth = current.depth();
        if ctx.current_depth > ctx.max_depth {
            debug!("reduction stopped: depth {} > {}", ctx.current_depth, ctx.max_depth);
            ctx.timeout = true;
            return current;
        }
        if ctx.reduction_count >= ctx.max_steps {
            if !is_normal_form(&current) {
                debug!("reduction stopped after {} steps", ctx.reduction_count);
                ctx.timeout = true;
            }
            return current;
        }
        match beta_step(&current) {
            Some(next) => {
                current = next;
                ctx.reduction_count += 1;
            }
            None => return current,
        }
    }
}

/// Reduce with a fresh context of `max_steps`. Returns the term and the context.
pub fn reduce(t: &TermRef, max_steps: u64) -> (TermRef, ReductionContext) {
    let mut ctx = ReductionContext::with_steps(max_steps);
    let result = reduce_to_normal_form(t, &mut ctx);
    (result, ctx)
}

/// η-reduce everywhere: `λ. f 0` becomes `f` (shifted down) when `0` is not free in `f`.
pub fn optimize_term(t: &TermRef) -> TermRef {
    match &**t {
        Term::Var(_) => Rc::clone(t),
        Term::App(f, a) => Rc::new(Term::App(optimize_term(f), optimize_term(a))),
        Term::Abs(b) => {
            let b = optimize_term(b);
            if let Term::App(f, a) = &*b {
                if **a == Term::Var(0) && !f.has_free(0) {
                    return shift(f, -1, 0);
                }
            }
            Rc::new(Term::Abs(b))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lambda::church;
    use crate::lambda::term::{alpha_equiv, create_abs, create_app, create_var};
    use proptest::prelude::*;

    fn identity() -> TermRef {
        create_abs(&create_var(0))
    }

    #[test]
    fn test_identity_application_is_one_step() {
        let m = church::numeral(3);
        let t = create_app(&identity(), &m);
        let next = beta_step(&t).unwrap();
        assert!(alpha_equiv(&next, &m));
    }

    #[test]
    fn test_substitution_shifts_under_binders() {
        // (λ. λ. 1) #0  →  λ. #1
        let k = Term::abs_n(2, create_var(1));
        let t = create_app(&k, &create_var(0));
        let r = beta_step(&t).unwrap();
        assert_eq!(*r, Term::Abs(create_var(1)));
    }

    #[test]
    fn test_succ_zero_is_one() {
        let t = create_app(&church::succ(), &church::zero());
        let (r, ctx) = reduce(&t, 100);
        assert!(!ctx.timeout);
        assert!(alpha_equiv(&r, &church::one()));
    }

    #[test]
    fn test_add_one_one_is_two() {
        let t = Term::app_all(church::add(), &[church::one(), church::one()]);
        let (r, _) = reduce(&t, 100);
        assert!(alpha_equiv(&r, &church::two()));
    }

    #[test]
    fn test_mul_two_two_is_four() {
        let t = Term::app_all(church::mul(), &[church::two(), church::two()]);
        let (r, _) = reduce(&t, 1000);
        assert!(alpha_equiv(&r, &church::numeral(4)));
    }

    #[test]
    fn test_add_two_three_is_five() {
        let two = church::numeral(2);
        let three = church::numeral(3);
        let t = Term::app_all(church::add(), &[two.clone(), three.clone()]);
        let mut ctx = ReductionContext::with_steps(1000);
        let r = reduce_to_normal_form(&t, &mut ctx);
        assert!(!ctx.timeout);
        assert!(alpha_equiv(&r, &church::numeral(5)));
        drop(r);
        drop(t);
        assert_eq!(Rc::strong_count(&two), 1);
        assert_eq!(Rc::strong_count(&three), 1);
    }

    #[test]
    fn test_omega_times_out_without_leaks() {
        let omega = church::omega();
        let mut ctx = ReductionContext::with_steps(100);
        let r = reduce_to_normal_form(&omega, &mut ctx);
        assert!(ctx.timeout);
        assert_eq!(ctx.reduction_count, 100);
        assert!(alpha_equiv(&r, &omega));
        drop(r);
        assert_eq!(Rc::strong_count(&omega), 1);
    }

    #[test]
    fn test_depth_limit() {
        let t = Term::app_all(church::mul(), &[church::numeral(5), church::numeral(5)]);
        let mut ctx = ReductionContext::new(10_000, 8);
        reduce_to_normal_form(&t, &mut ctx);
        assert!(ctx.timeout);
    }

    #[test]
    fn test_eta() {
        // λ. #3 0  →  #2
        let t = create_abs(&create_app(&create_var(3), &create_var(0)));
        assert_eq!(*optimize_term(&t), Term::Var(2));
        // λ. 0 0 stays
        let w = create_abs(&create_app(&create_var(0), &create_var(0)));
        assert!(alpha_equiv(&optimize_term(&w), &w));
    }

    fn arb_term() -> impl Strategy<Value = TermRef> {
        let leaf = (0u32..3).prop_map(create_var);
        leaf.prop_recursive(5, 32, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(|b| create_abs(&b)),
                (inner.clone(), inner).prop_map(|(f, a)| create_app(&f, &a)),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_clone_is_alpha_equivalent(t in arb_term()) {
            prop_assert!(alpha_equiv(&t, &Rc::clone(&t)));
            prop_assert!(alpha_equiv(&t, &Rc::new((*t).clone())));
        }

        #[test]
        fn prop_normal_forms_are_fixed_points(t in arb_term()) {
            match beta_step(&t) {
                None => {
                    prop_assert!(is_normal_form(&t));
                    let (r, ctx) = reduce(&t, 10);
                    prop_assert!(alpha_equiv(&t, &r));
                    prop_assert_eq!(ctx.reduction_count, 0);
                }
                Some(_) => prop_assert!(!is_normal_form(&t)),
            }
        }

        #[test]
        fn prop_reduction_releases_input(t in arb_term()) {
            let (r, _) = reduce(&t, 50);
            drop(r);
            prop_assert_eq!(Rc::strong_count(&t), 1);
        }
    }
}
