//! Lambda terms in de Bruijn form.
//!
//! Terms are immutable and shared through `Rc`: building an abstraction or
//! application clones (increments) its children, and dropping the last
//! handle frees a node and releases its children in turn. α-equivalence is
//! plain structural equality.

use std::fmt;
use std::rc::Rc;

/// A shared handle to a term.
pub type TermRef = Rc<Term>;

/// A lambda term. `Var(0)` refers to the nearest enclosing binder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Var(u32),
    Abs(TermRef),
    App(TermRef, TermRef),
}

/// `Var(i)`.
pub fn create_var(index: u32) -> TermRef {
    Rc::new(Term::Var(index))
}

/// `λ. body`. The body's reference count is incremented.
pub fn create_abs(body: &TermRef) -> TermRef {
    Rc::new(Term::Abs(Rc::clone(body)))
}

/// `f a`. Both children's reference counts are incremented.
pub fn create_app(f: &TermRef, a: &TermRef) -> TermRef {
    Rc::new(Term::App(Rc::clone(f), Rc::clone(a)))
}

/// Take another reference to a term.
pub fn clone_term(t: &TermRef) -> TermRef {
    Rc::clone(t)
}

/// Drop a reference; the node is freed when the count reaches zero.
pub fn release(t: TermRef) {
    drop(t);
}

/// Structural equality under de Bruijn indices.
pub fn alpha_equiv(a: &TermRef, b: &TermRef) -> bool {
    Rc::ptr_eq(a, b) || a == b
}

impl Term {
    /// `λ^n. body`
    pub fn abs_n(n: usize, body: TermRef) -> TermRef {
        (0..n).fold(body, |t, _| Rc::new(Term::Abs(t)))
    }

    /// Left-nested application `f a1 a2 ...`.
    pub fn app_all(f: TermRef, args: &[TermRef]) -> TermRef {
        args.iter().fold(f, |acc, a| Rc::new(Term::App(acc, Rc::clone(a))))
    }

    pub fn is_redex(&self) -> bool {
        matches!(self, Term::App(f, _) if matches!(**f, Term::Abs(_)))
    }

    /// Number of nodes.
    pub fn size(&self) -> usize {
        match self {
            Term::Var(_) => 1,
            Term::Abs(b) => 1 + b.size(),
            Term::App(f, a) => 1 + f.size() + a.size(),
        }
    }

    /// Height of the tree.
    pub fn depth(&self) -> usize {
        match self {
            Term::Var(_) => 1,
            Term::Abs(b) => 1 + b.depth(),
            Term::App(f, a) => 1 + f.depth().max(a.depth()),
        }
    }

    /// Whether every index refers to a binder inside `depth` enclosing ones.
    pub fn is_closed_under(&self, depth: u32) -> bool {
        match self {
            Term::Var(i) => *i < depth,
            Term::Abs(b) => b.is_closed_under(depth + 1),
            Term::App(f, a) => f.is_closed_under(depth) && a.is_closed_under(depth),
        }
    }

    /// No free variables.
    pub fn is_closed(&self) -> bool {
        self.is_closed_under(0)
    }

    /// Whether index `index` (relative to this term) occurs free.
    pub fn has_free(&self, index: u32) -> bool {
        match self {
            Term::Var(i) => *i == index,
            Term::Abs(b) => b.has_free(index + 1),
            Term::App(f, a) => f.has_free(index) || a.has_free(index),
        }
    }
}

/// Binder name for nesting level `level`.
fn binder_name(level: usize) -> String {
    const NAMES: &[u8] = b"xyzwvutsabcdefgh";
    match NAMES.get(level) {
        Some(&c) => (c as char).to_string(),
        None => format!("x{}", level),
    }
}

fn write_term(f: &mut fmt::Formatter<'_>, t: &Term, level: usize) -> fmt::Result {
    match t {
        Term::Var(i) => {
            let i = *i as usize;
            if i < level {
                f.write_str(&binder_name(level - 1 - i))
            } else {
                write!(f, "#{}", i - level)
            }
        }
        Term::Abs(body) => {
            write!(f, "\\{}. ", binder_name(level))?;
            write_term(f, body, level + 1)
        }
        Term::App(func, arg) => {
            match **func {
                Term::Abs(_) => {
                    f.write_str("(")?;
                    write_term(f, func, level)?;
                    f.write_str(")")?;
                }
                _ => write_term(f, func, level)?,
            }
            f.write_str(" ")?;
            match **arg {
                Term::Var(_) => write_term(f, arg, level),
                _ => {
                    f.write_str("(")?;
                    write_term(f, arg, level)?;
                    f.write_str(")")
                }
            }
        }
    }
}

/// Prints with generated binder names; free variables print as `#k`.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(f, self, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> TermRef {
        create_abs(&create_var(0))
    }

    #[test]
    fn test_constructors_share_children() {
        let x = create_var(0);
        let id = create_abs(&x);
        assert_eq!(Rc::strong_count(&x), 2);
        let app = create_app(&id, &id);
        assert_eq!(Rc::strong_count(&id), 3);
        release(app);
        assert_eq!(Rc::strong_count(&id), 1);
        release(id);
        assert_eq!(Rc::strong_count(&x), 1);
    }

    #[test]
    fn test_alpha_equiv_is_structural() {
        let a = identity();
        let b = identity();
        assert!(alpha_equiv(&a, &b));
        assert!(alpha_equiv(&a, &clone_term(&a)));
        assert!(!alpha_equiv(&a, &create_abs(&create_var(1))));
    }

    #[test]
    fn test_closedness() {
        assert!(identity().is_closed());
        assert!(!create_abs(&create_var(1)).is_closed());
        assert!(create_abs(&create_var(1)).has_free(0));
    }

    #[test]
    fn test_display() {
        let k = Term::abs_n(2, create_var(1));
        assert_eq!(k.to_string(), "\\x. \\y. x");
        let omega_half = create_abs(&create_app(&create_var(0), &create_var(0)));
        let omega = create_app(&omega_half, &omega_half);
        assert_eq!(omega.to_string(), "(\\x. x x) (\\x. x x)");
        assert_eq!(create_var(2).to_string(), "#2");
    }

    #[test]
    fn test_size_and_depth() {
        let t = create_app(&identity(), &create_var(3));
        assert_eq!(t.size(), 4);
        assert_eq!(t.depth(), 3);
        assert!(t.is_redex());
    }
}
