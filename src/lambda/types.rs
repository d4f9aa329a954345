//! Simple type inference.
//!
//! Computes the principal simple type of a closed term by unification
//! (with occurs check). Type variables are renamed `a`, `b`, ... in order
//! of first appearance.

use std::collections::HashMap;
use std::fmt;
use crate::lambda::term::Term;
use crate::lambda::LambdaError;

/// A simple type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Var(u32),
    Arrow(Box<Type>, Box<Type>),
}

impl Type {
    pub fn arrow(from: Type, to: Type) -> Type {
        Type::Arrow(Box::new(from), Box::new(to))
    }
}

fn var_name(i: u32) -> String {
    if i < 26 {
        ((b'a' + i as u8) as char).to_string()
    } else {
        format!("t{}", i)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Var(i) => f.write_str(&var_name(*i)),
            Type::Arrow(from, to) => match **from {
                Type::Arrow(..) => write!(f, "({}) -> {}", from, to),
                Type::Var(_) => write!(f, "{} -> {}", from, to),
            },
        }
    }
}

#[derive(Default)]
struct Inference {
    next: u32,
    subst: HashMap<u32, Type>,
}

impl Inference {
    fn fresh(&mut self) -> Type {
        let t = Type::Var(self.next);
        self.next += 1;
        t
    }

    /// Follow the substitution at the head of `t`.
    fn prune(&self, t: &Type) -> Type {
        let mut t = t.clone();
        while let Type::Var(v) = t {
            match self.subst.get(&v) {
                Some(bound) => t = bound.clone(),
                None => break,
            }
        }
        t
    }

    fn resolve(&self, t: &Type) -> Type {
        match self.prune(t) {
            Type::Arrow(a, b) => Type::arrow(self.resolve(&a), self.resolve(&b)),
            v => v,
        }
    }

    fn occurs(&self, v: u32, t: &Type) -> bool {
        match self.prune(t) {
            Type::Var(w) => v == w,
            Type::Arrow(a, b) => self.occurs(v, &a) || self.occurs(v, &b),
        }
    }

    fn unify(&mut self, a: &Type, b: &Type) -> Result<(), LambdaError> {
        match (self.prune(a), self.prune(b)) {
            (Type::Var(x), Type::Var(y)) if x == y => Ok(()),
            (Type::Var(x), t) | (t, Type::Var(x)) => {
                if self.occurs(x, &t) {
                    return Err(LambdaError::OccursCheck);
                }
                self.subst.insert(x, t);
                Ok(())
            }
            (Type::Arrow(a1, b1), Type::Arrow(a2, b2)) => {
                self.unify(&a1, &a2)?;
                self.unify(&b1, &b2)
            }
        }
    }

    fn infer(&mut self, env: &mut Vec<Type>, t: &Term) -> Result<Type, LambdaError> {
        match t {
            Term::Var(i) => {
                let i = *i as usize;
                if i >= env.len() {
                    return Err(LambdaError::FreeVariable(i as u32));
                }
                Ok(env[env.len() - 1 - i].clone())
            }
            Term::Abs(body) => {
                let param = self.fresh();
                env.push(param.clone());
                let result = self.infer(env, body);
                env.pop();
                Ok(Type::arrow(param, result?))
            }
            Term::App(f, a) => {
                let tf = self.infer(env, f)?;
                let ta = self.infer(env, a)?;
                let result = self.fresh();
                self.unify(&tf, &Type::arrow(ta, result.clone()))?;
                Ok(result)
            }
        }
    }
}

/// Rename variables to 0, 1, ... in order of first appearance.
fn normalize(t: &Type, names: &mut HashMap<u32, u32>) -> Type {
    match t {
        Type::Var(v) => {
            let next = names.len() as u32;
            Type::Var(*names.entry(*v).or_insert(next))
        }
        Type::Arrow(a, b) => {
            let a = normalize(a, names);
            Type::arrow(a, normalize(b, names))
        }
    }
}

/// Principal simple type of a closed term.
pub fn infer_type(t: &Term) -> Result<Type, LambdaError> {
    let mut inference = Inference::default();
    let ty = inference.infer(&mut Vec::new(), t)?;
    let resolved = inference.resolve(&ty);
    Ok(normalize(&resolved, &mut HashMap::new()))
}

/// Whether the term is closed: every index refers to an enclosing binder.
pub fn is_well_formed(t: &Term) -> bool {
    t.is_closed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lambda::church;
    use crate::lambda::parse::parse_term;

    fn type_of(src: &str) -> Result<String, LambdaError> {
        infer_type(&parse_term(src).unwrap()).map(|t| t.to_string())
    }

    #[test]
    fn test_basic_types() {
        assert_eq!(type_of("\\x. x").unwrap(), "a -> a");
        assert_eq!(type_of("\\x y. x").unwrap(), "a -> b -> a");
        assert_eq!(type_of("\\f x. f x").unwrap(), "(a -> b) -> a -> b");
        assert_eq!(type_of("\\f g x. f (g x)").unwrap(), "(a -> b) -> (c -> a) -> c -> b");
    }

    #[test]
    fn test_church_numeral_type() {
        let t = infer_type(&church::numeral(3)).unwrap();
        assert_eq!(t.to_string(), "(a -> a) -> a -> a");
    }

    #[test]
    fn test_self_application_is_untypeable() {
        assert_eq!(type_of("\\x. x x"), Err(LambdaError::OccursCheck));
        assert_eq!(infer_type(&church::omega()), Err(LambdaError::OccursCheck));
    }

    #[test]
    fn test_open_terms() {
        let open = Term::Abs(std::rc::Rc::new(Term::Var(1)));
        assert_eq!(infer_type(&open), Err(LambdaError::FreeVariable(1)));
        assert!(!is_well_formed(&open));
        assert!(is_well_formed(&church::add()));
    }
}
