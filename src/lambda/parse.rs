//! Text syntax for lambda terms.
//!
//! ```text
//! term   := ('\' | 'λ') ident+ '.' term
//!         | atom+ [term]          ; application, left-associative
//! atom   := ident | '(' term ')'
//! ```
//!
//! Named variables are resolved to de Bruijn indices; free identifiers are
//! rejected.

use std::rc::Rc;
use crate::lambda::reduce::DEFAULT_MAX_DEPTH;
use crate::lambda::term::{Term, TermRef};
use crate::lambda::LambdaError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Lambda,
    Dot,
    LParen,
    RParen,
    Ident(String),
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, LambdaError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\\' | 'λ' => {
                chars.next();
                tokens.push((pos, Token::Lambda));
            }
            '.' => {
                chars.next();
                tokens.push((pos, Token::Dot));
            }
            '(' => {
                chars.next();
                tokens.push((pos, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((pos, Token::RParen));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '\'' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((pos, Token::Ident(name)));
            }
            other => {
                return Err(LambdaError::Parse { pos, message: format!("unexpected character '{}'", other) });
            }
        }
    }

    Ok(tokens)
}

/// Deepest bracket or binder nesting the parser will follow.
pub const MAX_PARSE_NESTING: usize = 512;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    /// Binder names, innermost last.
    scope: Vec<String>,
    nesting: usize,
    max_nesting: usize,
    /// Bound on the height of the built term.
    max_depth: usize,
}

/// A parsed subterm and its height.
type Parsed = (TermRef, usize);

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> LambdaError {
        LambdaError::Parse { pos: self.offset(), message: message.into() }
    }

    fn expect(&mut self, token: Token) -> Result<(), LambdaError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", token)))
        }
    }

    fn check_depth(&self, depth: usize) -> Result<usize, LambdaError> {
        if depth > self.max_depth {
            return Err(self.error(format!("term deeper than {}", self.max_depth)));
        }
        Ok(depth)
    }

    fn term(&mut self) -> Result<Parsed, LambdaError> {
        if self.nesting >= self.max_nesting {
            return Err(self.error(format!("nesting deeper than {}", self.max_nesting)));
        }
        self.nesting += 1;
        let result = self.application();
        self.nesting -= 1;
        result
    }

    fn application(&mut self) -> Result<Parsed, LambdaError> {
        if self.peek() == Some(&Token::Lambda) {
            return self.abstraction();
        }

        let (mut acc, mut height) = self.atom()?;
        loop {
            match self.peek() {
                Some(Token::Ident(_)) | Some(Token::LParen) => {
                    let (arg, h) = self.atom()?;
                    height = self.check_depth(1 + height.max(h))?;
                    acc = Rc::new(Term::App(acc, arg));
                }
                Some(Token::Lambda) => {
                    // A trailing abstraction extends to the end
                    let (arg, h) = self.abstraction()?;
                    let height = self.check_depth(1 + height.max(h))?;
                    return Ok((Rc::new(Term::App(acc, arg)), height));
                }
                _ => return Ok((acc, height)),
            }
        }
    }

    fn abstraction(&mut self) -> Result<Parsed, LambdaError> {
        self.expect(Token::Lambda)?;
        let mut names = Vec::new();
        while let Some(Token::Ident(name)) = self.peek() {
            names.push(name.clone());
            self.pos += 1;
        }
        if names.is_empty() {
            return Err(self.error("expected a binder name"));
        }
        self.check_depth(names.len())?;
        self.expect(Token::Dot)?;

        let bound = names.len();
        self.scope.extend(names);
        let body = self.term();
        self.scope.truncate(self.scope.len() - bound);

        let (body, h) = body?;
        let height = self.check_depth(h + bound)?;
        Ok((Term::abs_n(bound, body), height))
    }

    fn atom(&mut self) -> Result<Parsed, LambdaError> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                let index = self
                    .scope
                    .iter()
                    .rev()
                    .position(|n| *n == name)
                    .ok_or_else(|| LambdaError::UnboundIdentifier(name.clone()))?;
                self.pos += 1;
                Ok((Rc::new(Term::Var(index as u32)), 1))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let t = self.term()?;
                self.expect(Token::RParen)?;
                Ok(t)
            }
            _ => Err(self.error("expected a variable or '('")),
        }
    }
}

/// Parse a closed lambda term no deeper than the default reduction bound.
pub fn parse_term(src: &str) -> Result<TermRef, LambdaError> {
    parse_term_bounded(src, DEFAULT_MAX_DEPTH)
}

/// Parse a closed lambda term whose height is at most `max_depth`.
///
/// Bracket and binder nesting is also limited, so hostile input is
/// rejected with a parse error instead of exhausting the stack.
pub fn parse_term_bounded(src: &str, max_depth: usize) -> Result<TermRef, LambdaError> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
        end: src.len(),
        scope: Vec::new(),
        nesting: 0,
        max_nesting: MAX_PARSE_NESTING.min(max_depth.max(1)),
        max_depth,
    };
    let (t, _) = parser.term()?;
    if parser.peek().is_some() {
        return Err(parser.error("trailing input"));
    }
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lambda::church;
    use crate::lambda::term::alpha_equiv;

    #[test]
    fn test_parse_combinators() {
        assert!(alpha_equiv(&parse_term("\\x. x").unwrap(), &church::identity()));
        assert!(alpha_equiv(&parse_term("λf x. f (f x)").unwrap(), &church::two()));
        assert!(alpha_equiv(&parse_term("(\\x. x x) (\\x. x x)").unwrap(), &church::omega()));
        assert!(alpha_equiv(&parse_term("\\m n f x. m f (n f x)").unwrap(), &church::add()));
    }

    #[test]
    fn test_application_is_left_associative() {
        let t = parse_term("\\a b c. a b c").unwrap();
        let expected = Term::abs_n(3, Term::app_all(Rc::new(Term::Var(2)), &[Rc::new(Term::Var(1)), Rc::new(Term::Var(0))]));
        assert!(alpha_equiv(&t, &expected));
    }

    #[test]
    fn test_shadowing() {
        let t = parse_term("\\x. \\x. x").unwrap();
        assert!(alpha_equiv(&t, &church::church_false()));
    }

    #[test]
    fn test_trailing_lambda_argument() {
        let t = parse_term("\\f. f \\x. x").unwrap();
        assert_eq!(t.to_string(), "\\x. x (\\y. y)");
    }

    #[test]
    fn test_printer_output_reparses() {
        for t in [church::add(), church::mul(), church::pair(), church::omega()] {
            assert!(alpha_equiv(&parse_term(&t.to_string()).unwrap(), &t));
        }
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_term("\\x. y"), Err(LambdaError::UnboundIdentifier("y".into())));
        assert!(matches!(parse_term("(\\x. x"), Err(LambdaError::Parse { .. })));
        assert!(matches!(parse_term("\\. x"), Err(LambdaError::Parse { .. })));
        assert!(matches!(parse_term("x $"), Err(LambdaError::Parse { pos: 2, .. })));
        assert!(matches!(parse_term(""), Err(LambdaError::Parse { pos: 0, .. })));
    }

    #[test]
    fn test_deep_brackets_rejected() {
        let n = 100_000;
        let src = format!("\\x. {}x{}", "(".repeat(n), ")".repeat(n));
        assert!(matches!(parse_term(&src), Err(LambdaError::Parse { .. })));
        let shallow = format!("\\x. {}x{}", "(".repeat(100), ")".repeat(100));
        assert!(alpha_equiv(&parse_term(&shallow).unwrap(), &church::identity()));
    }

    #[test]
    fn test_tall_terms_rejected() {
        // Long spines and binder lists grow the term without nesting
        let spine = format!("\\x. {}", vec!["x"; 20_000].join(" "));
        assert!(matches!(parse_term(&spine), Err(LambdaError::Parse { .. })));
        let binders = format!("\\{}. a0", (0..20_000).map(|i| format!("a{}", i)).collect::<Vec<_>>().join(" "));
        assert!(matches!(parse_term(&binders), Err(LambdaError::Parse { .. })));

        let t = parse_term_bounded("\\x. x x x", 4).unwrap();
        assert_eq!(t.depth(), 4);
        assert!(parse_term_bounded("\\x. x x x x", 4).is_err());
    }
}
