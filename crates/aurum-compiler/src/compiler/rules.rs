//! Pratt dispatch: each token kind binds a prefix handler, an infix
//! handler, and an infix precedence. The table is pure data; the parser
//! climbs precedence levels through it.

use crate::compiler::Parser;
use crate::token::TokenKind;

/// Precedence ladder, low to high.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub(crate) enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // ()
    Primary,
}

impl Precedence {
    /// One level tighter. Parsing a binary operator's right operand at
    /// `precedence.next()` makes the operator left-associative.
    pub(crate) fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

pub(crate) type ParseFn = for<'s, 'h> fn(&mut Parser<'s, 'h>, bool);

#[derive(Clone, Copy)]
pub(crate) struct Rule {
    pub prefix: Option<ParseFn>,
    pub infix: Option<ParseFn>,
    pub precedence: Precedence,
}

impl Rule {
    fn new(prefix: Option<ParseFn>, infix: Option<ParseFn>, precedence: Precedence) -> Self {
        Rule {
            prefix,
            infix,
            precedence,
        }
    }

    fn none() -> Self {
        Rule {
            prefix: None,
            infix: None,
            precedence: Precedence::None,
        }
    }
}

/// Look up the rule for a token kind. Kinds without entries (reserved
/// keywords, punctuation with no expression role) fall through to the
/// empty rule, which surfaces "Expect expression." in prefix position.
pub(crate) fn rule_for(kind: TokenKind) -> Rule {
    use TokenKind::*;
    match kind {
        LParen => Rule::new(
            Some(|p, can| p.grouping(can)),
            Some(|p, can| p.call(can)),
            Precedence::Call,
        ),
        Minus => Rule::new(
            Some(|p, can| p.unary(can)),
            Some(|p, can| p.binary(can)),
            Precedence::Term,
        ),
        Plus => Rule::new(None, Some(|p, can| p.binary(can)), Precedence::Term),
        Slash => Rule::new(None, Some(|p, can| p.binary(can)), Precedence::Factor),
        Star => Rule::new(None, Some(|p, can| p.binary(can)), Precedence::Factor),
        Bang => Rule::new(Some(|p, can| p.unary(can)), None, Precedence::None),
        BangEqual => Rule::new(None, Some(|p, can| p.binary(can)), Precedence::Equality),
        EqualEqual => Rule::new(None, Some(|p, can| p.binary(can)), Precedence::Equality),
        Greater => Rule::new(None, Some(|p, can| p.binary(can)), Precedence::Comparison),
        GreaterEqual => Rule::new(None, Some(|p, can| p.binary(can)), Precedence::Comparison),
        Less => Rule::new(None, Some(|p, can| p.binary(can)), Precedence::Comparison),
        LessEqual => Rule::new(None, Some(|p, can| p.binary(can)), Precedence::Comparison),
        Identifier => Rule::new(Some(|p, can| p.variable(can)), None, Precedence::None),
        String => Rule::new(Some(|p, can| p.string(can)), None, Precedence::None),
        Number => Rule::new(Some(|p, can| p.number(can)), None, Precedence::None),
        Integer => Rule::new(Some(|p, can| p.integer(can)), None, Precedence::None),
        Hexadecimal => Rule::new(Some(|p, can| p.integer(can)), None, Precedence::None),
        And => Rule::new(None, Some(|p, can| p.and_(can)), Precedence::And),
        Or => Rule::new(None, Some(|p, can| p.or_(can)), Precedence::Or),
        True => Rule::new(Some(|p, can| p.literal(can)), None, Precedence::None),
        False => Rule::new(Some(|p, can| p.literal(can)), None, Precedence::None),
        Null => Rule::new(Some(|p, can| p.literal(can)), None, Precedence::None),
        // `fun` in expression position refers to the enclosing function.
        Fun => Rule::new(Some(|p, can| p.literal(can)), None, Precedence::None),
        _ => Rule::none(),
    }
}
