//! Lexer and parser for canonical schedule strings.
//!
//! A schedule is a `|`-separated list of tokens such as
//! `I(L0,L1,comps=['s'])|U(L1,4,comps=['s'])`. Parsing yields the raw
//! arguments of each token; resolving levels to loops needs the tree state
//! each token was recorded against, which is the schedule's job.

use crate::transform::TransformKind;
use crate::utils::errors::{ParseError, ParseErrorKind};
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

/// Lexical token kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Equals,
    Pipe,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "`{name}`"),
            TokenKind::Int(value) => write!(f, "`{value}`"),
            TokenKind::Str(text) => write!(f, "'{text}'"),
            TokenKind::LParen => f.write_str("`(`"),
            TokenKind::RParen => f.write_str("`)`"),
            TokenKind::LBracket => f.write_str("`[`"),
            TokenKind::RBracket => f.write_str("`]`"),
            TokenKind::Comma => f.write_str("`,`"),
            TokenKind::Equals => f.write_str("`=`"),
            TokenKind::Pipe => f.write_str("`|`"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// A lexer for canonical strings.
pub(crate) struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, chars: source.char_indices().peekable() }
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map(|(idx, _)| *idx).unwrap_or(self.source.len())
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset();
        while self.chars.peek().is_some_and(|(_, c)| pred(*c)) {
            self.chars.next();
        }
        let end = self.offset();
        let source = self.source;
        &source[start..end]
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.take_while(char::is_whitespace);
        let offset = self.offset();
        let Some(&(_, c)) = self.chars.peek() else {
            return Ok(Token { kind: TokenKind::Eof, offset });
        };
        let single = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ',' => Some(TokenKind::Comma),
            '=' => Some(TokenKind::Equals),
            '|' => Some(TokenKind::Pipe),
            _ => None,
        };
        if let Some(kind) = single {
            self.chars.next();
            return Ok(Token { kind, offset });
        }

        let kind = match c {
            '\'' => {
                self.chars.next();
                let text = self.take_while(|c| c != '\'');
                if self.chars.next().is_none() {
                    return Err(ParseError::new(
                        ParseErrorKind::UnterminatedString,
                        "Unterminated name",
                        offset,
                    ));
                }
                TokenKind::Str(text.to_string())
            }
            '-' | '0'..='9' => {
                if c == '-' {
                    self.chars.next();
                }
                let digits = self.take_while(|c| c.is_ascii_digit());
                let text = &self.source[offset..offset + (c == '-') as usize + digits.len()];
                let value = text.parse::<i64>().map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidNumber, "Invalid integer", offset).with_found(text)
                })?;
                TokenKind::Int(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                TokenKind::Ident(self.take_while(|c| c.is_ascii_alphanumeric() || c == '_').to_string())
            }
            other => {
                return Err(ParseError::new(ParseErrorKind::UnexpectedChar, "Unexpected character", offset)
                    .with_found(other.to_string()));
            }
        };
        Ok(Token { kind, offset })
    }
}

/// Raw arguments of one canonical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalToken {
    /// Transformation kind named by the tag
    pub kind: TransformKind,
    /// `L<n>` arguments in order
    pub levels: Vec<usize>,
    /// Bare integer arguments in order
    pub params: Vec<i64>,
    /// `comps=[...]`
    pub comps: Vec<String>,
    /// `distribution=[[...], ...]`
    pub groups: Vec<Vec<String>>,
    /// Coefficient list of a matrix token
    pub matrix: Vec<i64>,
    /// Byte offset of the tag
    pub offset: usize,
}

impl CanonicalToken {
    fn new(kind: TransformKind, offset: usize) -> Self {
        Self {
            kind,
            levels: Vec::new(),
            params: Vec::new(),
            comps: Vec::new(),
            groups: Vec::new(),
            matrix: Vec::new(),
            offset,
        }
    }

    /// Number of `L<n>` and integer arguments each kind takes.
    fn arity(kind: TransformKind) -> (usize, usize) {
        match kind {
            TransformKind::Interchange => (2, 0),
            TransformKind::Reversal => (1, 0),
            TransformKind::Skewing => (2, 2),
            TransformKind::Tiling2D => (2, 2),
            TransformKind::Tiling3D => (3, 3),
            TransformKind::Unrolling => (1, 1),
            TransformKind::Fusion => (1, 0),
            TransformKind::Distribution => (1, 0),
            TransformKind::Parallelization => (1, 0),
            TransformKind::Matrix => (0, 0),
        }
    }

    fn check_arguments(&self) -> Result<(), ParseError> {
        let invalid = |msg: String| ParseError::new(ParseErrorKind::InvalidArguments, msg, self.offset);
        let (levels, params) = Self::arity(self.kind);
        if self.levels.len() != levels || self.params.len() != params {
            return Err(invalid(format!(
                "{} takes {} levels and {} integers, got {} and {}",
                self.kind,
                levels,
                params,
                self.levels.len(),
                self.params.len()
            )));
        }
        if self.comps.is_empty() {
            return Err(invalid(format!("{} is missing its statement list", self.kind)));
        }
        if (self.kind == TransformKind::Matrix) == self.matrix.is_empty() {
            return Err(invalid(format!("coefficient list is only valid for {}", TransformKind::Matrix)));
        }
        if !self.groups.is_empty() && self.kind != TransformKind::Distribution {
            return Err(invalid(format!("{} does not take a distribution", self.kind)));
        }
        Ok(())
    }
}

/// Parser for canonical schedule strings.
pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current.kind == *kind
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let kind = if self.current.kind == TokenKind::Eof {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::ExpectedToken
        };
        ParseError::new(kind, format!("Expected {expected}"), self.current.offset)
            .expecting(expected)
            .with_found(self.current.kind.to_string())
    }

    fn consume(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(&kind) {
            self.advance()
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    /// Parse a whole schedule. The empty string is the empty schedule.
    pub fn parse_schedule(&mut self) -> Result<Vec<CanonicalToken>, ParseError> {
        let mut tokens = Vec::new();
        if self.check(&TokenKind::Eof) {
            return Ok(tokens);
        }
        loop {
            tokens.push(self.parse_token()?);
            match self.current.kind {
                TokenKind::Pipe => {
                    self.advance()?;
                }
                TokenKind::Eof => return Ok(tokens),
                _ => return Err(self.unexpected("`|`")),
            }
        }
    }

    fn parse_token(&mut self) -> Result<CanonicalToken, ParseError> {
        let Token { kind, offset } = self.advance()?;
        let tag = match kind {
            TokenKind::Ident(tag) => tag,
            other => {
                return Err(ParseError::new(ParseErrorKind::UnexpectedToken, "Expected a transformation tag", offset)
                    .expecting("transformation tag")
                    .with_found(other.to_string()));
            }
        };
        let kind = TransformKind::from_tag(&tag).ok_or_else(|| {
            ParseError::new(ParseErrorKind::UnknownTransformation, "Unknown transformation", offset).with_found(tag.clone())
        })?;

        let mut token = CanonicalToken::new(kind, offset);
        self.consume(TokenKind::LParen)?;
        loop {
            self.parse_argument(&mut token)?;
            if self.check(&TokenKind::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.consume(TokenKind::RParen)?;
        token.check_arguments()?;
        Ok(token)
    }

    fn parse_argument(&mut self, token: &mut CanonicalToken) -> Result<(), ParseError> {
        let Token { kind, offset } = self.advance()?;
        match kind {
            TokenKind::Int(value) => token.params.push(value),
            TokenKind::LBracket => token.matrix = self.parse_int_list_tail()?,
            TokenKind::Ident(name) if name == "comps" => {
                self.consume(TokenKind::Equals)?;
                token.comps = self.parse_name_list()?;
            }
            TokenKind::Ident(name) if name == "distribution" => {
                self.consume(TokenKind::Equals)?;
                self.consume(TokenKind::LBracket)?;
                loop {
                    token.groups.push(self.parse_name_list()?);
                    if self.check(&TokenKind::Comma) {
                        self.advance()?;
                    } else {
                        break;
                    }
                }
                self.consume(TokenKind::RBracket)?;
            }
            TokenKind::Ident(name) => {
                let level = name
                    .strip_prefix('L')
                    .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                    .ok_or_else(|| {
                        ParseError::new(ParseErrorKind::UnexpectedToken, "Unexpected argument", offset)
                            .expecting("`L<level>`")
                            .with_found(name.clone())
                    })?;
                let level = level.parse::<usize>().map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidNumber, "Invalid level", offset).with_found(name.clone())
                })?;
                token.levels.push(level);
            }
            other => {
                return Err(ParseError::new(ParseErrorKind::UnexpectedToken, "Unexpected argument", offset)
                    .with_found(other.to_string()));
            }
        }
        Ok(())
    }

    /// `['a', 'b']`, possibly empty.
    fn parse_name_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.consume(TokenKind::LBracket)?;
        let mut names = Vec::new();
        if self.check(&TokenKind::RBracket) {
            self.advance()?;
            return Ok(names);
        }
        loop {
            match self.advance()? {
                Token { kind: TokenKind::Str(name), .. } => names.push(name),
                Token { kind, offset } => {
                    return Err(ParseError::new(ParseErrorKind::ExpectedToken, "Expected a quoted name", offset)
                        .expecting("quoted name")
                        .with_found(kind.to_string()));
                }
            }
            if self.check(&TokenKind::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.consume(TokenKind::RBracket)?;
        Ok(names)
    }

    /// Integers up to the closing `]`; the opening bracket is consumed.
    fn parse_int_list_tail(&mut self) -> Result<Vec<i64>, ParseError> {
        let mut values = Vec::new();
        loop {
            match self.advance()? {
                Token { kind: TokenKind::Int(value), .. } => values.push(value),
                Token { kind, offset } => {
                    return Err(ParseError::new(ParseErrorKind::ExpectedToken, "Expected an integer", offset)
                        .expecting("integer")
                        .with_found(kind.to_string()));
                }
            }
            if self.check(&TokenKind::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.consume(TokenKind::RBracket)?;
        Ok(values)
    }
}

/// Parse a canonical schedule string into its tokens.
pub fn parse(text: &str) -> Result<Vec<CanonicalToken>, ParseError> {
    Parser::new(text)?.parse_schedule()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_lexer_kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut kinds = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token.kind == TokenKind::Eof {
                return kinds;
            }
            kinds.push(token.kind);
        }
    }

    #[test]
    fn test_lexer() {
        assert_eq!(
            make_test_lexer_kinds("T2(L0,-3,comps=['a b'])|"),
            vec![
                TokenKind::Ident("T2".to_string()),
                TokenKind::LParen,
                TokenKind::Ident("L0".to_string()),
                TokenKind::Comma,
                TokenKind::Int(-3),
                TokenKind::Comma,
                TokenKind::Ident("comps".to_string()),
                TokenKind::Equals,
                TokenKind::LBracket,
                TokenKind::Str("a b".to_string()),
                TokenKind::RBracket,
                TokenKind::RParen,
                TokenKind::Pipe,
            ]
        );
    }

    #[test]
    fn test_parse_simple_tokens() {
        let tokens = parse("I(L0,L1,comps=['s'])|U(L1,4,comps=['s'])").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TransformKind::Interchange);
        assert_eq!(tokens[0].levels, vec![0, 1]);
        assert_eq!(tokens[1].params, vec![4]);
        assert_eq!(tokens[1].offset, 21);
    }

    #[test]
    fn test_parse_lists() {
        let tokens = parse("F(L0,comps=['s1','s2'])").unwrap();
        assert_eq!(tokens[0].comps, vec!["s1", "s2"]);

        let tokens = parse("D(L1,comps=['a', 'b'],distribution=[['a'], ['b']])").unwrap();
        assert_eq!(tokens[0].groups, vec![vec!["a"], vec!["b"]]);

        let tokens = parse("M([1, 0, 0, -1],comps=['s'])").unwrap();
        assert_eq!(tokens[0].matrix, vec![1, 0, 0, -1]);
        assert!(tokens[0].levels.is_empty());
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let err = parse("X(L0,comps=['s'])").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownTransformation);

        let err = parse("I(L0,comps=['s'])").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidArguments);

        let err = parse("R(L0)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidArguments);

        let err = parse("R(L0,comps=['s)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);

        let err = parse("R(L0,comps=['s']").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);

        let err = parse("R(L0,comps=['s'])R").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedToken);
        assert_eq!(err.offset, 17);

        let err = parse("R(Lx,comps=['s'])").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);

        let err = parse("R(L0,comps=['s'])#").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedChar);

        let err = parse("U(L0,99999999999999999999,comps=['s'])").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidNumber);
    }
}
