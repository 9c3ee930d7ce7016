use std::{iter::Peekable, str::Chars};

use crate::token::{Literal, Located, Pos, Span, Token, TokenKind, KEYWORDS};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 8_192;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    InvalidCharacter(char),
    /// An integer literal immediately followed by an identifier character.
    InvalidDigit(char),
    IntegerTooLarge(Box<str>),
    Expected {
        expected: &'static [TokenKind],
        actual: TokenKind,
    },
}

/// Lexes the whole input, including the final end-of-file token.
///
/// Stops at the first lexical error.
pub fn lex(src: &str, tokens: &mut Vec<Token>) -> Result<(), Located<Error>> {
    for token in Lexer::new(src) {
        tokens.push(token?);
    }
    Ok(())
}

/// A convenience function that allocates a new buffer per lexed input and
/// returns it.
pub fn lex_in_new(src: &str) -> Result<Vec<Token>, Located<Error>> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    lex(src, &mut tokens)?;
    Ok(tokens)
}

/// An on-demand lexer with a single token of lookahead.
pub struct Lexer<'src> {
    src: &'src str,
    iter: Peekable<Chars<'src>>,
    cursor: usize,
    row: u32,
    col: u32,
    current_lo: usize,
    current_pos: Pos,
    newline: bool,
    peeked: Option<Token>,
    finished: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            row: 0,
            col: 0,
            current_lo: 0,
            current_pos: Pos::default(),
            newline: false,
            peeked: None,
            finished: false,
        }
    }

    pub fn src(&self) -> &'src str {
        self.src
    }

    /// Consumes and returns the next token.
    pub fn next_token(&mut self) -> Result<Token, Located<Error>> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.scan(),
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> Result<Token, Located<Error>> {
        if let Some(token) = self.peeked {
            return Ok(token);
        }
        let token = self.scan()?;
        self.peeked = Some(token);
        Ok(token)
    }

    /// Consumes the next token only if it is of the provided kind.
    pub fn read(&mut self, kind: TokenKind) -> Result<Option<Token>, Located<Error>> {
        if self.peek()?.kind == kind {
            self.next_token().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Consumes the next token, failing if it isn't one of the provided
    /// kinds.
    pub fn expect(&mut self, expected: &'static [TokenKind]) -> Result<Token, Located<Error>> {
        let token = self.next_token()?;
        if expected.contains(&token.kind) {
            Ok(token)
        } else {
            Err(token.pos.wrap(Error::Expected {
                expected,
                actual: token.kind,
            }))
        }
    }

    fn scan(&mut self) -> Result<Token, Located<Error>> {
        use TokenKind::*;

        self.newline = false;
        self.skip_trivia();

        let c = self.mark_advance();
        if self.cursor == self.current_lo {
            return Ok(self.produce(Eof));
        }
        let kind = match c {
            ';' => Semicolon,
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            ',' => Comma,
            '+' => Plus,
            '-' => Minus,
            '*' => Star,
            '/' => Slash,
            '=' => Assign,
            c if c.is_ascii_digit() => return self.integer(),
            c if is_ident_start(c) => return Ok(self.identifier_or_keyword()),
            c => return Err(self.current_pos.wrap(Error::InvalidCharacter(c))),
        };
        Ok(self.produce(kind))
    }

    fn integer(&mut self) -> Result<Token, Located<Error>> {
        while self.peek_char().is_ascii_digit() {
            self.advance();
        }
        let suffix = self.peek_char();
        if is_ident_continue(suffix) {
            let pos = Pos::new(self.row, self.col);
            return Err(pos.wrap(Error::InvalidDigit(suffix)));
        }
        let text = self.substr();
        match text.parse::<i64>() {
            Ok(value) => Ok(self.produce(TokenKind::Int).with_value(Literal::Int(value))),
            Err(_) => Err(self.current_pos.wrap(Error::IntegerTooLarge(text.into()))),
        }
    }

    fn identifier_or_keyword(&mut self) -> Token {
        while is_ident_continue(self.peek_char()) {
            self.advance();
        }
        let text = self.substr();
        match KEYWORDS.get(text).copied() {
            Some(TokenKind::Bool) => {
                let value = Literal::Bool(text == "true");
                self.produce(TokenKind::Bool).with_value(value)
            }
            Some(keyword) => self.produce(keyword),
            None => self.produce(TokenKind::Ident),
        }
    }

    /// Skips whitespace and line comments, recording whether a line break
    /// was crossed.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                c if c.is_ascii_whitespace() => {
                    if self.advance() == '\n' {
                        self.newline = true;
                    }
                }
                '/' if self.src[self.cursor..].starts_with("//") => {
                    while !matches!(self.peek_char(), '\n' | '\0') {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }
}

impl Lexer<'_> {
    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.current_pos = Pos::new(self.row, self.col);
        self.advance()
    }

    /// Returns the next character and advances the iterator.
    fn advance(&mut self) -> char {
        let Some(c) = self.iter.next() else {
            return '\0';
        };
        self.cursor += c.len_utf8();
        if c == '\n' {
            self.row += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        c
    }

    /// Returns the next character without advancing the iterator.
    fn peek_char(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Returns the substring of the current marked bounds.
    fn substr(&self) -> &str {
        self.span().substr(self.src)
    }

    /// Produces a token using the marked bounds.
    fn produce(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.span(), self.current_pos, self.newline)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, Located<Error>>;

    /// Yields every token up to and including the end of file, or up to the
    /// first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let next = self.next_token();
        self.finished = next.as_ref().map_or(true, Token::is_eof);
        Some(next)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_demos_no_errors() {
        for input in [
            include_str!("../demos/fib.glos"),
            include_str!("../demos/shadowing.glos"),
        ] {
            assert!(lex_in_new(input).is_ok());
        }
    }

    #[test]
    fn tests_with_span() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "+-*/" => [
                (Plus, 0..1),
                (Minus, 1..2),
                (Star, 2..3),
                (Slash, 3..4),
                (Eof, 4..4),
            ],
            "(){},;=" => [
                (LParen, 0..1),
                (RParen, 1..2),
                (LBrace, 2..3),
                (RBrace, 3..4),
                (Comma, 4..5),
                (Semicolon, 5..6),
                (Assign, 6..7),
                (Eof, 7..7),
            ],
            "fn var if else return print" => [
                (Fn, 0..2),
                (Var, 3..6),
                (If, 7..9),
                (Else, 10..14),
                (Return, 15..21),
                (Print, 22..27),
                (Eof, 27..27),
            ],
            "f/fo/_foo/B/a123z/fnx" => [
                (Ident, 0..1),
                (Slash, 1..2),
                (Ident, 2..4),
                (Slash, 4..5),
                (Ident, 5..9),
                (Slash, 9..10),
                (Ident, 10..11),
                (Slash, 11..12),
                (Ident, 12..17),
                (Slash, 17..18),
                (Ident, 18..21),
                (Eof, 21..21),
            ],
            "1/11/0 // comment\n  true" => [
                (Int, 0..1),
                (Slash, 1..2),
                (Int, 2..4),
                (Slash, 4..5),
                (Int, 5..6),
                (Bool, 20..24),
                (Eof, 24..24),
            ],
        });
        for (src, expected) in cases {
            let actual: Vec<_> = lex_in_new(src)
                .unwrap()
                .into_iter()
                .map(|t| (t.kind, t.span))
                .collect();
            assert_eq!(&actual, expected, "input: {src:?}");
        }
    }

    #[test]
    fn test_literal_values() {
        let tokens = lex_in_new("42 true false 9223372036854775807").unwrap();
        let values: Vec<_> = tokens.iter().map(|t| t.value).collect();
        assert_eq!(
            values,
            [
                Some(Literal::Int(42)),
                Some(Literal::Bool(true)),
                Some(Literal::Bool(false)),
                Some(Literal::Int(i64::MAX)),
                None,
            ]
        );
    }

    #[test]
    fn test_positions_and_newlines() {
        let tokens = lex_in_new("a\n  b c\n\n// x\nd").unwrap();
        let actual: Vec<_> = tokens
            .iter()
            .map(|t| (t.pos.row, t.pos.col, t.newline))
            .collect();
        assert_eq!(
            actual,
            [(0, 0, false), (1, 2, true), (1, 4, false), (4, 0, true), (4, 1, false)]
        );
    }

    #[test]
    fn test_errors() {
        let cases = [
            ("  $", Pos::new(0, 2), Error::InvalidCharacter('$')),
            ("12ab", Pos::new(0, 2), Error::InvalidDigit('a')),
            ("\n 1_", Pos::new(1, 2), Error::InvalidDigit('_')),
            (
                "99999999999999999999",
                Pos::new(0, 0),
                Error::IntegerTooLarge("99999999999999999999".into()),
            ),
        ];
        for (src, pos, error) in cases {
            assert_eq!(lex_in_new(src), Err(pos.wrap(error)), "input: {src:?}");
        }
    }

    #[test]
    fn test_peek_read_expect() {
        let mut lexer = Lexer::new("var x = 1");
        assert_eq!(lexer.peek().unwrap().kind, TokenKind::Var);
        assert_eq!(lexer.peek().unwrap().kind, TokenKind::Var);
        assert!(lexer.read(TokenKind::Fn).unwrap().is_none());
        assert!(lexer.read(TokenKind::Var).unwrap().is_some());
        assert_eq!(lexer.expect(&[TokenKind::Ident]).unwrap().span, Span::new_of_length(4, 1));
        assert_eq!(
            lexer.expect(&[TokenKind::Semicolon, TokenKind::Comma]),
            Err(Pos::new(0, 6).wrap(Error::Expected {
                expected: &[TokenKind::Semicolon, TokenKind::Comma],
                actual: TokenKind::Assign,
            }))
        );
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Int);
        assert!(lexer.next_token().unwrap().is_eof());
        assert!(lexer.next_token().unwrap().is_eof());
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $range:expr)),* $(,)?]),* $(,)?
        }) => {{
            &[$((
                $str,
                vec![
                    $(($kind, Span::new_of_bounds($range.start..$range.end))),*
                ],
            )),*]
        }};
    }
    use cases;
}
