use std::{fmt, ops::Range};

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub pos: Pos,
    /// Whether this is the first token after a physical line break.
    pub newline: bool,
    pub value: Option<Literal>,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, pos: Pos, newline: bool) -> Token {
        Token {
            kind,
            span,
            pos,
            newline,
            value: None,
        }
    }

    pub fn with_value(mut self, value: Literal) -> Token {
        self.value = Some(value);
        self
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    pub fn text<'src>(&self, src: &'src str) -> &'src str {
        self.span.substr(src)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {}, {:?}", self.kind, self.span, self.pos)?;
        if self.newline {
            write!(f, ", nl")?;
        }
        if let Some(value) = self.value {
            write!(f, ", {value:?}")?;
        }
        write!(f, ")")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
    Bool(bool),
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Span {
    pub len: u32,
    pub lo: usize,
}

impl Span {
    pub fn new_of_bounds(Range { start: lo, end: hi }: Range<usize>) -> Span {
        debug_assert!(hi >= lo);
        // Sources are read whole into memory, so a single token never comes
        // close to `u32::MAX` bytes.
        #[allow(clippy::cast_possible_truncation)]
        Self::new_of_length(lo, (hi - lo) as u32)
    }

    pub fn new_of_length(lo: usize, len: u32) -> Span {
        Span { len, lo }
    }

    pub fn hi(&self) -> usize {
        self.lo + self.len as usize
    }

    pub fn substr<'src>(&self, src: &'src str) -> &'src str {
        &src[self.lo..self.hi()]
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, len: {})", self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.lo, self.hi())
    }
}

/// A zero-based source position. Displayed one-based, as `row:col`.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub row: u32,
    pub col: u32,
}

impl Pos {
    pub fn new(row: u32, col: u32) -> Pos {
        Pos { row, col }
    }

    pub fn wrap<T>(self, inner: T) -> Located<T> {
        Located { pos: self, inner }
    }
}

impl fmt::Debug for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pos({self})")
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row + 1, self.col + 1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Located<T> {
    pub pos: Pos,
    pub inner: T,
}

impl<T> Located<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Located<U> {
        Located {
            pos: self.pos,
            inner: f(self.inner),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Semicolon,

    Int,
    Bool,
    Ident,

    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,

    Plus,
    Minus,
    Star,
    Slash,
    /// `=`
    Assign,

    If,
    Else,
    Return,
    Fn,
    Var,
    Print,
}

impl TokenKind {
    /// The name used to refer to this kind of token in diagnostics.
    pub fn name(self) -> &'static str {
        use TokenKind::*;
        match self {
            Eof => "end of file",
            Semicolon => "';'",
            Int => "integer",
            Bool => "boolean",
            Ident => "identifier",
            LParen => "'('",
            RParen => "')'",
            LBrace => "'{'",
            RBrace => "'}'",
            Comma => "','",
            Plus => "'+'",
            Minus => "'-'",
            Star => "'*'",
            Slash => "'/'",
            Assign => "'='",
            If => "'if'",
            Else => "'else'",
            Return => "'return'",
            Fn => "'fn'",
            Var => "'var'",
            Print => "'print'",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "true" => TokenKind::Bool,
    "false" => TokenKind::Bool,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "return" => TokenKind::Return,
    "fn" => TokenKind::Fn,
    "var" => TokenKind::Var,
    "print" => TokenKind::Print,
};
