#![allow(clippy::items_after_statements)]

use std::{fmt, io};

use crate::{
    driver, lexer, parser,
    token::{Located, Pos, TokenKind},
    type_checker,
    util::fmt::{Context, Show},
};

/// The text of an error, without its position.
pub trait Message {
    fn message(&self, f: &mut fmt::Formatter<'_>, ctx: &Context<'_>) -> fmt::Result;

    /// The position of the conflicting definition, for redefinitions.
    fn note(&self) -> Option<Pos> {
        None
    }
}

impl<E: Message> Show for Located<E> {
    /// The alternate form is prefixed with the position, as in `1:5: ...`.
    fn show(&self, f: &mut fmt::Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{}: ", self.pos)?;
        }
        self.inner.message(f, ctx)
    }
}

/// Writes `path:row:col: ERROR: message`, followed by a `NOTE` line pointing
/// at the previous definition for redefinitions.
pub fn report(w: &mut impl io::Write, ctx: &Context<'_>, error: &driver::Error) -> io::Result<()> {
    let path = ctx.path;
    match error.pos() {
        Some(pos) => writeln!(w, "{path}:{pos}: ERROR: {}", error.display(ctx))?,
        None => writeln!(w, "ERROR: {}", error.display(ctx))?,
    }
    if let Some(note) = error.note() {
        writeln!(w, "{path}:{note}: NOTE: defined here")?;
    }
    Ok(())
}

impl Show for driver::Error {
    fn show(&self, f: &mut fmt::Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        use driver::Error::*;
        match self {
            Syntax(error) => error.inner.message(f, ctx),
            Semantic(error) => error.inner.message(f, ctx),
            Codegen(error) => write!(f, "{error}"),
            Read { path, source } => write!(f, "could not read file '{path}': {source}"),
            Write { path, source } => write!(f, "could not write file '{path}': {source}"),
            Spawn { program, source } => write!(f, "could not run '{program}': {source}"),
            Linker { program, code } => write!(f, "'{program}' exited with status {code}"),
        }
    }
}

impl Message for lexer::Error {
    fn message(&self, f: &mut fmt::Formatter<'_>, _: &Context<'_>) -> fmt::Result {
        use lexer::Error::*;
        match self {
            InvalidCharacter(c) if c.is_control() => {
                write!(f, "invalid character ({})", u32::from(*c))
            }
            InvalidCharacter(c) => write!(f, "invalid character '{c}'"),
            InvalidDigit(c) => write!(f, "invalid digit '{c}'"),
            IntegerTooLarge(text) => write!(f, "integer literal '{text}' is too large"),
            Expected { expected, actual } => {
                write!(f, "expected {}, got {actual}", OneOf(expected))
            }
        }
    }
}

impl Message for parser::Error {
    fn message(&self, f: &mut fmt::Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        let i = ctx.ident_interner;

        use parser::Error::*;
        match self {
            Lexer(error) => error.message(f, ctx),
            Unexpected(kind) => write!(f, "unexpected {kind}"),
            UnexpectedInGlobalScope(kind) => write!(f, "unexpected {kind} in global scope"),
            DuplicateParameter { name, .. } => {
                write!(f, "redefinition of argument '{}'", i.get(*name))
            }
        }
    }

    fn note(&self) -> Option<Pos> {
        match self {
            parser::Error::DuplicateParameter { previous, .. } => Some(*previous),
            _ => None,
        }
    }
}

impl Message for type_checker::Error {
    fn message(&self, f: &mut fmt::Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        let i = ctx.ident_interner;

        use type_checker::Error::*;
        match self {
            UndefinedIdentifier(name) => write!(f, "undefined identifier '{}'", i.get(*name)),
            UndefinedType(name) => write!(f, "undefined type '{}'", i.get(*name)),
            Redefinition { name, .. } => {
                write!(f, "redefinition of identifier '{}'", i.get(*name))
            }
            Mismatch { expected, actual } => {
                write!(f, "expected type '{expected}', got '{actual}'")
            }
            NotArithmetic(ty) => write!(f, "expected arithmetic type, got '{ty}'"),
            NotScalar(ty) => write!(f, "expected scalar type, got '{ty}'"),
            NotCallable(ty) => write!(f, "cannot call type '{ty}'"),
            ArityMismatch { expected, actual } => {
                let plural = if *expected == 1 { "" } else { "s" };
                write!(f, "expected {expected} argument{plural}, got {actual}")
            }
            NotInMemory => write!(f, "cannot take reference to value not in memory"),
            UnitVariable => write!(f, "cannot define variable with type '()'"),
            MainUndefined => write!(f, "function 'main' is not defined"),
            MainNotFunction => write!(f, "function 'main' must be a function literal"),
            MainHasParameters => write!(f, "function 'main' cannot take any arguments"),
            MainReturnsValue => write!(f, "function 'main' cannot return anything"),
        }
    }

    fn note(&self) -> Option<Pos> {
        match self {
            type_checker::Error::Redefinition { previous, .. } => Some(*previous),
            _ => None,
        }
    }
}

/// Lists token kinds as `a`, `a or b`, or `a, b or c`.
struct OneOf<'a>(&'a [TokenKind]);

impl fmt::Display for OneOf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.len();
        for (i, kind) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(if i + 1 == len { " or " } else { ", " })?;
            }
            write!(f, "{kind}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::intern::Interner;
    use pretty_assertions::assert_eq;

    fn render(error: &driver::Error, interner: &Interner) -> String {
        let ctx = Context {
            ident_interner: interner,
            path: "demo.glos",
        };
        let mut buf = Vec::new();
        report(&mut buf, &ctx, error).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn report_with_note() {
        let mut interner = Interner::default();
        let name = interner.intern("x");
        let error = Pos::new(1, 4).wrap(type_checker::Error::Redefinition {
            name,
            previous: Pos::new(0, 4),
        });
        assert_eq!(
            render(&driver::Error::Semantic(error), &interner),
            "demo.glos:2:5: ERROR: redefinition of identifier 'x'\n\
             demo.glos:1:5: NOTE: defined here\n"
        );
    }

    #[test]
    fn report_lexer_error() {
        let interner = Interner::default();
        let error = Pos::new(0, 2).wrap(parser::Error::Lexer(lexer::Error::InvalidCharacter('\u{7}')));
        assert_eq!(
            render(&driver::Error::Syntax(error), &interner),
            "demo.glos:1:3: ERROR: invalid character (7)\n"
        );
    }

    #[test]
    fn report_without_position() {
        let interner = Interner::default();
        let error = driver::Error::Linker {
            program: "cc".into(),
            code: 4,
        };
        assert_eq!(render(&error, &interner), "ERROR: 'cc' exited with status 4\n");
    }

    #[test]
    fn one_of() {
        use TokenKind::*;
        assert_eq!(OneOf(&[RParen]).to_string(), "')'");
        assert_eq!(OneOf(&[Comma, RParen]).to_string(), "',' or ')'");
        assert_eq!(OneOf(&[Ident, Fn, LParen]).to_string(), "identifier, 'fn' or '('");
    }
}
