use crate::{
    ast::{self, Ast, Atom, BinaryOperator, NodeId, NodeKind, Nodes, Program, UnaryOperator, Var, VarKind},
    lexer::{self, Lexer},
    token::{Literal, Located, Pos, Token, TokenKind},
    util::intern::{Interned, Interner},
};

pub type Result<T, E = Located<Error>> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Lexer(lexer::Error),
    Unexpected(TokenKind),
    /// Only declarations may appear outside of a function.
    UnexpectedInGlobalScope(TokenKind),
    DuplicateParameter {
        name: Interned,
        previous: Pos,
    },
}

impl From<Located<lexer::Error>> for Located<Error> {
    fn from(error: Located<lexer::Error>) -> Self {
        error.map(Error::Lexer)
    }
}

pub fn parse_program(src: &str, interner: &mut Interner) -> Result<Program> {
    let mut p = Parser::new(src, interner);
    let nodes = p.parse_program()?;
    Ok(Program { ast: p.ast, nodes })
}

/// Parses a single expression, as if it were a statement inside a function.
/// The returned program holds that expression as its only node.
pub fn parse_expr(src: &str, interner: &mut Interner) -> Result<Program> {
    let mut p = Parser::new(src, interner);
    p.local = true;
    let expr = p.parse_expr(Power::Nil)?;
    p.expect(&[TokenKind::Eof])?;
    let mut nodes = Nodes::default();
    p.ast.append(&mut nodes, expr);
    Ok(Program { ast: p.ast, nodes })
}

/// Binding powers, from loosest to tightest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Power {
    Nil,
    Set,
    Add,
    Mul,
    Pre,
    Dot,
}

impl Power {
    fn of(kind: TokenKind) -> Power {
        match kind {
            TokenKind::LParen => Power::Dot,
            TokenKind::Star | TokenKind::Slash => Power::Mul,
            TokenKind::Plus | TokenKind::Minus => Power::Add,
            TokenKind::Assign => Power::Set,
            _ => Power::Nil,
        }
    }
}

struct Parser<'src, 'ident> {
    lexer: Lexer<'src>,
    interner: &'ident mut Interner,
    ast: Ast,
    /// Whether the parser is inside a function body.
    local: bool,
}

impl<'src, 'ident> Parser<'src, 'ident> {
    fn new(src: &'src str, interner: &'ident mut Interner) -> Parser<'src, 'ident> {
        Parser {
            lexer: Lexer::new(src),
            interner,
            ast: Ast::with_capacity(src.len() / 4),
            local: false,
        }
    }
}

impl Parser<'_, '_> {
    fn parse_program(&mut self) -> Result<Nodes> {
        let mut nodes = Nodes::default();
        loop {
            self.skip_terminators()?;
            if self.peek()?.is_eof() {
                break;
            }
            let stmt = self.parse_stmt()?;
            self.ast.append(&mut nodes, stmt);
        }
        Ok(nodes)
    }

    fn parse_stmt(&mut self) -> Result<NodeId> {
        use TokenKind::*;

        let token = self.peek()?;
        if !self.local && !matches!(token.kind, Fn | Var) {
            return Err(token.pos.wrap(Error::UnexpectedInGlobalScope(token.kind)));
        }
        let stmt = match token.kind {
            LBrace => self.parse_block()?,
            If => self.parse_if()?,
            Return => self.parse_return()?,
            Fn => self.parse_fn_decl()?,
            Var => self.parse_var()?,
            Print => {
                let token = self.advance()?;
                let operand = self.parse_expr(Power::Set)?;
                self.ast.push(NodeKind::Print { operand }, token)
            }
            _ => self.parse_expr(Power::Nil)?,
        };
        self.skip_terminators()?;
        Ok(stmt)
    }

    fn parse_block(&mut self) -> Result<NodeId> {
        let token = self.expect(&[TokenKind::LBrace])?;
        let mut body = Nodes::default();
        loop {
            self.skip_terminators()?;
            if self.take(TokenKind::RBrace)?.is_some() {
                break;
            }
            let stmt = self.parse_stmt()?;
            self.ast.append(&mut body, stmt);
        }
        Ok(self.ast.push(NodeKind::Block { body }, token))
    }

    fn parse_if(&mut self) -> Result<NodeId> {
        let token = self.expect(&[TokenKind::If])?;
        let condition = self.parse_expr(Power::Set)?;
        let consequence = self.parse_block()?;
        let antecedence = if self.take(TokenKind::Else)?.is_some() {
            match self.peek()?.kind {
                TokenKind::If => Some(self.parse_if()?),
                _ => {
                    self.expect_peek(&[TokenKind::LBrace, TokenKind::If])?;
                    Some(self.parse_block()?)
                }
            }
        } else {
            None
        };
        let kind = NodeKind::If {
            condition,
            consequence,
            antecedence,
        };
        Ok(self.ast.push(kind, token))
    }

    fn parse_return(&mut self) -> Result<NodeId> {
        let token = self.expect(&[TokenKind::Return])?;
        let next = self.peek()?;
        let omitted = next.newline
            || matches!(
                next.kind,
                TokenKind::RBrace | TokenKind::Semicolon | TokenKind::Eof
            );
        let value = if omitted {
            None
        } else {
            Some(self.parse_expr(Power::Set)?)
        };
        Ok(self.ast.push(NodeKind::Return { value }, token))
    }

    /// Parses `fn NAME(PARAMS) [RET] { ... }`.
    fn parse_fn_decl(&mut self) -> Result<NodeId> {
        self.expect(&[TokenKind::Fn])?;
        let name_token = self.expect(&[TokenKind::Ident])?;
        let name = self.intern(name_token);
        self.parse_fn_rest(name_token, Some(name))
    }

    /// Parses the parameter list, return type and body of a function whose
    /// header was already consumed. The node is located at `token`.
    fn parse_fn_rest(&mut self, token: Token, name: Option<Interned>) -> Result<NodeId> {
        self.expect(&[TokenKind::LParen])?;
        let mut params = Nodes::default();
        let mut arity = 0;
        while self.take(TokenKind::RParen)?.is_none() {
            if arity > 0 {
                self.expect(&[TokenKind::Comma])?;
            }
            let param = self.parse_param(params)?;
            self.ast.append(&mut params, param);
            arity += 1;
        }
        let ret = self.parse_return_type()?;

        self.expect_peek(&[TokenKind::LBrace])?;
        let local_save = self.local;
        self.local = true;
        let body = self.parse_block();
        self.local = local_save;
        let body = body?;

        let kind = NodeKind::Fn(ast::Fn {
            name,
            params,
            arity,
            ret,
            body: Some(body),
            local: self.local,
        });
        Ok(self.ast.push(kind, token))
    }

    /// Parses `NAME TYPE`, rejecting a name already used in `previous`.
    fn parse_param(&mut self, previous: Nodes) -> Result<NodeId> {
        let token = self.expect(&[TokenKind::Ident])?;
        let name = self.intern(token);
        let duplicate = self
            .ast
            .iter(previous)
            .find(|&id| self.ast[id].name() == Some(name));
        if let Some(duplicate) = duplicate {
            let previous = self.ast[duplicate].token.pos;
            return Err(token.pos.wrap(Error::DuplicateParameter { name, previous }));
        }
        let ty = self.parse_type()?;
        let kind = NodeKind::Var(Var {
            name,
            ty: Some(ty),
            init: None,
            kind: VarKind::Param,
        });
        Ok(self.ast.push(kind, token))
    }

    /// Parses an identifier type or a `fn(T, ...) [T]` signature.
    fn parse_type(&mut self) -> Result<NodeId> {
        let token = self.expect(&[TokenKind::Ident, TokenKind::Fn])?;
        if token.kind == TokenKind::Ident {
            let value = Atom::Ident(self.intern(token));
            let kind = NodeKind::Atom {
                value,
                definition: None,
            };
            return Ok(self.ast.push(kind, token));
        }

        self.expect(&[TokenKind::LParen])?;
        let mut params = Nodes::default();
        let mut arity = 0;
        while self.take(TokenKind::RParen)?.is_none() {
            if arity > 0 {
                self.expect(&[TokenKind::Comma])?;
            }
            let param = self.parse_type()?;
            self.ast.append(&mut params, param);
            arity += 1;
        }
        let ret = self.parse_return_type()?;
        let kind = NodeKind::Fn(ast::Fn {
            name: None,
            params,
            arity,
            ret,
            body: None,
            local: self.local,
        });
        Ok(self.ast.push(kind, token))
    }

    /// A return type must start on the same line as the parameter list.
    fn parse_return_type(&mut self) -> Result<Option<NodeId>> {
        let next = self.peek()?;
        if !next.newline && matches!(next.kind, TokenKind::Ident | TokenKind::Fn) {
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    /// Parses `var NAME [TYPE] [= EXPR]`.
    fn parse_var(&mut self) -> Result<NodeId> {
        self.expect(&[TokenKind::Var])?;
        let token = self.expect(&[TokenKind::Ident])?;
        let name = self.intern(token);

        let next = self.peek()?;
        let has_type = !next.newline
            && !matches!(
                next.kind,
                TokenKind::Assign | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
            );
        let ty = if has_type {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.take(TokenKind::Assign)?.is_some() {
            Some(self.parse_expr(Power::Set)?)
        } else {
            None
        };

        let kind = if self.local {
            VarKind::Local
        } else {
            VarKind::Global
        };
        let var = Var {
            name,
            ty,
            init,
            kind,
        };
        Ok(self.ast.push(NodeKind::Var(var), token))
    }

    fn parse_expr(&mut self, min: Power) -> Result<NodeId> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let op_token = self.peek()?;
            if op_token.newline {
                // An operator on the next line starts a new statement.
                break;
            }
            let power = Power::of(op_token.kind);
            if power <= min {
                break;
            }
            self.advance()?;

            lhs = match op_token.kind {
                TokenKind::LParen => self.parse_call(op_token, lhs)?,
                kind => {
                    let op = match kind {
                        TokenKind::Plus => BinaryOperator::Add,
                        TokenKind::Minus => BinaryOperator::Sub,
                        TokenKind::Star => BinaryOperator::Mul,
                        TokenKind::Slash => BinaryOperator::Div,
                        _ => BinaryOperator::Assign,
                    };
                    let rhs = self.parse_expr(power)?;
                    self.ast.push(NodeKind::Binary { op, lhs, rhs }, op_token)
                }
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<NodeId> {
        let token = self.advance()?;
        let value = match (token.kind, token.value) {
            (TokenKind::Int, Some(Literal::Int(n))) => Atom::Int(n),
            (TokenKind::Bool, Some(Literal::Bool(b))) => Atom::Bool(b),
            (TokenKind::Ident, _) => Atom::Ident(self.intern(token)),
            (TokenKind::Minus, _) => {
                let operand = self.parse_expr(Power::Pre)?;
                let kind = NodeKind::Unary {
                    op: UnaryOperator::Neg,
                    operand,
                };
                return Ok(self.ast.push(kind, token));
            }
            (TokenKind::LParen, _) => {
                let inner = self.parse_expr(Power::Set)?;
                self.expect(&[TokenKind::RParen])?;
                return Ok(inner);
            }
            (TokenKind::Fn, _) => return self.parse_fn_rest(token, None),
            (kind, _) => return Err(token.pos.wrap(Error::Unexpected(kind))),
        };
        let kind = NodeKind::Atom {
            value,
            definition: None,
        };
        Ok(self.ast.push(kind, token))
    }

    /// Parses the argument list of a call whose `(` was already consumed.
    fn parse_call(&mut self, token: Token, callee: NodeId) -> Result<NodeId> {
        let mut args = Nodes::default();
        let mut arity = 0;
        while self.take(TokenKind::RParen)?.is_none() {
            if arity > 0 {
                self.expect(&[TokenKind::Comma])?;
            }
            let arg = self.parse_expr(Power::Set)?;
            self.ast.append(&mut args, arg);
            arity += 1;
        }
        let kind = NodeKind::Call {
            callee,
            args,
            arity,
        };
        Ok(self.ast.push(kind, token))
    }
}

impl Parser<'_, '_> {
    fn intern(&mut self, token: Token) -> Interned {
        self.interner.intern(token.text(self.lexer.src()))
    }

    fn skip_terminators(&mut self) -> Result<()> {
        while self.take(TokenKind::Semicolon)?.is_some() {}
        Ok(())
    }

    /// Returns the current token without advancing.
    fn peek(&mut self) -> Result<Token> {
        Ok(self.lexer.peek()?)
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Result<Token> {
        Ok(self.lexer.next_token()?)
    }

    /// Advances if the current token matches the provided one.
    fn take(&mut self, kind: TokenKind) -> Result<Option<Token>> {
        Ok(self.lexer.read(kind)?)
    }

    /// Advances if the current token is any of the provided ones, failing
    /// otherwise.
    fn expect(&mut self, expected: &'static [TokenKind]) -> Result<Token> {
        Ok(self.lexer.expect(expected)?)
    }

    /// Like [`Parser::expect`], but doesn't advance.
    fn expect_peek(&mut self, expected: &'static [TokenKind]) -> Result<Token> {
        let token = self.peek()?;
        if expected.contains(&token.kind) {
            Ok(token)
        } else {
            let error = lexer::Error::Expected {
                expected,
                actual: token.kind,
            };
            Err(token.pos.wrap(Error::Lexer(error)))
        }
    }
}
