use std::{fmt, ops};

use crate::{token::Token, types::Type, util::intern::Interned};

/// A handle to a node owned by an [`Ast`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The arena owning every node of one compilation. Nodes are never removed
/// individually.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn with_capacity(capacity: usize) -> Ast {
        Ast {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, kind: NodeKind, token: Token) -> NodeId {
        let id = u32::try_from(self.nodes.len()).unwrap_or(u32::MAX);
        self.nodes.push(Node {
            kind,
            ty: None,
            token,
            next: None,
        });
        NodeId(id)
    }

    /// Appends `id` to the end of the provided sibling chain.
    pub fn append(&mut self, list: &mut Nodes, id: NodeId) {
        debug_assert!(self[id].next.is_none(), "node already chained");
        match list.tail {
            Some(tail) => self[tail].next = Some(id),
            None => list.head = Some(id),
        }
        list.tail = Some(id);
    }

    /// Iterates over a sibling chain.
    pub fn iter(&self, list: Nodes) -> Siblings<'_> {
        Siblings {
            ast: self,
            current: list.head,
        }
    }

    /// Every node handle, in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(|i| NodeId(u32::try_from(i).unwrap_or(u32::MAX)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The resolved type of a node, unit if the checker left it untyped.
    pub fn ty(&self, id: NodeId) -> Type {
        self[id].ty.unwrap_or(Type::Unit)
    }
}

impl ops::Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl ops::IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}

pub struct Siblings<'ast> {
    ast: &'ast Ast,
    current: Option<NodeId>,
}

impl Iterator for Siblings<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.current?;
        self.current = self.ast[current].next;
        Some(current)
    }
}

/// An intrusive, singly-linked chain of sibling nodes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Nodes {
    pub head: Option<NodeId>,
    pub tail: Option<NodeId>,
}

#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    /// Filled in by the type checker.
    pub ty: Option<Type>,
    pub token: Token,
    pub next: Option<NodeId>,
}

#[derive(Debug)]
pub enum NodeKind {
    Atom {
        value: Atom,
        /// The declaration an identifier resolves to. Filled in by the type
        /// checker.
        definition: Option<NodeId>,
    },
    Call {
        callee: NodeId,
        args: Nodes,
        arity: usize,
    },
    Unary {
        op: UnaryOperator,
        operand: NodeId,
    },
    Binary {
        op: BinaryOperator,
        lhs: NodeId,
        rhs: NodeId,
    },
    If {
        condition: NodeId,
        consequence: NodeId,
        antecedence: Option<NodeId>,
    },
    Block {
        body: Nodes,
    },
    Return {
        value: Option<NodeId>,
    },
    Fn(Fn),
    Var(Var),
    Print {
        operand: NodeId,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Atom {
    Int(i64),
    Bool(bool),
    Ident(Interned),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Assign,
}

/// A function declaration, an inline function literal, or a function type
/// signature.
///
/// Declarations and literals have a body. Their parameters are `Var` nodes of
/// kind [`VarKind::Param`]. A signature has no body, and its parameters are
/// the parameter type nodes themselves.
#[derive(Debug)]
pub struct Fn {
    pub name: Option<Interned>,
    pub params: Nodes,
    pub arity: usize,
    pub ret: Option<NodeId>,
    pub body: Option<NodeId>,
    /// Whether this declaration is nested in another function.
    pub local: bool,
}

#[derive(Debug)]
pub struct Var {
    pub name: Interned,
    pub ty: Option<NodeId>,
    pub init: Option<NodeId>,
    pub kind: VarKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VarKind {
    Global,
    Local,
    Param,
}

impl Node {
    /// The declared name, for declarations.
    pub fn name(&self) -> Option<Interned> {
        match &self.kind {
            NodeKind::Fn(f) => f.name,
            NodeKind::Var(v) => Some(v.name),
            _ => None,
        }
    }

    pub fn as_fn(&self) -> Option<&Fn> {
        match &self.kind {
            NodeKind::Fn(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match &self.kind {
            NodeKind::Var(v) => Some(v),
            _ => None,
        }
    }
}

/// A parsed translation unit: the arena and its top-level statements.
#[derive(Debug, Default)]
pub struct Program {
    pub ast: Ast,
    pub nodes: Nodes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Pos, Span, TokenKind};

    fn token() -> Token {
        Token::new(TokenKind::Int, Span::new_of_length(0, 1), Pos::default(), false)
    }

    fn int(ast: &mut Ast, n: i64) -> NodeId {
        let kind = NodeKind::Atom {
            value: Atom::Int(n),
            definition: None,
        };
        ast.push(kind, token())
    }

    #[test]
    fn sibling_chain() {
        let mut ast = Ast::with_capacity(4);
        let mut list = Nodes::default();
        assert_eq!(ast.iter(list).count(), 0);

        let a = int(&mut ast, 1);
        let b = int(&mut ast, 2);
        let c = int(&mut ast, 3);
        let lone = int(&mut ast, 4);
        for id in [a, b, c] {
            ast.append(&mut list, id);
        }

        assert_eq!(ast.iter(list).collect::<Vec<_>>(), [a, b, c]);
        assert_eq!(list.tail, Some(c));
        assert_eq!(ast[lone].next, None);
        assert_eq!(ast.len(), 4);
    }
}
