use crate::{
    ast::{Ast, NodeId},
    util::intern::Interned,
};

/// An insertion-ordered sequence of declarations. Lookups scan it from the
/// back, so later declarations shadow earlier ones.
#[derive(Debug, Default)]
pub struct Scope {
    decls: Vec<NodeId>,
}

impl Scope {
    pub fn with_capacity(capacity: usize) -> Scope {
        Scope {
            decls: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, decl: NodeId) {
        self.decls.push(decl);
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Drops every declaration past `len`.
    pub fn truncate(&mut self, len: usize) {
        self.decls.truncate(len);
    }

    pub fn find(&self, ast: &Ast, name: Interned) -> Option<NodeId> {
        self.find_from(ast, 0, name)
    }

    /// Like [`Scope::find`], but ignores the declarations before `base`.
    pub fn find_from(&self, ast: &Ast, base: usize, name: Interned) -> Option<NodeId> {
        self.decls
            .get(base..)?
            .iter()
            .rev()
            .copied()
            .find(|&decl| ast[decl].name() == Some(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.decls.iter().copied()
    }
}

/// The local window of the function being checked: the function itself and
/// the offset where its locals start.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FnWindow {
    pub func: NodeId,
    pub base: usize,
}

#[derive(Debug, Default)]
pub struct Context {
    pub globals: Scope,
    /// Locals of every function being checked, innermost last.
    pub locals: Scope,
    pub window: Option<FnWindow>,
}

impl Context {
    pub fn with_capacity(capacity: usize) -> Context {
        Context {
            globals: Scope::with_capacity(capacity),
            locals: Scope::with_capacity(capacity),
            window: None,
        }
    }

    /// Looks the name up in the current function's locals, then among the
    /// globals.
    pub fn resolve(&self, ast: &Ast, name: Interned) -> Option<NodeId> {
        self.window
            .and_then(|w| self.locals.find_from(ast, w.base, name))
            .or_else(|| self.globals.find(ast, name))
    }

    /// Opens a fresh local window for `func`, returning the one it replaces.
    pub fn enter_fn(&mut self, func: NodeId) -> Option<FnWindow> {
        let window = FnWindow {
            func,
            base: self.locals.len(),
        };
        self.window.replace(window)
    }

    /// Discards the current window's locals and restores `saved`.
    pub fn leave_fn(&mut self, saved: Option<FnWindow>) {
        if let Some(current) = self.window {
            self.locals.truncate(current.base);
        }
        self.window = saved;
    }

    pub fn current_fn(&self) -> Option<NodeId> {
        self.window.map(|w| w.func)
    }
}
