use std::io::Write;

use crate::{
    ast::{Atom, NodeId, NodeKind, Program, VarKind},
    util::intern::Interner,
};

const INDENT_WIDTH: usize = 2;

pub fn print_program_string(idents: &Interner, program: &Program) -> String {
    let mut buf = Vec::with_capacity(1024);
    // Writing into a `Vec` never fails.
    _ = print_program(&mut buf, idents, program);
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn print_program(
    w: &mut impl Write,
    idents: &Interner,
    program: &Program,
) -> std::io::Result<()> {
    let p = Printer { idents, program };
    for node in program.ast.iter(program.nodes) {
        p.print_node(w, 0, node)?;
    }
    Ok(())
}

struct Printer<'a> {
    idents: &'a Interner,
    program: &'a Program,
}

impl Printer<'_> {
    fn print_node(&self, w: &mut impl Write, i: usize, id: NodeId) -> std::io::Result<()> {
        let ast = &self.program.ast;
        let node = &ast[id];
        let pos = node.token.pos;
        let info = match node.ty {
            Some(ty) => format!(" %: {}", ty.display(ast)),
            None => String::new(),
        };

        sp(w, i)?;
        match &node.kind {
            NodeKind::Atom { value, definition } => {
                let def = match definition {
                    Some(def) => format!(", def {}", ast[*def].token.pos),
                    None => String::new(),
                };
                match value {
                    Atom::Int(n) => writeln!(w, "int {n} ({pos}{info})")?,
                    Atom::Bool(b) => writeln!(w, "bool {b} ({pos}{info})")?,
                    Atom::Ident(name) => {
                        let name = self.idents.get(*name);
                        writeln!(w, "ident {name} ({pos}{info}{def})")?;
                    }
                }
            }
            NodeKind::Call { callee, args, .. } => {
                writeln!(w, "call ({pos}{info})")?;
                self.print_node(w, i + 1, *callee)?;
                if args.head.is_some() {
                    sp(w, i + 1)?;
                    writeln!(w, "arguments")?;
                    for arg in ast.iter(*args) {
                        self.print_node(w, i + 2, arg)?;
                    }
                }
            }
            NodeKind::Unary { op, operand } => {
                writeln!(w, "unary {op:?} ({pos}{info})")?;
                self.print_node(w, i + 1, *operand)?;
            }
            NodeKind::Binary { op, lhs, rhs } => {
                writeln!(w, "binary {op:?} ({pos}{info})")?;
                self.print_node(w, i + 1, *lhs)?;
                self.print_node(w, i + 1, *rhs)?;
            }
            NodeKind::If {
                condition,
                consequence,
                antecedence,
            } => {
                writeln!(w, "if ({pos}{info})")?;
                self.print_node(w, i + 1, *condition)?;
                self.print_node(w, i + 1, *consequence)?;
                if let Some(antecedence) = antecedence {
                    self.print_node(w, i + 1, *antecedence)?;
                }
            }
            NodeKind::Block { body } => {
                writeln!(w, "block ({pos}{info})")?;
                for stmt in ast.iter(*body) {
                    self.print_node(w, i + 1, stmt)?;
                }
            }
            NodeKind::Return { value } => {
                writeln!(w, "return ({pos}{info})")?;
                if let Some(value) = value {
                    self.print_node(w, i + 1, *value)?;
                }
            }
            NodeKind::Fn(func) => {
                if func.body.is_none() {
                    writeln!(w, "type fn ({pos}{info})")?;
                } else {
                    let name = func.name.map_or("<anonymous>", |n| self.idents.get(n));
                    let local = if func.local { " [local]" } else { "" };
                    writeln!(w, "fn {name}{local} ({pos}{info})")?;
                }
                for param in ast.iter(func.params) {
                    if func.body.is_some() {
                        self.print_node(w, i + 1, param)?;
                    } else {
                        self.print_type(w, i + 1, param)?;
                    }
                }
                if let Some(ret) = func.ret {
                    sp(w, i + 1)?;
                    writeln!(w, "returns")?;
                    self.print_type(w, i + 2, ret)?;
                }
                if let Some(body) = func.body {
                    self.print_node(w, i + 1, body)?;
                }
            }
            NodeKind::Var(var) => {
                let kind = match var.kind {
                    VarKind::Global => "global",
                    VarKind::Local => "local",
                    VarKind::Param => "param",
                };
                let name = self.idents.get(var.name);
                writeln!(w, "{kind} {name} ({pos}{info})")?;
                if let Some(ty) = var.ty {
                    self.print_type(w, i + 1, ty)?;
                }
                if let Some(init) = var.init {
                    self.print_node(w, i + 1, init)?;
                }
            }
            NodeKind::Print { operand } => {
                writeln!(w, "print ({pos}{info})")?;
                self.print_node(w, i + 1, *operand)?;
            }
        }
        Ok(())
    }

    /// Type names are identifier atoms, printed apart from identifier
    /// references.
    fn print_type(&self, w: &mut impl Write, i: usize, id: NodeId) -> std::io::Result<()> {
        let ast = &self.program.ast;
        let node = &ast[id];
        match node.kind {
            NodeKind::Atom {
                value: Atom::Ident(name),
                ..
            } => {
                let info = match node.ty {
                    Some(ty) => format!(" %: {}", ty.display(ast)),
                    None => String::new(),
                };
                sp(w, i)?;
                writeln!(
                    w,
                    "type {} ({}{info})",
                    self.idents.get(name),
                    node.token.pos
                )
            }
            _ => self.print_node(w, i, id),
        }
    }
}

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}
