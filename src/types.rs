use std::fmt;

use crate::ast::{Ast, NodeId};

/// A resolved type. Function types refer to the `Fn` node (a declaration, a
/// literal or a signature) that spells out their shape.
#[derive(Copy, Clone, Debug)]
pub enum Type {
    Unit,
    Bool,
    I64,
    Fn(NodeId),
}

impl Type {
    pub fn is_unit(self) -> bool {
        matches!(self, Type::Unit)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Type::I64)
    }

    /// Whether the value can be printed.
    pub fn is_scalar(self) -> bool {
        matches!(self, Type::I64 | Type::Bool)
    }

    /// Structural equality. Function types are equal if they have the same
    /// arity, pairwise equal parameter types and equal return types.
    pub fn same(self, other: Type, ast: &Ast) -> bool {
        match (self, other) {
            (Type::Unit, Type::Unit) | (Type::Bool, Type::Bool) | (Type::I64, Type::I64) => true,
            (Type::Fn(a), Type::Fn(b)) if a == b => true,
            (Type::Fn(a), Type::Fn(b)) => {
                let (Some(fa), Some(fb)) = (ast[a].as_fn(), ast[b].as_fn()) else {
                    return false;
                };
                fa.arity == fb.arity
                    && ast
                        .iter(fa.params)
                        .zip(ast.iter(fb.params))
                        .all(|(pa, pb)| ast.ty(pa).same(ast.ty(pb), ast))
                    && return_type(ast, a).same(return_type(ast, b), ast)
            }
            _ => false,
        }
    }

    pub fn display(self, ast: &Ast) -> impl fmt::Display + '_ {
        TypeDisplay(self, ast)
    }
}

/// The declared return type of a function node, unit if absent.
pub fn return_type(ast: &Ast, func: NodeId) -> Type {
    match ast[func].as_fn().and_then(|f| f.ret) {
        Some(ret) => ast.ty(ret),
        None => Type::Unit,
    }
}

struct TypeDisplay<'a>(Type, &'a Ast);

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let TypeDisplay(ty, ast) = *self;
        match ty {
            Type::Unit => f.write_str("()"),
            Type::Bool => f.write_str("bool"),
            Type::I64 => f.write_str("i64"),
            Type::Fn(id) => {
                f.write_str("fn(")?;
                if let Some(func) = ast[id].as_fn() {
                    for (i, param) in ast.iter(func.params).enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", ast.ty(param).display(ast))?;
                    }
                }
                f.write_str(")")?;
                let ret = return_type(ast, id);
                if !ret.is_unit() {
                    write!(f, " {}", ret.display(ast))?;
                }
                Ok(())
            }
        }
    }
}

/// Names the checker and code generator look up by handle. They are interned
/// before anything else, so their handles are fixed.
pub mod well_known {
    use crate::util::intern::Interned;

    pub const MAIN: Interned = Interned::from_index(0);
    pub const I64: Interned = Interned::from_index(1);
    pub const BOOL: Interned = Interned::from_index(2);

    pub const ALL: &[(Interned, &str)] = &[(MAIN, "main"), (I64, "i64"), (BOOL, "bool")];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser, util::intern::Interner};

    /// Checks `fn f() { var a T; var b U }` and returns the types of `a`
    /// and `b`.
    fn two_types(a: &str, b: &str) -> (Ast, Type, Type) {
        let src = format!("fn f() {{\nvar a {a}\nvar b {b}\n}}\nfn main() {{}}");
        let interner = &mut Interner::default();
        let mut program = parser::parse_program(&src, interner).unwrap();
        crate::type_checker::check(&mut program).unwrap();
        let ast = program.ast;
        let vars: Vec<_> = ast
            .ids()
            .filter(|&id| ast[id].as_var().is_some())
            .map(|id| ast.ty(id))
            .collect();
        (ast, vars[0], vars[1])
    }

    #[track_caller]
    fn assert_same(a: &str, b: &str, expected: bool) {
        let (ast, ta, tb) = two_types(a, b);
        assert_eq!(ta.same(tb, &ast), expected, "{a} vs {b}");
        assert_eq!(tb.same(ta, &ast), expected, "{b} vs {a}");
    }

    #[test]
    fn structural_equality() {
        assert_same("i64", "i64", true);
        assert_same("bool", "i64", false);
        assert_same("fn() i64", "fn() i64", true);
        assert_same("fn(i64) bool", "fn(i64, i64) bool", false);
        assert_same("fn(i64) bool", "fn(i64) i64", false);
        assert_same("fn(i64)", "fn(bool)", false);
        assert_same("fn(fn(i64) i64)", "fn(fn(i64) i64)", true);
        assert_same("fn(fn(i64) i64)", "fn(fn(i64))", false);
    }

    #[test]
    fn unit_is_distinct() {
        let ast = Ast::default();
        assert!(Type::Unit.same(Type::Unit, &ast));
        assert!(!Type::Unit.same(Type::Bool, &ast));
        assert!(!Type::Unit.same(Type::I64, &ast));
    }

    #[test]
    fn display() {
        let (ast, a, b) = two_types("fn(i64, bool) i64", "fn(fn())");
        assert_eq!(a.display(&ast).to_string(), "fn(i64, bool) i64");
        assert_eq!(b.display(&ast).to_string(), "fn(fn())");
        assert_eq!(Type::Unit.display(&ast).to_string(), "()");
    }
}
