use crate::{
    ast::{Ast, Atom, BinaryOperator, NodeId, NodeKind, Program, VarKind},
    scope::Context,
    token::{Located, Pos},
    types::{self, well_known, Type},
    util::intern::Interned,
};

type Result<T, E = Located<Error>> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    UndefinedIdentifier(Interned),
    UndefinedType(Interned),
    Redefinition {
        name: Interned,
        previous: Pos,
    },
    Mismatch {
        expected: Box<str>,
        actual: Box<str>,
    },
    NotArithmetic(Box<str>),
    NotScalar(Box<str>),
    NotCallable(Box<str>),
    ArityMismatch {
        expected: usize,
        actual: usize,
    },
    NotInMemory,
    UnitVariable,
    MainUndefined,
    MainNotFunction,
    MainHasParameters,
    MainReturnsValue,
}

/// The outcome of a successful check.
#[derive(Debug)]
pub struct Checked {
    /// Top-level declarations, in source order.
    pub globals: Vec<NodeId>,
    pub main: NodeId,
}

/// Resolves and types every node of the program in place, then validates the
/// `main` entry point.
pub fn check(program: &mut Program) -> Result<Checked> {
    let mut checker = Checker::new(&mut program.ast);
    let nodes: Vec<_> = checker.ast.iter(program.nodes).collect();
    for node in nodes {
        checker.check_stmt(node)?;
    }
    let main = checker.check_main()?;
    Ok(Checked {
        globals: checker.cx.globals.iter().collect(),
        main,
    })
}

/// Checks each top-level node as an expression inside an anonymous function
/// body.
#[cfg(test)]
pub(crate) fn check_exprs(program: &mut Program) -> Result<()> {
    let mut checker = Checker::new(&mut program.ast);
    let nodes: Vec<_> = checker.ast.iter(program.nodes).collect();
    for node in nodes {
        checker.check_expr(node, false)?;
    }
    Ok(())
}

struct Checker<'ast> {
    ast: &'ast mut Ast,
    cx: Context,
}

impl<'ast> Checker<'ast> {
    fn new(ast: &'ast mut Ast) -> Checker<'ast> {
        Checker {
            ast,
            cx: Context::with_capacity(64),
        }
    }
}

impl Checker<'_> {
    fn check_stmt(&mut self, id: NodeId) -> Result<()> {
        match self.ast[id].kind {
            NodeKind::If {
                condition,
                consequence,
                antecedence,
            } => {
                let ty = self.check_expr(condition, false)?;
                self.assert_same(condition, ty, Type::Bool)?;
                self.check_stmt(consequence)?;
                if let Some(antecedence) = antecedence {
                    self.check_stmt(antecedence)?;
                }
            }
            NodeKind::Block { body } => {
                let saved = self.cx.locals.len();
                let stmts: Vec<_> = self.ast.iter(body).collect();
                for stmt in stmts {
                    self.check_stmt(stmt)?;
                }
                self.cx.locals.truncate(saved);
            }
            NodeKind::Return { value } => {
                let ty = match value {
                    Some(value) => self.check_expr(value, false)?,
                    None => Type::Unit,
                };
                let expected = match self.cx.current_fn() {
                    Some(func) => types::return_type(self.ast, func),
                    None => Type::Unit,
                };
                self.assert_same(id, ty, expected)?;
            }
            NodeKind::Fn(_) => self.check_fn(id)?,
            NodeKind::Var(_) => self.check_var(id)?,
            NodeKind::Print { operand } => {
                let ty = self.check_expr(operand, false)?;
                if !ty.is_scalar() {
                    let ty = self.show(ty);
                    return Err(self.pos(operand).wrap(Error::NotScalar(ty)));
                }
            }
            _ => {
                self.check_expr(id, false)?;
            }
        }
        Ok(())
    }

    /// Types an expression. In `reference` mode the expression must denote a
    /// variable, as the target of an assignment does.
    fn check_expr(&mut self, id: NodeId, reference: bool) -> Result<Type> {
        let mut in_memory = false;
        let ty = match self.ast[id].kind {
            NodeKind::Atom { value, .. } => match value {
                Atom::Int(_) => Type::I64,
                Atom::Bool(_) => Type::Bool,
                Atom::Ident(name) => {
                    let Some(def) = self.cx.resolve(self.ast, name) else {
                        return Err(self.pos(id).wrap(Error::UndefinedIdentifier(name)));
                    };
                    if let NodeKind::Atom { definition, .. } = &mut self.ast[id].kind {
                        *definition = Some(def);
                    }
                    in_memory = self.ast[def].as_var().is_some();
                    self.ast.ty(def)
                }
            },
            NodeKind::Call {
                callee,
                args,
                arity,
            } => {
                let Type::Fn(fn_ty) = self.check_expr(callee, false)? else {
                    let ty = self.show(self.ast.ty(callee));
                    return Err(self.pos(callee).wrap(Error::NotCallable(ty)));
                };
                let expected = self.ast[fn_ty].as_fn().map_or(0, |f| f.arity);
                if arity != expected {
                    let error = Error::ArityMismatch {
                        expected,
                        actual: arity,
                    };
                    return Err(self.pos(id).wrap(error));
                }
                let params = self.ast[fn_ty].as_fn().map(|f| f.params).unwrap_or_default();
                let pairs: Vec<_> = self.ast.iter(args).zip(self.ast.iter(params)).collect();
                for (arg, param) in pairs {
                    let ty = self.check_expr(arg, false)?;
                    self.assert_same(arg, ty, self.ast.ty(param))?;
                }
                types::return_type(self.ast, fn_ty)
            }
            NodeKind::Unary { operand, .. } => {
                let ty = self.check_expr(operand, false)?;
                self.assert_arithmetic(operand, ty)?
            }
            NodeKind::Binary {
                op: BinaryOperator::Assign,
                lhs,
                rhs,
            } => {
                let target = self.check_expr(lhs, true)?;
                let value = self.check_expr(rhs, false)?;
                self.assert_same(rhs, value, target)?;
                Type::Unit
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                let lhs_ty = self.check_expr(lhs, false)?;
                let rhs_ty = self.check_expr(rhs, false)?;
                self.assert_arithmetic(lhs, lhs_ty)?;
                self.assert_same(rhs, rhs_ty, lhs_ty)?
            }
            NodeKind::Fn(_) => {
                self.check_fn(id)?;
                Type::Fn(id)
            }
            NodeKind::If { .. }
            | NodeKind::Block { .. }
            | NodeKind::Return { .. }
            | NodeKind::Var(_)
            | NodeKind::Print { .. } => unreachable!("statement in expression position"),
        };

        if reference && !in_memory {
            return Err(self.pos(id).wrap(Error::NotInMemory));
        }
        self.ast[id].ty = Some(ty);
        Ok(ty)
    }

    /// Resolves a type node: a primitive name or a function signature.
    fn check_type(&mut self, id: NodeId) -> Result<Type> {
        let ty = match &self.ast[id].kind {
            NodeKind::Atom {
                value: Atom::Ident(name),
                ..
            } => {
                let name = *name;
                if name == well_known::I64 {
                    Type::I64
                } else if name == well_known::BOOL {
                    Type::Bool
                } else {
                    return Err(self.pos(id).wrap(Error::UndefinedType(name)));
                }
            }
            NodeKind::Fn(sig) => {
                let (params, ret) = (sig.params, sig.ret);
                let params: Vec<_> = self.ast.iter(params).collect();
                for param in params {
                    self.check_type(param)?;
                }
                if let Some(ret) = ret {
                    self.check_type(ret)?;
                }
                Type::Fn(id)
            }
            _ => unreachable!("not a type node"),
        };
        self.ast[id].ty = Some(ty);
        Ok(ty)
    }

    /// Checks a function declaration or literal. Declarations are entered
    /// into the scope they appear in before their body is checked.
    fn check_fn(&mut self, id: NodeId) -> Result<()> {
        let Some(func) = self.ast[id].as_fn() else {
            unreachable!("not a function");
        };
        let (name, params, ret, body, local) =
            (func.name, func.params, func.ret, func.body, func.local);

        if let Some(name) = name {
            self.declare(id, name, local)?;
        }
        self.ast[id].ty = Some(Type::Fn(id));

        let saved = self.cx.enter_fn(id);
        let params: Vec<_> = self.ast.iter(params).collect();
        for param in params {
            if let Some(ty) = self.ast[param].as_var().and_then(|v| v.ty) {
                let ty = self.check_type(ty)?;
                self.ast[param].ty = Some(ty);
            }
            self.cx.locals.push(param);
        }
        if let Some(ret) = ret {
            self.check_type(ret)?;
        }
        if let Some(body) = body {
            self.check_stmt(body)?;
        }
        self.cx.leave_fn(saved);
        Ok(())
    }

    fn check_var(&mut self, id: NodeId) -> Result<()> {
        let Some(var) = self.ast[id].as_var() else {
            unreachable!("not a variable");
        };
        let (name, declared, init, kind) = (var.name, var.ty, var.init, var.kind);

        if kind == VarKind::Global {
            self.assert_not_global(id, name)?;
        }
        if let Some(declared) = declared {
            let ty = self.check_type(declared)?;
            self.ast[id].ty = Some(ty);
        }
        if let Some(init) = init {
            let ty = self.check_expr(init, false)?;
            if ty.is_unit() {
                return Err(self.pos(id).wrap(Error::UnitVariable));
            }
            if let Some(declared) = declared {
                self.assert_same(init, ty, self.ast.ty(declared))?;
            }
            self.ast[id].ty = Some(ty);
        }
        if self.ast.ty(id).is_unit() {
            return Err(self.pos(id).wrap(Error::UnitVariable));
        }

        match kind {
            VarKind::Global => self.cx.globals.push(id),
            VarKind::Local | VarKind::Param => self.cx.locals.push(id),
        }
        Ok(())
    }

    fn check_main(&self) -> Result<NodeId> {
        let Some(main) = self.cx.globals.find(self.ast, well_known::MAIN) else {
            return Err(Pos::default().wrap(Error::MainUndefined));
        };
        let Some(func) = self.ast[main].as_fn() else {
            return Err(self.pos(main).wrap(Error::MainNotFunction));
        };
        if func.arity > 0 {
            return Err(self.pos(main).wrap(Error::MainHasParameters));
        }
        if func.ret.is_some() {
            return Err(self.pos(main).wrap(Error::MainReturnsValue));
        }
        Ok(main)
    }

    /// Enters a declaration into the current scope. Only global names must be
    /// unique: locals may shadow each other.
    fn declare(&mut self, id: NodeId, name: Interned, local: bool) -> Result<()> {
        if local {
            self.cx.locals.push(id);
        } else {
            self.assert_not_global(id, name)?;
            self.cx.globals.push(id);
        }
        Ok(())
    }

    fn assert_not_global(&self, id: NodeId, name: Interned) -> Result<()> {
        match self.cx.globals.find(self.ast, name) {
            Some(previous) => {
                let previous = self.pos(previous);
                Err(self.pos(id).wrap(Error::Redefinition { name, previous }))
            }
            None => Ok(()),
        }
    }

    fn assert_same(&self, at: NodeId, actual: Type, expected: Type) -> Result<Type> {
        if actual.same(expected, self.ast) {
            return Ok(actual);
        }
        let error = Error::Mismatch {
            expected: self.show(expected),
            actual: self.show(actual),
        };
        Err(self.pos(at).wrap(error))
    }

    fn assert_arithmetic(&self, at: NodeId, ty: Type) -> Result<Type> {
        if ty.is_integer() {
            Ok(ty)
        } else {
            Err(self.pos(at).wrap(Error::NotArithmetic(self.show(ty))))
        }
    }

    fn pos(&self, id: NodeId) -> Pos {
        self.ast[id].token.pos
    }

    fn show(&self, ty: Type) -> Box<str> {
        ty.display(self.ast).to_string().into_boxed_str()
    }
}

#[cfg(test)]
mod tests {
    use crate::util::test_utils::tree_tests;

    tree_tests! {
        use checker;

        fn test_arithmetic() {
            let expr = "1 + 2 * -3";
            let tree_ok = r"
                binary Add (1:3 %: i64)
                  int 1 (1:1 %: i64)
                  binary Mul (1:7 %: i64)
                    int 2 (1:5 %: i64)
                    unary Neg (1:9 %: i64)
                      int 3 (1:10 %: i64)
            ";
        }

        fn test_arithmetic_on_bool() {
            let expr = "true + 1";
            let expected_errors = &["1:1: expected arithmetic type, got 'bool'"];
        }

        fn test_mismatched_operands() {
            let expr = "1 * false";
            let expected_errors = &["1:5: expected type 'i64', got 'bool'"];
        }

        fn test_negate_bool() {
            let expr = "-true";
            let expected_errors = &["1:2: expected arithmetic type, got 'bool'"];
        }

        fn test_undefined_identifier() {
            let expr = "1 + nope";
            let expected_errors = &["1:5: undefined identifier 'nope'"];
        }

        fn test_fn_literal_call() {
            let expr = "fn(a i64, b bool) i64 { return a }(1, true)";
            let tree_ok = r"
                call (1:35 %: i64)
                  fn <anonymous> [local] (1:1 %: fn(i64, bool) i64)
                    param a (1:4 %: i64)
                      type i64 (1:6 %: i64)
                    param b (1:11 %: bool)
                      type bool (1:13 %: bool)
                    returns
                      type i64 (1:19 %: i64)
                    block (1:23)
                      return (1:25)
                        ident a (1:32 %: i64, def 1:4)
                  arguments
                    int 1 (1:36 %: i64)
                    bool true (1:39 %: bool)
            ";
        }

        fn test_call_non_function() {
            let expr = "1(2)";
            let expected_errors = &["1:1: cannot call type 'i64'"];
        }

        fn test_arity_singular() {
            let program = "fn f(a i64) { }\nfn main() { f() }";
            let expected_errors = &["2:14: expected 1 argument, got 0"];
        }

        fn test_arity_plural() {
            let program = "fn f(a i64, b i64) { }\nfn main() { f(1) }";
            let expected_errors = &["2:14: expected 2 arguments, got 1"];
        }

        fn test_argument_mismatch() {
            let program = "fn f(a i64, b bool) { }\nfn main() { f(1, 2) }";
            let expected_errors = &["2:18: expected type 'bool', got 'i64'"];
        }

        fn test_assign_to_function() {
            let program = "fn f() { }\nfn main() { f = f }";
            let expected_errors = &["2:13: cannot take reference to value not in memory"];
        }

        fn test_assign_to_literal() {
            let program = "fn main() { 1 = 2 }";
            let expected_errors = &["1:13: cannot take reference to value not in memory"];
        }

        fn test_assign_mismatch() {
            let program = "fn main() { var x = 1; x = true }";
            let expected_errors = &["1:28: expected type 'i64', got 'bool'"];
        }

        fn test_print_function() {
            let program = "fn main() { print main }";
            let expected_errors = &["1:19: expected scalar type, got 'fn()'"];
        }

        fn test_condition_must_be_bool() {
            let program = "fn main() { if 1 { } }";
            let expected_errors = &["1:16: expected type 'bool', got 'i64'"];
        }

        fn test_return_type() {
            let program = "fn f() bool { return 1 }\nfn main() { }";
            let expected_errors = &["1:15: expected type 'bool', got 'i64'"];
        }

        fn test_return_value_from_unit_fn() {
            let program = "fn f() { return 1 }\nfn main() { }";
            let expected_errors = &["1:10: expected type '()', got 'i64'"];
        }

        fn test_bare_return_from_typed_fn() {
            let program = "fn f() i64 { return }\nfn main() { }";
            let expected_errors = &["1:14: expected type 'i64', got '()'"];
        }

        fn test_undefined_type() {
            let program = "var x str\nfn main() { }";
            let expected_errors = &["1:7: undefined type 'str'"];
        }

        fn test_unit_variable() {
            let program = "fn f() { }\nfn main() { var x = f() }";
            let expected_errors = &["2:17: cannot define variable with type '()'"];
        }

        fn test_untyped_uninitialized_variable() {
            let program = "fn main() { var x }";
            let expected_errors = &["1:17: cannot define variable with type '()'"];
        }

        fn test_initializer_mismatch() {
            let program = "var x i64 = true\nfn main() { }";
            let expected_errors = &["1:13: expected type 'i64', got 'bool'"];
        }

        fn test_global_redefinition() {
            let program = "var x i64\nvar x i64\nfn main() { }";
            let expected_errors = &[
                "2:5: redefinition of identifier 'x'",
                "1:5: defined here",
            ];
        }

        fn test_globals_visible_after_declaration() {
            let program = "fn main() { g() }\nfn g() { }";
            let expected_errors = &["1:13: undefined identifier 'g'"];
        }

        fn test_fn_redefinition() {
            let program = "fn main() { }\nfn main() { }";
            let expected_errors = &[
                "2:4: redefinition of identifier 'main'",
                "1:4: defined here",
            ];
        }

        fn test_local_redefinition_is_shadowing() {
            let program = "
fn main() {
  var x i64 = 1
  { var x bool = true
    print x }
  { var x i64
    var x = false }
  print x
}";
            let tree_ok = r"
                fn main (2:4 %: fn())
                  block (2:11)
                    local x (3:7 %: i64)
                      type i64 (3:9 %: i64)
                      int 1 (3:15 %: i64)
                    block (4:3)
                      local x (4:9 %: bool)
                        type bool (4:11 %: bool)
                        bool true (4:18 %: bool)
                      print (5:5)
                        ident x (5:11 %: bool, def 4:9)
                    block (6:3)
                      local x (6:9 %: i64)
                        type i64 (6:11 %: i64)
                      local x (7:9 %: bool)
                        bool false (7:13 %: bool)
                    print (8:3)
                      ident x (8:9 %: i64, def 3:7)
            ";
        }

        fn test_params_shadow_globals_and_locals_shadow_params() {
            let program = "
var a bool
fn f(a i64) i64 {
  var b = a
  var a = b * 2
  return a
}
fn main() { print a }";
            let tree_ok = r"
                global a (2:5 %: bool)
                  type bool (2:7 %: bool)
                fn f (3:4 %: fn(i64) i64)
                  param a (3:6 %: i64)
                    type i64 (3:8 %: i64)
                  returns
                    type i64 (3:13 %: i64)
                  block (3:17)
                    local b (4:7 %: i64)
                      ident a (4:11 %: i64, def 3:6)
                    local a (5:7 %: i64)
                      binary Mul (5:13 %: i64)
                        ident b (5:11 %: i64, def 4:7)
                        int 2 (5:15 %: i64)
                    return (6:3)
                      ident a (6:10 %: i64, def 5:7)
                fn main (8:4 %: fn())
                  block (8:11)
                    print (8:13)
                      ident a (8:19 %: bool, def 2:5)
            ";
        }

        fn test_nested_fn_cannot_see_enclosing_locals() {
            let program = "fn main() {\n  var x = 1\n  fn g() { print x }\n}";
            let expected_errors = &["3:18: undefined identifier 'x'"];
        }

        fn test_nested_fn_is_scoped_to_block() {
            let program = "fn main() {\n  { fn g() { } }\n  g()\n}";
            let expected_errors = &["3:3: undefined identifier 'g'"];
        }

        fn test_recursion_and_function_values() {
            let program = "
fn fact(n i64) i64 { return n * fact(n - 1) }
fn main() {
  var f fn(i64) i64 = fact
  print f(5)
}";
            let tree_ok = r"
                fn fact (2:4 %: fn(i64) i64)
                  param n (2:9 %: i64)
                    type i64 (2:11 %: i64)
                  returns
                    type i64 (2:16 %: i64)
                  block (2:20)
                    return (2:22)
                      binary Mul (2:31 %: i64)
                        ident n (2:29 %: i64, def 2:9)
                        call (2:37 %: i64)
                          ident fact (2:33 %: fn(i64) i64, def 2:4)
                          arguments
                            binary Sub (2:40 %: i64)
                              ident n (2:38 %: i64, def 2:9)
                              int 1 (2:42 %: i64)
                fn main (3:4 %: fn())
                  block (3:11)
                    local f (4:7 %: fn(i64) i64)
                      type fn (4:9 %: fn(i64) i64)
                        type i64 (4:12 %: i64)
                        returns
                          type i64 (4:17 %: i64)
                      ident fact (4:23 %: fn(i64) i64, def 2:4)
                    print (5:3)
                      call (5:10 %: i64)
                        ident f (5:9 %: fn(i64) i64, def 4:7)
                        arguments
                          int 5 (5:11 %: i64)
            ";
        }

        fn test_function_type_mismatch() {
            let program = "fn g(a i64, b i64) i64 { return a }\nfn main() { var f fn(i64) i64 = g }";
            let expected_errors = &["2:33: expected type 'fn(i64) i64', got 'fn(i64, i64) i64'"];
        }

        fn test_main_undefined() {
            let program = "fn helper() { }";
            let expected_errors = &["1:1: function 'main' is not defined"];
        }

        fn test_main_is_variable() {
            let program = "var main i64 = 0";
            let expected_errors = &["1:5: function 'main' must be a function literal"];
        }

        fn test_main_with_arguments() {
            let program = "fn main(a i64) {}";
            let expected_errors = &["1:4: function 'main' cannot take any arguments"];
        }

        fn test_main_returning() {
            let program = "fn main() i64 { return 0 }";
            let expected_errors = &["1:4: function 'main' cannot return anything"];
        }
    }
}
