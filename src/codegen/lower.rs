use std::collections::HashMap;

use cranelift_codegen::ir::{
    self, types, AbiParam, Block, InstBuilder, MemFlags, Signature, SourceLoc, StackSlot,
    StackSlotData, StackSlotKind, Value,
};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};
use cranelift_object::ObjectModule;

use crate::{
    ast::{Ast, Atom, BinaryOperator, NodeId, NodeKind, Nodes, VarKind},
    codegen::{FunctionDebug, Result},
    type_checker::Checked,
    types::{return_type, Type},
    util::intern::Interner,
};

const PRINT_FORMAT: &[u8] = b"%lld\n\0";

/// Module-wide lowering state. Function bodies are lowered one at a time:
/// referencing a function only declares it and queues its body.
pub struct Lowerer<'a> {
    module: ObjectModule,
    ast: &'a Ast,
    idents: &'a Interner,
    path: &'a str,
    functions: HashMap<NodeId, FuncId>,
    pending: Vec<(NodeId, FuncId)>,
    globals: HashMap<NodeId, DataId>,
    printf: FuncId,
    format: DataId,
    debug: Vec<FunctionDebug>,
}

impl<'a> Lowerer<'a> {
    pub fn new(
        mut module: ObjectModule,
        ast: &'a Ast,
        idents: &'a Interner,
        path: &'a str,
    ) -> Result<Lowerer<'a>> {
        let ptr = module.target_config().pointer_type();
        let mut sig = module.make_signature();
        sig.params.push(AbiParam::new(ptr));
        sig.params.push(AbiParam::new(types::I64));
        sig.returns.push(AbiParam::new(types::I32));
        let printf = module.declare_function("printf", Linkage::Import, &sig)?;

        let format = module.declare_data("glos.format", Linkage::Local, false, false)?;
        let mut data = DataDescription::new();
        data.define(PRINT_FORMAT.into());
        module.define_data(format, &data)?;

        Ok(Lowerer {
            module,
            ast,
            idents,
            path,
            functions: HashMap::new(),
            pending: Vec::new(),
            globals: HashMap::new(),
            printf,
            format,
            debug: Vec::new(),
        })
    }

    pub fn lower_program(&mut self, nodes: Nodes, checked: &Checked) -> Result<()> {
        let ast = self.ast;
        for id in ast.iter(nodes) {
            match ast[id].kind {
                NodeKind::Fn(_) => {
                    self.function(id)?;
                }
                NodeKind::Var(_) => self.global(id)?,
                _ => unreachable!("statement in global scope"),
            }
        }
        self.define_entry(checked)?;
        while let Some((id, func_id)) = self.pending.pop() {
            self.define_function(id, func_id)?;
        }
        Ok(())
    }

    pub fn finish(self) -> (ObjectModule, Vec<FunctionDebug>) {
        (self.module, self.debug)
    }

    /// The handle of a function declaration or literal, declaring it on first
    /// use.
    fn function(&mut self, id: NodeId) -> Result<FuncId> {
        if let Some(&func_id) = self.functions.get(&id) {
            return Ok(func_id);
        }
        let symbol = self.symbol(id);
        let sig = self.signature(id);
        let func_id = self.module.declare_function(&symbol, Linkage::Local, &sig)?;
        self.functions.insert(id, func_id);
        self.pending.push((id, func_id));
        Ok(func_id)
    }

    /// Declares the zero-initialized storage of a global variable. Its
    /// initializer runs in the entry function.
    fn global(&mut self, id: NodeId) -> Result<()> {
        let ty = self.value_type(self.ast.ty(id));
        let data_id = self
            .module
            .declare_data(&self.symbol(id), Linkage::Local, true, false)?;
        let mut data = DataDescription::new();
        data.define_zeroinit(ty.bytes() as usize);
        data.set_align(u64::from(ty.bytes()));
        self.module.define_data(data_id, &data)?;
        self.globals.insert(id, data_id);
        Ok(())
    }

    fn define_function(&mut self, id: NodeId, func_id: FuncId) -> Result<()> {
        let ast = self.ast;
        let Some(func) = ast[id].as_fn() else {
            unreachable!("not a function");
        };
        let symbol = self.symbol(id);
        let line = ast[id].token.pos.row + 1;
        tracing::debug!(%symbol, line, "defining function");

        let mut ctx = self.module.make_context();
        ctx.func.signature = self.signature(id);
        let ret = self.lower_type(return_type(ast, id));

        let mut fctx = FunctionBuilderContext::new();
        let mut f = FnLowerer::new(self, FunctionBuilder::new(&mut ctx.func, &mut fctx));
        let incoming = f.builder.block_params(f.entry).to_vec();
        for (param, value) in ast.iter(func.params).zip(incoming) {
            let slot = f.slot(param);
            f.builder.ins().stack_store(value, slot, 0);
        }
        if let Some(body) = func.body {
            f.lower_stmt(body)?;
        }
        match ret {
            Some(ty) => {
                let zero = f.builder.ins().iconst(ty, 0);
                f.builder.ins().return_(&[zero]);
            }
            None => {
                f.builder.ins().return_(&[]);
            }
        }
        f.finalize();

        self.module.define_function(func_id, &mut ctx)?;
        self.module.clear_context(&mut ctx);
        self.debug.push(FunctionDebug {
            symbol,
            file: self.path.to_owned(),
            line,
        });
        Ok(())
    }

    /// Defines the C `main`: global initializers in declaration order, then a
    /// call to the program's `main`.
    fn define_entry(&mut self, checked: &Checked) -> Result<()> {
        let mut sig = self.module.make_signature();
        sig.returns.push(AbiParam::new(types::I32));
        let func_id = self.module.declare_function("main", Linkage::Export, &sig)?;
        let main = self.function(checked.main)?;

        let mut ctx = self.module.make_context();
        ctx.func.signature = sig;
        let mut fctx = FunctionBuilderContext::new();
        let mut f = FnLowerer::new(self, FunctionBuilder::new(&mut ctx.func, &mut fctx));
        for &global in &checked.globals {
            let Some(init) = f.cx.ast[global].as_var().and_then(|v| v.init) else {
                continue;
            };
            f.mark(global);
            let value = f.value(init)?;
            f.store(global, value);
        }
        let main = f.cx.module.declare_func_in_func(main, f.builder.func);
        f.builder.ins().call(main, &[]);
        let status = f.builder.ins().iconst(types::I32, 0);
        f.builder.ins().return_(&[status]);
        f.finalize();

        self.module.define_function(func_id, &mut ctx)?;
        self.module.clear_context(&mut ctx);
        tracing::debug!(globals = self.globals.len(), "defined entry point");
        Ok(())
    }

    /// `glos.<name>.<node>`, unique even for shadowed and nested names.
    fn symbol(&self, id: NodeId) -> String {
        match self.ast[id].name() {
            Some(name) => format!("glos.{}.{}", self.idents.get(name), id.index()),
            None => format!("glos.fn.{}", id.index()),
        }
    }

    /// The signature of a function, literal or function type node.
    fn signature(&self, id: NodeId) -> Signature {
        let Some(func) = self.ast[id].as_fn() else {
            unreachable!("not a function type");
        };
        let mut sig = self.module.make_signature();
        for param in self.ast.iter(func.params) {
            if let Some(ty) = self.lower_type(self.ast.ty(param)) {
                sig.params.push(AbiParam::new(ty));
            }
        }
        if let Some(ty) = self.lower_type(return_type(self.ast, id)) {
            sig.returns.push(AbiParam::new(ty));
        }
        sig
    }

    /// Unit has no representation.
    fn lower_type(&self, ty: Type) -> Option<ir::Type> {
        match ty {
            Type::Unit => None,
            Type::Bool => Some(types::I8),
            Type::I64 => Some(types::I64),
            Type::Fn(_) => Some(self.pointer_type()),
        }
    }

    fn value_type(&self, ty: Type) -> ir::Type {
        match self.lower_type(ty) {
            Some(ty) => ty,
            None => unreachable!("unit value"),
        }
    }

    fn pointer_type(&self) -> ir::Type {
        self.module.target_config().pointer_type()
    }
}

/// Where a variable lives.
#[derive(Copy, Clone)]
enum Place {
    Slot(StackSlot),
    Global(DataId),
}

/// Lowers the body of a single function.
struct FnLowerer<'l, 'a, 'f> {
    cx: &'l mut Lowerer<'a>,
    builder: FunctionBuilder<'f>,
    entry: Block,
    slots: HashMap<NodeId, StackSlot>,
}

impl<'l, 'a, 'f> FnLowerer<'l, 'a, 'f> {
    fn new(cx: &'l mut Lowerer<'a>, mut builder: FunctionBuilder<'f>) -> FnLowerer<'l, 'a, 'f> {
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        FnLowerer {
            cx,
            builder,
            entry,
            slots: HashMap::new(),
        }
    }

    fn finalize(mut self) {
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }

    fn lower_stmt(&mut self, id: NodeId) -> Result<()> {
        let ast = self.cx.ast;
        match ast[id].kind {
            NodeKind::If {
                condition,
                consequence,
                antecedence,
            } => {
                let condition = self.value(condition)?;
                let then_block = self.builder.create_block();
                let else_block = self.builder.create_block();
                let join = if antecedence.is_some() {
                    self.builder.create_block()
                } else {
                    else_block
                };
                self.builder
                    .ins()
                    .brif(condition, then_block, &[], else_block, &[]);

                self.builder.switch_to_block(then_block);
                self.lower_stmt(consequence)?;
                self.builder.ins().jump(join, &[]);

                if let Some(antecedence) = antecedence {
                    self.builder.switch_to_block(else_block);
                    self.lower_stmt(antecedence)?;
                    self.builder.ins().jump(join, &[]);
                }
                self.builder.switch_to_block(join);
            }
            NodeKind::Block { body } => {
                for stmt in ast.iter(body) {
                    self.mark(stmt);
                    self.lower_stmt(stmt)?;
                }
            }
            NodeKind::Return { value } => {
                let value = match value {
                    Some(value) => self.lower_expr(value)?,
                    None => None,
                };
                match value {
                    Some(value) => self.builder.ins().return_(&[value]),
                    None => self.builder.ins().return_(&[]),
                };
                // Anything after a return is unreachable but still needs a
                // block to go into.
                let rest = self.builder.create_block();
                self.builder.switch_to_block(rest);
            }
            NodeKind::Fn(_) => {
                self.cx.function(id)?;
            }
            NodeKind::Var(ref var) => {
                let slot = self.slot(id);
                match var.init {
                    Some(init) => {
                        let value = self.value(init)?;
                        self.builder.ins().stack_store(value, slot, 0);
                    }
                    None => self.zero(slot, self.cx.value_type(ast.ty(id))),
                }
            }
            NodeKind::Print { operand } => {
                let value = self.value(operand)?;
                let value = match ast.ty(operand) {
                    Type::Bool => self.builder.ins().uextend(types::I64, value),
                    _ => value,
                };
                let format = self
                    .cx
                    .module
                    .declare_data_in_func(self.cx.format, self.builder.func);
                let format = self
                    .builder
                    .ins()
                    .global_value(self.cx.pointer_type(), format);
                let printf = self
                    .cx
                    .module
                    .declare_func_in_func(self.cx.printf, self.builder.func);
                self.builder.ins().call(printf, &[format, value]);
            }
            _ => {
                self.lower_expr(id)?;
            }
        }
        Ok(())
    }

    /// Lowers an expression, yielding nothing for unit values.
    fn lower_expr(&mut self, id: NodeId) -> Result<Option<Value>> {
        let ast = self.cx.ast;
        let value = match ast[id].kind {
            NodeKind::Atom { value, definition } => match value {
                Atom::Int(n) => self.builder.ins().iconst(types::I64, n),
                Atom::Bool(b) => self.builder.ins().iconst(types::I8, i64::from(b)),
                Atom::Ident(_) => {
                    let Some(def) = definition else {
                        unreachable!("unresolved identifier");
                    };
                    if ast[def].as_fn().is_some() {
                        self.function_address(def)?
                    } else {
                        self.load(def)
                    }
                }
            },
            NodeKind::Call { callee, args, .. } => return self.lower_call(callee, args),
            NodeKind::Unary { operand, .. } => {
                let operand = self.value(operand)?;
                self.builder.ins().ineg(operand)
            }
            NodeKind::Binary {
                op: BinaryOperator::Assign,
                lhs,
                rhs,
            } => {
                let target = self.reference(lhs);
                let value = self.value(rhs)?;
                self.store(target, value);
                return Ok(None);
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let lhs = self.value(lhs)?;
                let rhs = self.value(rhs)?;
                let ins = self.builder.ins();
                match op {
                    BinaryOperator::Add => ins.iadd(lhs, rhs),
                    BinaryOperator::Sub => ins.isub(lhs, rhs),
                    BinaryOperator::Mul => ins.imul(lhs, rhs),
                    BinaryOperator::Div => ins.sdiv(lhs, rhs),
                    BinaryOperator::Assign => unreachable!(),
                }
            }
            NodeKind::Fn(_) => self.function_address(id)?,
            NodeKind::If { .. }
            | NodeKind::Block { .. }
            | NodeKind::Return { .. }
            | NodeKind::Var(_)
            | NodeKind::Print { .. } => unreachable!("statement in expression position"),
        };
        Ok(Some(value))
    }

    fn value(&mut self, id: NodeId) -> Result<Value> {
        match self.lower_expr(id)? {
            Some(value) => Ok(value),
            None => unreachable!("unit value"),
        }
    }

    /// Calls declared functions and literals directly, anything else through
    /// a pointer.
    fn lower_call(&mut self, callee: NodeId, args: Nodes) -> Result<Option<Value>> {
        let ast = self.cx.ast;
        let direct = match ast[callee].kind {
            NodeKind::Atom {
                definition: Some(def),
                ..
            } if ast[def].as_fn().is_some() => Some(def),
            NodeKind::Fn(_) => Some(callee),
            _ => None,
        };

        let call = if let Some(func) = direct {
            let func_id = self.cx.function(func)?;
            let args = self.args(args)?;
            let func = self.cx.module.declare_func_in_func(func_id, self.builder.func);
            self.builder.ins().call(func, &args)
        } else {
            let Type::Fn(fn_ty) = ast.ty(callee) else {
                unreachable!("call of a non-function");
            };
            let callee = self.value(callee)?;
            let args = self.args(args)?;
            let sig = self.builder.import_signature(self.cx.signature(fn_ty));
            self.builder.ins().call_indirect(sig, callee, &args)
        };
        Ok(self.builder.inst_results(call).first().copied())
    }

    fn args(&mut self, args: Nodes) -> Result<Vec<Value>> {
        let ast = self.cx.ast;
        ast.iter(args).map(|arg| self.value(arg)).collect()
    }

    fn function_address(&mut self, id: NodeId) -> Result<Value> {
        let func_id = self.cx.function(id)?;
        let func = self.cx.module.declare_func_in_func(func_id, self.builder.func);
        Ok(self
            .builder
            .ins()
            .func_addr(self.cx.pointer_type(), func))
    }

    /// The variable an assignment target resolves to.
    fn reference(&self, id: NodeId) -> NodeId {
        match self.cx.ast[id].kind {
            NodeKind::Atom {
                definition: Some(def),
                ..
            } => def,
            _ => unreachable!("assignment to a value not in memory"),
        }
    }

    fn place(&self, var: NodeId) -> Place {
        let Some(decl) = self.cx.ast[var].as_var() else {
            unreachable!("not a variable");
        };
        let place = match decl.kind {
            VarKind::Global => self.cx.globals.get(&var).copied().map(Place::Global),
            VarKind::Local | VarKind::Param => self.slots.get(&var).copied().map(Place::Slot),
        };
        match place {
            Some(place) => place,
            None => unreachable!("variable used before its declaration"),
        }
    }

    fn load(&mut self, var: NodeId) -> Value {
        let ty = self.cx.value_type(self.cx.ast.ty(var));
        match self.place(var) {
            Place::Slot(slot) => self.builder.ins().stack_load(ty, slot, 0),
            Place::Global(data_id) => {
                let addr = self.global_address(data_id);
                self.builder.ins().load(ty, MemFlags::trusted(), addr, 0)
            }
        }
    }

    fn store(&mut self, var: NodeId, value: Value) {
        match self.place(var) {
            Place::Slot(slot) => {
                self.builder.ins().stack_store(value, slot, 0);
            }
            Place::Global(data_id) => {
                let addr = self.global_address(data_id);
                self.builder.ins().store(MemFlags::trusted(), value, addr, 0);
            }
        }
    }

    fn global_address(&mut self, data_id: DataId) -> Value {
        let global = self.cx.module.declare_data_in_func(data_id, self.builder.func);
        self.builder
            .ins()
            .global_value(self.cx.pointer_type(), global)
    }

    /// Allocates the stack slot of a local variable or parameter.
    fn slot(&mut self, var: NodeId) -> StackSlot {
        let ty = self.cx.value_type(self.cx.ast.ty(var));
        let align_shift = match ty.bytes() {
            1 => 0,
            2 => 1,
            4 => 2,
            _ => 3,
        };
        let data = StackSlotData::new(StackSlotKind::ExplicitSlot, ty.bytes(), align_shift);
        let slot = self.builder.create_sized_stack_slot(data);
        self.slots.insert(var, slot);
        slot
    }

    /// Clears an uninitialized local with `memset`.
    fn zero(&mut self, slot: StackSlot, ty: ir::Type) {
        let ptr = self.cx.pointer_type();
        let addr = self.builder.ins().stack_addr(ptr, slot, 0);
        let zero = self.builder.ins().iconst(types::I8, 0);
        let size = self.builder.ins().iconst(ptr, i64::from(ty.bytes()));
        let config = self.cx.module.target_config();
        self.builder.call_memset(config, addr, zero, size);
    }

    /// Attaches the statement's source line to the instructions that follow.
    fn mark(&mut self, stmt: NodeId) {
        let row = self.cx.ast[stmt].token.pos.row;
        self.builder.set_srcloc(SourceLoc::new(row + 1));
    }
}
