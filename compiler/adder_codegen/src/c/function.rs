//! Code generation for native function bodies.

use adder_ir::{
    Branch, BranchOp, Environment, ExitOp, FuncIR, Register, RegisterOp, RType,
};
use tracing::debug;

use crate::c::emitter::{
    declare_tuple_struct, emit_box, emit_cast, emit_dec_ref, emit_inc_ref, emit_unbox,
    error_value_check, undefined_tuple_initializer, Emitter,
};
use crate::c::{label_name, NATIVE_PREFIX, REG_PREFIX};
use crate::context::{ClassTable, EmitterContext};

/// The C header of a function's native entry point.
pub fn native_function_header(func: &FuncIR) -> String {
    let args: Vec<String> = func
        .args
        .iter()
        .map(|arg| format!("{}{REG_PREFIX}{}", arg.ty.ctype_spaced(), arg.name))
        .collect();
    format!(
        "static {}{NATIVE_PREFIX}{}({})",
        func.ret_type.ctype_spaced(),
        func.cname(),
        if args.is_empty() {
            "void".to_string()
        } else {
            args.join(", ")
        }
    )
}

/// Generate the native body of one finalized function.
///
/// Declarations for every register slot at or beyond the argument
/// count are accumulated in their own stream and concatenated ahead of
/// the body, so forward-referenced locals never need lookahead.
pub fn generate_native_function(
    func: &FuncIR,
    out: &mut Emitter,
    ctx: &mut EmitterContext,
    classes: &ClassTable<'_>,
    source_path: &str,
) {
    debug!(name = %func.cname(), "generating native function");

    let mut declarations = Emitter::new();
    let mut body = Emitter::new();

    declarations.emit_line(&format!("{} {{", native_function_header(func)));
    declarations.indent();
    body.indent();

    for reg in func.env.regs().skip(func.args.len()) {
        let ty = func.env.rtype(reg);
        if let RType::Tuple(t) = ty {
            declare_tuple_struct(ctx, t);
        }
        declarations.emit_line(&format!(
            "{}{REG_PREFIX}{};",
            ty.ctype_spaced(),
            func.env.name(reg)
        ));
    }

    let mut emitter = FunctionEmitter {
        body: &mut body,
        ctx,
        env: &func.env,
        classes,
        func_name: &func.name,
        source_path,
    };
    for block in &func.blocks {
        emitter.body.emit_label(block.label);
        for op in &block.ops {
            emitter.emit_op(op);
        }
        emitter.emit_exit(&block.exit);
    }

    body.dedent();
    body.emit_line("}");

    out.merge(declarations);
    out.merge(body);
}

/// Per-op emission state for one function body.
struct FunctionEmitter<'g> {
    body: &'g mut Emitter,
    ctx: &'g mut EmitterContext,
    env: &'g Environment,
    classes: &'g ClassTable<'g>,
    func_name: &'g str,
    source_path: &'g str,
}

impl FunctionEmitter<'_> {
    fn reg(&self, reg: Register) -> String {
        format!("{REG_PREFIX}{}", self.env.name(reg))
    }

    fn emit_line(&mut self, line: &str) {
        self.body.emit_line(line);
    }

    fn emit_op(&mut self, op: &RegisterOp) {
        match op {
            RegisterOp::Assign { dest, src } => {
                let line = format!("{} = {};", self.reg(*dest), self.reg(*src));
                self.emit_line(&line);
            }
            RegisterOp::LoadInt { dest, value } => {
                // Doubled: the low bit marks boxed fallback objects.
                let line = format!("{} = {};", self.reg(*dest), value * 2);
                self.emit_line(&line);
            }
            RegisterOp::LoadBool { dest, value } => {
                let line = format!("{} = {};", self.reg(*dest), i32::from(*value));
                self.emit_line(&line);
            }
            RegisterOp::LoadNone { dest } => {
                let dest = self.reg(*dest);
                self.emit_line(&format!("{dest} = Py_None;"));
                self.emit_line(&format!("Py_INCREF({dest});"));
            }
            RegisterOp::LoadErrorValue { dest, ty } => self.emit_load_error_value(*dest, ty),
            RegisterOp::NewList { dest, items } => self.emit_new_list(*dest, items),
            RegisterOp::NewTuple { dest, ty, items } => {
                declare_tuple_struct(self.ctx, ty);
                let dest = self.reg(*dest);
                for (i, item) in items.iter().enumerate() {
                    let line = format!("{dest}.f{i} = {};", self.reg(*item));
                    self.emit_line(&line);
                }
                let tuple_ty = RType::Tuple(ty.clone());
                if tuple_ty.is_refcounted() {
                    emit_inc_ref(self.body, &dest, &tuple_ty);
                }
            }
            RegisterOp::NewDict { dest } => {
                let line = format!("{} = PyDict_New();", self.reg(*dest));
                self.emit_line(&line);
            }
            RegisterOp::GetAttr {
                dest,
                obj,
                attr,
                class,
                ..
            } => {
                let class_ir = self.classes.get(&class.class_name);
                let line = format!(
                    "{} = CPY_GET_ATTR({}, {}, {}, {});",
                    self.reg(*dest),
                    self.reg(*obj),
                    class_ir.getter_index(attr),
                    class_ir.struct_name(),
                    class_ir.attr_type(attr).ctype()
                );
                self.emit_line(&line);
            }
            RegisterOp::SetAttr {
                dest,
                obj,
                attr,
                src,
                class,
            } => {
                let class_ir = self.classes.get(&class.class_name);
                let line = format!(
                    "{} = CPY_SET_ATTR({}, {}, {}, {}, {});",
                    self.reg(*dest),
                    self.reg(*obj),
                    class_ir.setter_index(attr),
                    self.reg(*src),
                    class_ir.struct_name(),
                    class_ir.attr_type(attr).ctype()
                );
                self.emit_line(&line);
            }
            RegisterOp::LoadStatic { dest, identifier, .. } => {
                let line = format!("{} = {identifier};", self.reg(*dest));
                self.emit_line(&line);
            }
            RegisterOp::PyGetAttr { dest, obj, attr, .. } => {
                let line = format!(
                    "{} = CPyObject_GetAttrString({}, \"{attr}\");",
                    self.reg(*dest),
                    self.reg(*obj)
                );
                self.emit_line(&line);
            }
            RegisterOp::TupleGet { dest, src, index, ty } => {
                let dest = self.reg(*dest);
                let line = format!("{dest} = {}.f{index};", self.reg(*src));
                self.emit_line(&line);
                // Extraction does not consume the source's ownership.
                if ty.is_refcounted() {
                    emit_inc_ref(self.body, &dest, ty);
                }
            }
            RegisterOp::Call { dest, fn_name, args } => {
                let callee = format!("{NATIVE_PREFIX}{fn_name}");
                self.emit_native_call(*dest, &callee, args.iter().copied());
            }
            RegisterOp::MethodCall {
                dest,
                obj,
                method,
                args,
                receiver,
            } => {
                let callee = format!("{NATIVE_PREFIX}{}___{method}", receiver.class_name);
                let call_args = std::iter::once(*obj).chain(args.iter().copied());
                self.emit_native_call(*dest, &callee, call_args);
            }
            RegisterOp::PyCall { dest, function, args } => {
                let line = format!(
                    "{}PyObject_CallFunctionObjArgs({}, {}NULL);",
                    self.dest_prefix(*dest),
                    self.reg(*function),
                    self.object_args(args)
                );
                self.emit_line(&line);
            }
            RegisterOp::PyMethodCall {
                dest,
                obj,
                method,
                args,
            } => {
                let line = format!(
                    "{}PyObject_CallMethodObjArgs({}, {}, {}NULL);",
                    self.dest_prefix(*dest),
                    self.reg(*obj),
                    self.reg(*method),
                    self.object_args(args)
                );
                self.emit_line(&line);
            }
            RegisterOp::IncRef { reg, ty } => {
                let target = self.reg(*reg);
                emit_inc_ref(self.body, &target, ty);
            }
            RegisterOp::DecRef { reg, ty } => {
                let target = self.reg(*reg);
                emit_dec_ref(self.body, &target, ty);
            }
            RegisterOp::Box { dest, src, src_ty } => {
                let src = self.reg(*src);
                let dest = self.reg(*dest);
                emit_box(self.body, self.ctx, &src, &dest, src_ty);
            }
            RegisterOp::Cast { dest, src, ty } => {
                let src = self.reg(*src);
                let dest = self.reg(*dest);
                emit_cast(self.body, &src, &dest, ty);
            }
            RegisterOp::Unbox { dest, src, ty } => {
                let src = self.reg(*src);
                let dest = self.reg(*dest);
                emit_unbox(self.body, self.ctx, &src, &dest, ty);
            }
        }
    }

    fn emit_exit(&mut self, exit: &ExitOp) {
        match exit {
            ExitOp::Goto { label } => {
                let line = format!("goto {};", label_name(*label));
                self.emit_line(&line);
            }
            ExitOp::Branch(branch) => self.emit_branch(branch),
            ExitOp::Return { reg } => {
                let line = format!("return {};", self.reg(*reg));
                self.emit_line(&line);
            }
            // A block that cannot fall through emits nothing; upstream
            // guarantees control never reaches it.
            ExitOp::Unreachable => {}
        }
    }

    fn emit_branch(&mut self, branch: &Branch) {
        let neg = if branch.negated { "!" } else { "" };
        let left = self.reg(branch.left);
        let cond = match branch.op {
            BranchOp::BoolExpr => format!("{neg}({left})"),
            BranchOp::IsNone => {
                let compare = if branch.negated { "!=" } else { "==" };
                format!("{left} {compare} Py_None")
            }
            BranchOp::IsError => {
                error_value_check(&left, self.env.rtype(branch.left), branch.negated)
            }
            _ => {
                let right = match branch.right {
                    Some(right) => self.reg(right),
                    None => panic!("integer comparison branch is missing its right register"),
                };
                let helper = match branch.op {
                    BranchOp::IntEq => "CPyTagged_IsEq",
                    BranchOp::IntNe => "CPyTagged_IsNe",
                    BranchOp::IntLt => "CPyTagged_IsLt",
                    BranchOp::IntLe => "CPyTagged_IsLe",
                    BranchOp::IntGt => "CPyTagged_IsGt",
                    BranchOp::IntGe => "CPyTagged_IsGe",
                    _ => panic!("unary branch op reached the binary path"),
                };
                format!("{neg}{helper}({left}, {right})")
            }
        };

        // Failure-detection branches are rarely taken.
        let cond = if branch.traceback_entry.is_some() {
            format!("unlikely({cond})")
        } else {
            cond
        };

        self.emit_line(&format!("if ({cond}) {{"));
        if let Some((func, line)) = &branch.traceback_entry {
            debug_assert_eq!(func, self.func_name, "traceback entry names another function");
            let call = format!(
                "CPy_AddTraceback(\"{}\", \"{func}\", {line}, _globals);",
                self.source_path
            );
            self.emit_line(&call);
        }
        let goto_true = format!("goto {};", label_name(branch.true_label));
        let goto_false = format!("    goto {};", label_name(branch.false_label));
        self.body
            .emit_lines(&[&goto_true, "} else", &goto_false]);
    }

    fn emit_load_error_value(&mut self, dest: Register, ty: &RType) {
        match ty {
            RType::Tuple(t) => {
                declare_tuple_struct(self.ctx, t);
                let tmp = self.ctx.temp_name();
                let init = format!(
                    "{} {tmp} = {};",
                    t.ctype(),
                    undefined_tuple_initializer(t)
                );
                self.emit_line(&init);
                let line = format!("{} = {tmp};", self.reg(dest));
                self.emit_line(&line);
            }
            other => match other.c_error_value() {
                Some(value) => {
                    let line = format!("{} = {value};", self.reg(dest));
                    self.emit_line(&line);
                }
                None => panic!("type {other} has no error value"),
            },
        }
    }

    fn emit_new_list(&mut self, dest: Register, items: &[Register]) {
        let dest = self.reg(dest);
        self.emit_line(&format!("{dest} = PyList_New({});", items.len()));
        for item in items {
            let line = format!("Py_INCREF({});", self.reg(*item));
            self.emit_line(&line);
        }
        // Fill only if the allocation succeeded; a failed result is
        // caught by the surrounding error-check branch.
        self.emit_line(&format!("if ({dest} != NULL) {{"));
        for (i, item) in items.iter().enumerate() {
            let line = format!("PyList_SET_ITEM({dest}, {i}, {});", self.reg(*item));
            self.emit_line(&line);
        }
        self.emit_line("}");
    }

    fn emit_native_call(
        &mut self,
        dest: Option<Register>,
        callee: &str,
        args: impl Iterator<Item = Register>,
    ) {
        let args = args.map(|arg| self.reg(arg)).collect::<Vec<_>>().join(", ");
        let line = format!("{}{callee}({args});", self.dest_prefix(dest));
        self.emit_line(&line);
    }

    fn dest_prefix(&self, dest: Option<Register>) -> String {
        match dest {
            Some(dest) => format!("{} = ", self.reg(dest)),
            None => String::new(),
        }
    }

    fn object_args(&self, args: &[Register]) -> String {
        let mut joined = args
            .iter()
            .map(|arg| self.reg(*arg))
            .collect::<Vec<_>>()
            .join(", ");
        if !joined.is_empty() {
            joined.push_str(", ");
        }
        joined
    }
}
