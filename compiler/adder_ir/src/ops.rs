//! Low-level opcodes for the register-based IR.
//!
//! Opcodes operate on abstract registers in a register machine. Each
//! register has a name and a runtime type, tracked in an
//! [`Environment`]. A register can hold a local variable, an
//! intermediate expression value, a condition flag, or a literal.
//!
//! Instructions split into two closed sums: [`RegisterOp`] (produces
//! zero-or-one result register, consumes zero-or-more sources, carries
//! an error-signalling mode) and [`ExitOp`] (how control leaves a
//! basic block — every [`BasicBlock`] ends in exactly one, which the
//! block structure enforces).

use std::fmt::Write as _;

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::types::{RInstance, RTuple, RType};

// ── ID newtypes ─────────────────────────────────────────────────────

/// Register ID within one function's [`Environment`].
///
/// A value-producing operation allocates its destination from the
/// environment at construction and stores the index — the operation's
/// result handle is the arena slot, never the operation object itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Register(u32);

impl Register {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic-block label within one function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Label(u32);

impl Label {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Error signalling ────────────────────────────────────────────────

/// How a [`RegisterOp`] signals failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation never fails.
    Never,
    /// Failure stores the destination type's error sentinel.
    Magic,
    /// Failure stores boolean false.
    False,
}

// ── Environment ─────────────────────────────────────────────────────

struct RegInfo {
    name: String,
    ty: RType,
}

/// Name and type bookkeeping for one function's registers.
///
/// Registers are never deallocated or renumbered: indices are assigned
/// `0..n` with no gaps, arguments first, and the count only grows.
/// Generated declarations are emitted once, up front, for every slot
/// index at or beyond the formal-argument count.
#[derive(Default)]
pub struct Environment {
    regs: Vec<RegInfo>,
    symtable: FxHashMap<String, Register>,
    temp_index: u32,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, name: String, ty: RType) -> Register {
        let reg = Register::new(u32::try_from(self.regs.len()).unwrap_or_else(|_| {
            panic!("register count overflow");
        }));
        self.regs.push(RegInfo { name, ty });
        reg
    }

    /// Bind a new register for a surface-level variable.
    ///
    /// # Panics
    ///
    /// Panics if `var` is already bound — rebinding would alias two
    /// registers under one name.
    pub fn add_local(&mut self, var: &str, ty: RType) -> Register {
        assert!(
            !self.symtable.contains_key(var),
            "variable {var:?} is already bound"
        );
        let reg = self.add(var.to_string(), ty);
        self.symtable.insert(var.to_string(), reg);
        reg
    }

    /// Allocate a fresh unnamed temporary.
    pub fn add_temp(&mut self, ty: RType) -> Register {
        let name = format!("r{}", self.temp_index);
        self.temp_index += 1;
        self.add(name, ty)
    }

    /// Resolve a previously bound variable.
    ///
    /// # Panics
    ///
    /// Panics if `var` was never bound; an unbound lookup means the
    /// upstream lowering produced malformed IR.
    pub fn lookup(&self, var: &str) -> Register {
        match self.symtable.get(var) {
            Some(reg) => *reg,
            None => panic!("lookup of unbound variable {var:?}"),
        }
    }

    pub fn num_regs(&self) -> usize {
        self.regs.len()
    }

    pub fn name(&self, reg: Register) -> &str {
        &self.regs[reg.index()].name
    }

    pub fn rtype(&self, reg: Register) -> &RType {
        &self.regs[reg.index()].ty
    }

    pub fn regs(&self) -> impl Iterator<Item = Register> + '_ {
        (0..self.regs.len()).map(|i| {
            Register::new(u32::try_from(i).unwrap_or_else(|_| panic!("register count overflow")))
        })
    }

    /// Human-readable register listing, grouping consecutive registers
    /// of the same type: `x, r0 :: int`.
    pub fn to_lines(&self) -> Vec<String> {
        let mut result = Vec::new();
        let mut i = 0;
        let n = self.regs.len();
        while i < n {
            let start = i;
            let mut group = vec![self.regs[start].name.as_str()];
            while i + 1 < n && self.regs[i + 1].ty == self.regs[start].ty {
                i += 1;
                group.push(self.regs[i].name.as_str());
            }
            i += 1;
            result.push(format!(
                "{} :: {}",
                group.join(", "),
                self.regs[start].ty
            ));
        }
        result
    }
}

// ── Branches ────────────────────────────────────────────────────────

/// Comparison performed by a [`Branch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BranchOp {
    IntEq,
    IntNe,
    IntLt,
    IntLe,
    IntGt,
    IntGe,
    /// Truthiness of a boolean expression register (unary).
    BoolExpr,
    /// Identity comparison against the `None` singleton (unary).
    IsNone,
    /// Comparison against the register type's error sentinel (unary).
    /// For tuple-typed registers this compares the first field, since
    /// a tuple has no whole-value sentinel.
    IsError,
}

impl BranchOp {
    pub fn is_unary(self) -> bool {
        matches!(self, BranchOp::BoolExpr | BranchOp::IsNone | BranchOp::IsError)
    }
}

/// Conditional two-way branch: `if [not] cond goto L1 else goto L2`.
///
/// Branches must not themselves fail; a fallible comparison is split
/// into the fallible op followed by a branch on its result.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Branch {
    pub left: Register,
    /// `None` for the unary [`BranchOp`] kinds.
    pub right: Option<Register>,
    pub true_label: Label,
    pub false_label: Label,
    pub op: BranchOp,
    pub negated: bool,
    /// When set, the true edge detects a propagated failure: emission
    /// marks the test as rarely taken and records a traceback entry
    /// (enclosing function name, source line) before the jump.
    pub traceback_entry: Option<(String, u32)>,
}

impl Branch {
    pub fn new(
        left: Register,
        right: Option<Register>,
        true_label: Label,
        false_label: Label,
        op: BranchOp,
    ) -> Self {
        assert_eq!(
            op.is_unary(),
            right.is_none(),
            "unary branch ops take exactly one register"
        );
        Self {
            left,
            right,
            true_label,
            false_label,
            op,
            negated: false,
            traceback_entry: None,
        }
    }

    /// Swap the target labels and toggle negation.
    ///
    /// Used by the exception-insertion pass to route failure edges
    /// without duplicating comparison logic.
    pub fn invert(&mut self) {
        std::mem::swap(&mut self.true_label, &mut self.false_label);
        self.negated = !self.negated;
    }

    pub fn sources(&self) -> SmallVec<[Register; 2]> {
        match self.right {
            Some(right) => smallvec![self.left, right],
            None => smallvec![self.left],
        }
    }
}

// ── Control exits ───────────────────────────────────────────────────

/// Control exit of a basic block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExitOp {
    /// Unconditional jump.
    Goto { label: Label },
    /// Conditional two-way branch.
    Branch(Branch),
    /// Return a register's value; no implicit conversion.
    Return { reg: Register },
    /// Marks the end of a body that cannot fall through, e.g. after a
    /// return on every path. Keeps the block well-terminated without
    /// fabricating a jump.
    Unreachable,
}

impl ExitOp {
    /// Successor labels, in branch order.
    pub fn targets(&self) -> SmallVec<[Label; 2]> {
        match self {
            ExitOp::Goto { label } => smallvec![*label],
            ExitOp::Branch(b) => smallvec![b.true_label, b.false_label],
            ExitOp::Return { .. } | ExitOp::Unreachable => smallvec![],
        }
    }

    pub fn sources(&self) -> SmallVec<[Register; 2]> {
        match self {
            ExitOp::Goto { .. } | ExitOp::Unreachable => smallvec![],
            ExitOp::Branch(b) => b.sources(),
            ExitOp::Return { reg } => smallvec![*reg],
        }
    }
}

// ── Register operations ─────────────────────────────────────────────

/// An instruction that can be written as `r1 = f(r2, ..., rn)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegisterOp {
    /// `dest = src`.
    Assign { dest: Register, src: Register },
    /// `dest = n`. The stored value is doubled: the low bit of the
    /// tagged representation distinguishes inline small integers from
    /// boxed fallback objects, and decoders must honor the convention.
    LoadInt { dest: Register, value: i64 },
    /// `dest = 1` / `dest = 0` (raw unboxed byte).
    LoadBool { dest: Register, value: bool },
    /// Store the shared `None` singleton; the singleton is retained on
    /// every store.
    LoadNone { dest: Register },
    /// `dest = <error value for type>`.
    LoadErrorValue { dest: Register, ty: RType },
    /// `dest = [r, ...]` — fixed-size list construction.
    NewList { dest: Register, items: Vec<Register> },
    /// `dest = (r, ...)` — fixed-length unboxed tuple construction.
    NewTuple {
        dest: Register,
        ty: RTuple,
        items: Vec<Register>,
    },
    /// `dest = {}` — fresh empty mapping.
    NewDict { dest: Register },
    /// `dest = obj.attr` on a native instance, through the attribute's
    /// getter slot.
    GetAttr {
        dest: Register,
        obj: Register,
        attr: String,
        class: RInstance,
        ty: RType,
    },
    /// `obj.attr = src` on a native instance; `dest` receives the
    /// boolean success flag.
    SetAttr {
        dest: Register,
        obj: Register,
        attr: String,
        src: Register,
        class: RInstance,
    },
    /// `dest = identifier` — module-level generated static.
    LoadStatic {
        dest: Register,
        identifier: String,
        ty: RType,
    },
    /// `dest = obj.attr` through the interpreter's string-keyed
    /// attribute lookup.
    PyGetAttr {
        dest: Register,
        obj: Register,
        attr: String,
        ty: RType,
    },
    /// `dest = src.f<index>` — positional tuple field extraction. The
    /// extracted field is retained; the source keeps its own reference.
    TupleGet {
        dest: Register,
        src: Register,
        index: usize,
        ty: RType,
    },
    /// Native call `f(arg, ...)` to a compiled symbol.
    Call {
        dest: Option<Register>,
        fn_name: String,
        args: Vec<Register>,
    },
    /// Native method call `obj.m(arg, ...)` on a compiled class.
    MethodCall {
        dest: Option<Register>,
        obj: Register,
        method: String,
        args: Vec<Register>,
        receiver: RInstance,
    },
    /// Interpreter-mediated call `f(arg, ...)`.
    PyCall {
        dest: Option<Register>,
        function: Register,
        args: Vec<Register>,
    },
    /// Interpreter-mediated method call `obj.m(arg, ...)`.
    PyMethodCall {
        dest: Option<Register>,
        obj: Register,
        method: Register,
        args: Vec<Register>,
    },
    /// Reference-count increment; `ty` must be refcounted.
    IncRef { reg: Register, ty: RType },
    /// Reference-count decrement; `ty` must be refcounted.
    DecRef { reg: Register, ty: RType },
    /// Box an unboxed value into a plain object.
    Box {
        dest: Register,
        src: Register,
        src_ty: RType,
    },
    /// Runtime type check; no representation conversion and no
    /// reference-count adjustment — ownership bookkeeping stays with
    /// the caller.
    Cast {
        dest: Register,
        src: Register,
        ty: RType,
    },
    /// Runtime type check plus conversion to an unboxed
    /// representation; stores the magic sentinel on mismatch.
    Unbox {
        dest: Register,
        src: Register,
        ty: RType,
    },
}

impl RegisterOp {
    /// The error-signalling mode of this operation.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            RegisterOp::Assign { .. }
            | RegisterOp::LoadInt { .. }
            | RegisterOp::LoadBool { .. }
            | RegisterOp::LoadNone { .. }
            | RegisterOp::LoadErrorValue { .. }
            | RegisterOp::NewTuple { .. }
            | RegisterOp::LoadStatic { .. }
            | RegisterOp::TupleGet { .. }
            | RegisterOp::IncRef { .. }
            | RegisterOp::DecRef { .. }
            | RegisterOp::Box { .. } => ErrorKind::Never,
            RegisterOp::NewList { .. }
            | RegisterOp::NewDict { .. }
            | RegisterOp::GetAttr { .. }
            | RegisterOp::PyGetAttr { .. }
            | RegisterOp::Call { .. }
            | RegisterOp::MethodCall { .. }
            | RegisterOp::PyCall { .. }
            | RegisterOp::PyMethodCall { .. }
            | RegisterOp::Cast { .. }
            | RegisterOp::Unbox { .. } => ErrorKind::Magic,
            RegisterOp::SetAttr { .. } => ErrorKind::False,
        }
    }

    pub fn can_raise(&self) -> bool {
        self.error_kind() != ErrorKind::Never
    }

    /// The destination register, if this operation produces a value.
    pub fn dest(&self) -> Option<Register> {
        match self {
            RegisterOp::Assign { dest, .. }
            | RegisterOp::LoadInt { dest, .. }
            | RegisterOp::LoadBool { dest, .. }
            | RegisterOp::LoadNone { dest }
            | RegisterOp::LoadErrorValue { dest, .. }
            | RegisterOp::NewList { dest, .. }
            | RegisterOp::NewTuple { dest, .. }
            | RegisterOp::NewDict { dest }
            | RegisterOp::GetAttr { dest, .. }
            | RegisterOp::SetAttr { dest, .. }
            | RegisterOp::LoadStatic { dest, .. }
            | RegisterOp::PyGetAttr { dest, .. }
            | RegisterOp::TupleGet { dest, .. }
            | RegisterOp::Box { dest, .. }
            | RegisterOp::Cast { dest, .. }
            | RegisterOp::Unbox { dest, .. } => Some(*dest),
            RegisterOp::Call { dest, .. }
            | RegisterOp::MethodCall { dest, .. }
            | RegisterOp::PyCall { dest, .. }
            | RegisterOp::PyMethodCall { dest, .. } => *dest,
            RegisterOp::IncRef { .. } | RegisterOp::DecRef { .. } => None,
        }
    }

    /// All registers read by this operation.
    pub fn sources(&self) -> Vec<Register> {
        match self {
            RegisterOp::LoadInt { .. }
            | RegisterOp::LoadBool { .. }
            | RegisterOp::LoadNone { .. }
            | RegisterOp::LoadErrorValue { .. }
            | RegisterOp::NewDict { .. }
            | RegisterOp::LoadStatic { .. } => vec![],
            RegisterOp::Assign { src, .. } => vec![*src],
            RegisterOp::NewList { items, .. } | RegisterOp::NewTuple { items, .. } => {
                items.clone()
            }
            RegisterOp::GetAttr { obj, .. } | RegisterOp::PyGetAttr { obj, .. } => vec![*obj],
            RegisterOp::SetAttr { obj, src, .. } => vec![*obj, *src],
            RegisterOp::TupleGet { src, .. } => vec![*src],
            RegisterOp::Call { args, .. } => args.clone(),
            RegisterOp::MethodCall { obj, args, .. } => {
                let mut regs = args.clone();
                regs.push(*obj);
                regs
            }
            RegisterOp::PyCall { function, args, .. } => {
                let mut regs = args.clone();
                regs.push(*function);
                regs
            }
            RegisterOp::PyMethodCall {
                obj, method, args, ..
            } => {
                let mut regs = args.clone();
                regs.push(*obj);
                regs.push(*method);
                regs
            }
            RegisterOp::IncRef { reg, .. } | RegisterOp::DecRef { reg, .. } => vec![*reg],
            RegisterOp::Box { src, .. }
            | RegisterOp::Cast { src, .. }
            | RegisterOp::Unbox { src, .. } => vec![*src],
        }
    }
}

// ── Basic blocks ────────────────────────────────────────────────────

/// Basic IR block: a label, ordered register operations, and exactly
/// one control exit.
///
/// While building the IR, ops that can fail sit in the middle of a
/// block with their failures unchecked; the exception-insertion pass
/// later splits blocks and adds explicit sentinel-check branches, so
/// the single-exit shape holds throughout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BasicBlock {
    pub label: Label,
    pub ops: Vec<RegisterOp>,
    pub exit: ExitOp,
}

impl BasicBlock {
    pub fn new(label: Label, exit: ExitOp) -> Self {
        Self {
            label,
            ops: Vec::new(),
            exit,
        }
    }
}

// ── Pretty-printing ─────────────────────────────────────────────────

fn fmt_label(label: Label) -> String {
    format!("L{}", label.raw())
}

fn fmt_call(env: &Environment, dest: Option<Register>, callee: &str, args: &[Register]) -> String {
    let args = args
        .iter()
        .map(|arg| env.name(*arg))
        .collect::<Vec<_>>()
        .join(", ");
    match dest {
        Some(dest) => format!("{} = {callee}({args})", env.name(dest)),
        None => format!("{callee}({args})"),
    }
}

fn refcount_suffix(ty: &RType) -> String {
    if ty.is_int() || ty.is_bool() {
        format!(" :: {ty}")
    } else {
        String::new()
    }
}

impl RegisterOp {
    /// Render this op for the human-readable IR listing.
    pub fn to_str(&self, env: &Environment) -> String {
        match self {
            RegisterOp::Assign { dest, src } => {
                format!("{} = {}", env.name(*dest), env.name(*src))
            }
            RegisterOp::LoadInt { dest, value } => {
                format!("{} = {value}", env.name(*dest))
            }
            RegisterOp::LoadBool { dest, value } => {
                format!("{} = {value}", env.name(*dest))
            }
            RegisterOp::LoadNone { dest } => format!("{} = None", env.name(*dest)),
            RegisterOp::LoadErrorValue { dest, ty } => {
                format!("{} = <error> :: {ty}", env.name(*dest))
            }
            RegisterOp::NewList { dest, items } => {
                let items = items
                    .iter()
                    .map(|item| env.name(*item))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} = [{items}]", env.name(*dest))
            }
            RegisterOp::NewTuple { dest, items, .. } => {
                let items = items
                    .iter()
                    .map(|item| env.name(*item))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} = ({items})", env.name(*dest))
            }
            RegisterOp::NewDict { dest } => format!("{} = {{}}", env.name(*dest)),
            RegisterOp::GetAttr { dest, obj, attr, .. }
            | RegisterOp::PyGetAttr { dest, obj, attr, .. } => {
                format!("{} = {}.{attr}", env.name(*dest), env.name(*obj))
            }
            RegisterOp::SetAttr {
                dest, obj, attr, src, ..
            } => format!(
                "{}.{attr} = {}; {} = is_error",
                env.name(*obj),
                env.name(*src),
                env.name(*dest)
            ),
            RegisterOp::LoadStatic { dest, identifier, .. } => {
                format!("{} = {identifier} :: static", env.name(*dest))
            }
            RegisterOp::TupleGet { dest, src, index, .. } => {
                format!("{} = {}[{index}]", env.name(*dest), env.name(*src))
            }
            RegisterOp::Call { dest, fn_name, args } => fmt_call(env, *dest, fn_name, args),
            RegisterOp::MethodCall {
                dest, obj, method, args, ..
            } => {
                let callee = format!("{}.{method}", env.name(*obj));
                fmt_call(env, *dest, &callee, args)
            }
            RegisterOp::PyCall {
                dest, function, args,
            } => {
                let callee = env.name(*function).to_string();
                format!("{} :: py", fmt_call(env, *dest, &callee, args))
            }
            RegisterOp::PyMethodCall {
                dest, obj, method, args,
            } => {
                let callee = format!("{}.{}", env.name(*obj), env.name(*method));
                format!("{} :: py", fmt_call(env, *dest, &callee, args))
            }
            RegisterOp::IncRef { reg, ty } => {
                format!("inc_ref {}{}", env.name(*reg), refcount_suffix(ty))
            }
            RegisterOp::DecRef { reg, ty } => {
                format!("dec_ref {}{}", env.name(*reg), refcount_suffix(ty))
            }
            RegisterOp::Box { dest, src, src_ty } => {
                format!("{} = box({src_ty}, {})", env.name(*dest), env.name(*src))
            }
            RegisterOp::Cast { dest, src, ty } => {
                format!("{} = cast({ty}, {})", env.name(*dest), env.name(*src))
            }
            RegisterOp::Unbox { dest, src, ty } => {
                format!("{} = unbox({ty}, {})", env.name(*dest), env.name(*src))
            }
        }
    }
}

impl ExitOp {
    /// Render this exit for the human-readable IR listing.
    pub fn to_str(&self, env: &Environment) -> String {
        match self {
            ExitOp::Goto { label } => format!("goto {}", fmt_label(*label)),
            ExitOp::Branch(b) => b.to_str(env),
            ExitOp::Return { reg } => format!("return {}", env.name(*reg)),
            ExitOp::Unreachable => "unreachable".to_string(),
        }
    }
}

impl Branch {
    fn to_str(&self, env: &Environment) -> String {
        let not = if self.negated { "not " } else { "" };
        let left = env.name(self.left);
        let (cond, ty) = match self.op {
            BranchOp::IntEq => (format!("{not}{left} == {}", self.right_name(env)), "int"),
            BranchOp::IntNe => (format!("{not}{left} != {}", self.right_name(env)), "int"),
            BranchOp::IntLt => (format!("{not}{left} < {}", self.right_name(env)), "int"),
            BranchOp::IntLe => (format!("{not}{left} <= {}", self.right_name(env)), "int"),
            BranchOp::IntGt => (format!("{not}{left} > {}", self.right_name(env)), "int"),
            BranchOp::IntGe => (format!("{not}{left} >= {}", self.right_name(env)), "int"),
            BranchOp::BoolExpr => (format!("{not}{left}"), "bool"),
            BranchOp::IsNone => (format!("{not}{left} is None"), "object"),
            BranchOp::IsError => (format!("{not}is_error({left})"), ""),
        };
        let mut line = format!("if {cond} goto {}", fmt_label(self.true_label));
        if let Some((func, source_line)) = &self.traceback_entry {
            let _ = write!(line, " (error at {func}:{source_line})");
        }
        let _ = write!(line, " else goto {}", fmt_label(self.false_label));
        if !ty.is_empty() {
            let _ = write!(line, " :: {ty}");
        }
        line
    }

    fn right_name<'e>(&self, env: &'e Environment) -> &'e str {
        match self.right {
            Some(right) => env.name(right),
            None => panic!("binary branch op is missing its right register"),
        }
    }
}
