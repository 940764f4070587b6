//! Function, class, and module containers.

use std::fmt;

use crate::ops::{BasicBlock, Environment, ExitOp};
use crate::types::RType;

/// Mangled C name for the per-import module-object global.
pub fn c_module_name(module_name: &str) -> String {
    format!("module_{}", module_name.replace('.', "__dot__"))
}

/// A formal argument: surface name plus runtime type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RuntimeArg {
    pub name: String,
    pub ty: RType,
}

impl RuntimeArg {
    pub fn new(name: impl Into<String>, ty: RType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

// ── Functions ───────────────────────────────────────────────────────

/// Intermediate representation of one function.
///
/// Block 0 is the entry block. Every register read by an op must have
/// been produced by a prior op or be a declared argument; the
/// [`Environment`] owns the name/type bookkeeping for all of them.
pub struct FuncIR {
    pub name: String,
    /// Owning class, for methods; affects the emitted symbol name.
    pub class_name: Option<String>,
    pub args: Vec<RuntimeArg>,
    pub ret_type: RType,
    pub blocks: Vec<BasicBlock>,
    pub env: Environment,
}

impl FuncIR {
    pub fn new(
        name: impl Into<String>,
        class_name: Option<String>,
        args: Vec<RuntimeArg>,
        ret_type: RType,
        blocks: Vec<BasicBlock>,
        env: Environment,
    ) -> Self {
        Self {
            name: name.into(),
            class_name,
            args,
            ret_type,
            blocks,
            env,
        }
    }

    /// The mangling-ready symbol name: `name` for module-level
    /// functions, `Class___name` for methods.
    pub fn cname(&self) -> String {
        match &self.class_name {
            Some(class_name) => format!("{class_name}___{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for FuncIR {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_func(self).join("\n"))
    }
}

// ── Classes ─────────────────────────────────────────────────────────

/// Intermediate representation of a class; also describes the runtime
/// layout of native instances.
///
/// Attribute order fixes the storage-slot layout and method order fixes
/// the dispatch-table layout: each attribute occupies two consecutive
/// vtable slots (getter then setter) and methods follow after all
/// attribute slots. Shape is fixed before code generation begins.
pub struct ClassIR {
    pub name: String,
    pub attributes: Vec<(String, RType)>,
    pub methods: Vec<FuncIR>,
}

impl ClassIR {
    pub fn new(name: impl Into<String>, attributes: Vec<(String, RType)>) -> Self {
        Self {
            name: name.into(),
            attributes,
            methods: Vec::new(),
        }
    }

    /// Name of the generated C object struct.
    pub fn struct_name(&self) -> String {
        format!("{}Object", self.name)
    }

    /// Name of the generated C type object.
    pub fn type_struct(&self) -> String {
        format!("{}Type", self.name)
    }

    /// Vtable slot of the named attribute's getter.
    ///
    /// # Panics
    ///
    /// Panics if the class has no such attribute.
    pub fn getter_index(&self, name: &str) -> usize {
        match self.attributes.iter().position(|(attr, _)| attr == name) {
            Some(i) => i * 2,
            None => panic!("{:?} has no attribute {name:?}", self.name),
        }
    }

    /// Vtable slot of the named attribute's setter.
    pub fn setter_index(&self, name: &str) -> usize {
        self.getter_index(name) + 1
    }

    /// Vtable slot of the named method.
    ///
    /// # Panics
    ///
    /// Panics if the class has no such method.
    pub fn method_index(&self, name: &str) -> usize {
        let base = self.attributes.len() * 2;
        match self.methods.iter().position(|m| m.name == name) {
            Some(i) => base + i,
            None => panic!("{:?} has no method {name:?}", self.name),
        }
    }

    /// Declared type of the named attribute.
    ///
    /// # Panics
    ///
    /// Panics if the class has no such attribute.
    pub fn attr_type(&self, name: &str) -> &RType {
        match self.attributes.iter().find(|(attr, _)| attr == name) {
            Some((_, ty)) => ty,
            None => panic!("{:?} has no attribute {name:?}", self.name),
        }
    }

    pub fn get_method(&self, name: &str) -> Option<&FuncIR> {
        self.methods.iter().find(|m| m.name == name)
    }
}

// ── Literals ────────────────────────────────────────────────────────

/// A module-level literal constant, materialized into a static global
/// during module initialization.
///
/// Integers keep their decimal string form (they are arbitrary
/// precision); floats are stored as raw bits so the type stays `Eq` +
/// `Hash`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(String),
    Float(u64),
    Str(String),
}

impl Literal {
    pub fn int(value: i64) -> Self {
        Literal::Int(value.to_string())
    }

    pub fn float(value: f64) -> Self {
        Literal::Float(value.to_bits())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Literal::Str(value.into())
    }
}

// ── Modules ─────────────────────────────────────────────────────────

/// Intermediate representation of one source module.
pub struct ModuleIR {
    /// Imported module names; `builtins` always comes first.
    pub imports: Vec<String>,
    literals: Vec<(Literal, String)>,
    pub functions: Vec<FuncIR>,
    pub classes: Vec<ClassIR>,
}

impl ModuleIR {
    pub fn new(imports: Vec<String>, functions: Vec<FuncIR>, classes: Vec<ClassIR>) -> Self {
        let mut imports = imports;
        if !imports.iter().any(|imp| imp == "builtins") {
            imports.insert(0, "builtins".to_string());
        }
        Self {
            imports,
            literals: Vec::new(),
            functions,
            classes,
        }
    }

    /// The literal table in registration order: deterministic iteration
    /// is what keeps repeated compilations byte-identical.
    pub fn literals(&self) -> &[(Literal, String)] {
        &self.literals
    }

    /// Register a literal under an explicit static symbol. Symbols must
    /// be unique across the whole compilation unit; the lowering pass
    /// guarantees this.
    pub fn add_literal(&mut self, literal: Literal, symbol: impl Into<String>) {
        let symbol = symbol.into();
        assert!(
            self.literals.iter().all(|(_, s)| *s != symbol),
            "literal symbol {symbol:?} registered twice"
        );
        self.literals.push((literal, symbol));
    }

    /// Resolve a literal to its static symbol, registering it under a
    /// fresh `literal_<n>` symbol on first use.
    pub fn literal_symbol(&mut self, literal: &Literal) -> String {
        if let Some((_, symbol)) = self.literals.iter().find(|(lit, _)| lit == literal) {
            return symbol.clone();
        }
        let symbol = format!("literal_{}", self.literals.len());
        self.literals.push((literal.clone(), symbol.clone()));
        symbol
    }
}

// ── IR listing ──────────────────────────────────────────────────────

fn format_blocks(blocks: &[BasicBlock], env: &Environment) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        lines.push(format!("L{}:", block.label.raw()));
        for op in &block.ops {
            lines.push(format!("    {}", op.to_str(env)));
        }
        // Hide a goto that just falls through to the next block.
        let fallthrough = matches!(
            &block.exit,
            ExitOp::Goto { label } if blocks.get(i + 1).is_some_and(|next| next.label == *label)
        );
        if !fallthrough {
            lines.push(format!("    {}", block.exit.to_str(env)));
        }
    }
    lines
}

/// Render a function as a human-readable IR listing: header, register
/// environment, then the blocks.
pub fn format_func(func: &FuncIR) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "def {}({}):",
        func.name,
        func.args
            .iter()
            .map(|arg| arg.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    for line in func.env.to_lines() {
        lines.push(format!("    {line}"));
    }
    lines.extend(format_blocks(&func.blocks, &func.env));
    lines
}
