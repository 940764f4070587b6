//! The C text backend.
//!
//! Walks finalized IR and emits one C compilation unit in the host
//! runtime's extension-module source form: topologically-ordered
//! forward declarations, per-module method tables and initializers,
//! then native and wrapper function bodies.

pub mod class_gen;
pub mod emitter;
pub mod function;
pub mod module;
pub mod wrapper;

use adder_ir::Label;

/// Prefix for generated register names.
pub const REG_PREFIX: &str = "cpy_r_";

/// Prefix for native function symbols.
pub const NATIVE_PREFIX: &str = "CPyDef_";

/// Prefix for interpreter-facing wrapper symbols.
pub const WRAPPER_PREFIX: &str = "CPyPy_";

/// The C label for a basic block.
pub fn label_name(label: Label) -> String {
    format!("CPyL{}", label.raw())
}
