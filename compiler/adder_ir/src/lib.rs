//! adder IR — intermediate representation for the adder compiler.
//!
//! This crate contains the backend's data model:
//!
//! - [`types`] — the closed set of runtime representations ([`RType`]):
//!   boxed objects, unboxed tagged integers and bytes, fixed-length
//!   unboxed tuples, native class instances, nullable wrappers.
//! - [`ops`] — registers, the [`Environment`] register arena, the
//!   [`RegisterOp`]/[`ExitOp`] instruction sums, and [`BasicBlock`]s.
//! - [`func`] — [`FuncIR`], [`ClassIR`], and [`ModuleIR`] containers
//!   plus the human-readable IR listing.
//! - [`sametype`] — structural type and signature equality.
//!
//! The upstream lowering pass produces these structures; the
//! exception- and refcount-insertion passes rewrite them in place; the
//! code generator in `adder_codegen` consumes them.

pub mod func;
pub mod ops;
pub mod sametype;
pub mod types;

pub use func::{c_module_name, format_func, ClassIR, FuncIR, Literal, ModuleIR, RuntimeArg};
pub use ops::{
    BasicBlock, Branch, BranchOp, Environment, ErrorKind, ExitOp, Label, Register, RegisterOp,
};
pub use sametype::{is_same_method_signature, is_same_signature, is_same_type};
pub use types::{short_name, RInstance, ROptional, RPrimitive, RTuple, RType};
