//! Line emission and representation-specific C sequences.
//!
//! The [`Emitter`] is a plain indented text buffer; the free functions
//! beside it emit the reference-counting, boxing, casting, and
//! unboxing sequences for each runtime representation. Callers pick
//! the sequence; the sequences own the invariants (a non-refcounted
//! type must never reach a retain/release path, unboxed and boxed
//! conversions must not be mixed up).

use adder_ir::{Label, RTuple, RType};

use crate::c::label_name;
use crate::context::{EmitterContext, HeaderDeclaration};

/// One output stream of indented C lines.
#[derive(Default)]
pub struct Emitter {
    fragments: Vec<String>,
    indent: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        assert!(self.indent > 0, "dedent below column zero");
        self.indent -= 1;
    }

    pub fn emit_line(&mut self, line: &str) {
        if line.is_empty() {
            self.fragments.push("\n".to_string());
        } else {
            self.fragments
                .push(format!("{}{line}\n", "    ".repeat(self.indent)));
        }
    }

    pub fn emit_lines(&mut self, lines: &[&str]) {
        for line in lines {
            self.emit_line(line);
        }
    }

    /// Emit a basic-block label. The trailing `;` keeps the label
    /// valid even when it lands immediately before a closing brace.
    pub fn emit_label(&mut self, label: Label) {
        self.emit_line(&format!("{}: ;", label_name(label)));
    }

    /// Append another emitter's accumulated output.
    pub fn merge(&mut self, other: Emitter) {
        self.fragments.extend(other.fragments);
    }

    pub fn to_text(&self) -> String {
        self.fragments.concat()
    }
}

// ── Reference counting ──────────────────────────────────────────────

/// Emit the retain sequence for `target`.
///
/// Boxed pointers use the host allocator's retain; tagged integers use
/// the tagged retain; refcounted tuples recurse field by field.
///
/// # Panics
///
/// Panics if `ty` is not refcounted — such values must never reach a
/// retain path.
pub fn emit_inc_ref(out: &mut Emitter, target: &str, ty: &RType) {
    assert!(ty.is_refcounted(), "inc_ref of non-refcounted type {ty}");
    match ty {
        RType::Tuple(t) => {
            for (i, item) in t.types.iter().enumerate() {
                if item.is_refcounted() {
                    emit_inc_ref(out, &format!("{target}.f{i}"), item);
                }
            }
        }
        _ if ty.is_int() => out.emit_line(&format!("CPyTagged_IncRef({target});")),
        _ => out.emit_line(&format!("Py_INCREF({target});")),
    }
}

/// Emit the release sequence for `target`; the mirror of
/// [`emit_inc_ref`].
pub fn emit_dec_ref(out: &mut Emitter, target: &str, ty: &RType) {
    assert!(ty.is_refcounted(), "dec_ref of non-refcounted type {ty}");
    match ty {
        RType::Tuple(t) => {
            for (i, item) in t.types.iter().enumerate() {
                if item.is_refcounted() {
                    emit_dec_ref(out, &format!("{target}.f{i}"), item);
                }
            }
        }
        _ if ty.is_int() => out.emit_line(&format!("CPyTagged_DecRef({target});")),
        _ => out.emit_line(&format!("Py_DECREF({target});")),
    }
}

// ── Tuple struct declarations ───────────────────────────────────────

/// Declare the C struct for a tuple shape, exactly once per distinct
/// shape (guarded by the structural struct name). Nested tuple element
/// structs are declared first and recorded as dependencies.
pub fn declare_tuple_struct(ctx: &mut EmitterContext, ty: &RTuple) {
    let name = ty.struct_name();
    if ctx.declarations.contains(&name) {
        return;
    }
    let mut dependencies = Vec::new();
    for item in &ty.types {
        if let RType::Tuple(inner) = item {
            declare_tuple_struct(ctx, inner);
            dependencies.push(inner.struct_name());
        }
    }
    let mut body = vec![format!("struct {name} {{")];
    for (i, item) in ty.types.iter().enumerate() {
        body.push(format!("    {}f{i};", item.ctype_spaced()));
    }
    body.push("};".to_string());
    body.push(String::new());
    ctx.declarations
        .insert(name, HeaderDeclaration::with_dependencies(dependencies, body));
}

/// The compound initializer for an undefined tuple: each field is its
/// element's own sentinel, recursively for nested tuples.
pub fn undefined_tuple_initializer(ty: &RTuple) -> String {
    let fields: Vec<String> = ty
        .types
        .iter()
        .map(|item| match item {
            RType::Tuple(inner) => undefined_tuple_initializer(inner),
            other => match other.c_undefined_value() {
                Some(value) => value.to_string(),
                None => panic!("type {other} has no undefined value"),
            },
        })
        .collect();
    format!("{{ {} }}", fields.join(", "))
}

/// The C condition testing whether `target` holds its type's error
/// sentinel (`negated` flips the comparison).
///
/// A tuple has no whole-value sentinel, so tuple-typed targets compare
/// the first field against that field's own sentinel.
///
/// # Panics
///
/// Panics for an empty tuple, which has no field to test.
pub fn error_value_check(target: &str, ty: &RType, negated: bool) -> String {
    let compare = if negated { "!=" } else { "==" };
    match ty {
        RType::Tuple(t) => match t.types.first() {
            Some(item) => error_value_check(&format!("{target}.f0"), item, negated),
            None => panic!("empty tuple has no error value"),
        },
        other => match other.c_error_value() {
            Some(value) => format!("{target} {compare} {value}"),
            None => panic!("type {other} has no error value"),
        },
    }
}

// ── Representation conversions ──────────────────────────────────────

/// The C type-check condition for a boxed value, or `None` when any
/// object passes (plain `object`).
fn concrete_type_check(src: &str, ty: &RType) -> Option<String> {
    match ty {
        RType::Primitive(_) if ty.is_object() => None,
        RType::Primitive(_) if ty.is_none() => Some(format!("{src} == Py_None")),
        RType::Primitive(_) if ty.is_int() => Some(format!("PyLong_Check({src})")),
        RType::Primitive(_) if ty.is_bool() => Some(format!("PyBool_Check({src})")),
        RType::Primitive(p) => {
            let check = match p.name() {
                "builtins.list" => "PyList_Check",
                "builtins.dict" => "PyDict_Check",
                "builtins.str" => "PyUnicode_Check",
                "builtins.tuple" => "PyTuple_Check",
                name => panic!("no type check for primitive {name}"),
            };
            Some(format!("{check}({src})"))
        }
        RType::Tuple(_) => Some(format!("PyTuple_Check({src})")),
        RType::Instance(i) => Some(format!(
            "PyObject_TypeCheck({src}, &{})",
            i.type_struct()
        )),
        RType::Optional(o) => concrete_type_check(src, &o.value_type)
            .map(|inner| format!("{src} == Py_None || {inner}")),
    }
}

/// Emit a checked cast: a runtime type test with no representation
/// change and no reference-count adjustment. On mismatch the
/// destination holds the error sentinel.
///
/// # Panics
///
/// Panics if `ty` is unboxed; conversions into unboxed representations
/// go through [`emit_unbox`].
pub fn emit_cast(out: &mut Emitter, src: &str, dest: &str, ty: &RType) {
    assert!(
        !ty.is_unboxed(),
        "cast to unboxed type {ty}; use unbox instead"
    );
    match concrete_type_check(src, ty) {
        None => out.emit_line(&format!("{dest} = {src};")),
        Some(check) => {
            out.emit_line(&format!("if ({check})"));
            out.emit_line(&format!("    {dest} = {src};"));
            out.emit_line("else");
            out.emit_line(&format!("    {dest} = NULL;"));
        }
    }
}

/// Emit an unboxing conversion: a runtime type test plus
/// representation change, storing the magic sentinel on mismatch.
///
/// # Panics
///
/// Panics if `ty` has no unboxed representation.
pub fn emit_unbox(out: &mut Emitter, ctx: &mut EmitterContext, src: &str, dest: &str, ty: &RType) {
    match ty {
        _ if ty.is_int() => {
            out.emit_line(&format!("if (PyLong_Check({src}))"));
            out.emit_line(&format!("    {dest} = CPyTagged_FromObject({src});"));
            out.emit_line("else");
            out.emit_line(&format!("    {dest} = CPY_INT_TAG;"));
        }
        _ if ty.is_bool() => {
            out.emit_line(&format!("if (!PyBool_Check({src}))"));
            out.emit_line(&format!("    {dest} = 2;"));
            out.emit_line("else");
            out.emit_line(&format!("    {dest} = ({src} == Py_True);"));
        }
        RType::Tuple(t) => {
            declare_tuple_struct(ctx, t);
            out.emit_line(&format!(
                "if (PyTuple_Check({src}) && PyTuple_GET_SIZE({src}) == {}) {{",
                t.types.len()
            ));
            for (i, item) in t.types.iter().enumerate() {
                let tmp = ctx.temp_name();
                out.emit_line(&format!("PyObject *{tmp} = PyTuple_GET_ITEM({src}, {i});"));
                let field = format!("{dest}.f{i}");
                if item.is_unboxed() {
                    emit_unbox(out, ctx, &tmp, &field, item);
                } else {
                    emit_cast(out, &tmp, &field, item);
                }
            }
            out.emit_line("} else {");
            for (i, item) in t.types.iter().enumerate() {
                let field = format!("{dest}.f{i}");
                match item {
                    RType::Tuple(inner) => out.emit_line(&format!(
                        "{field} = ({}){};",
                        inner.ctype(),
                        undefined_tuple_initializer(inner)
                    )),
                    other => match other.c_undefined_value() {
                        Some(value) => out.emit_line(&format!("{field} = {value};")),
                        None => panic!("type {other} has no undefined value"),
                    },
                }
            }
            out.emit_line("}");
        }
        _ => panic!("unbox of boxed type {ty}; use cast instead"),
    }
}

/// Emit a boxing conversion: wrap an unboxed value in its boxed form.
///
/// # Panics
///
/// Panics if `ty` is already boxed.
pub fn emit_box(out: &mut Emitter, ctx: &mut EmitterContext, src: &str, dest: &str, ty: &RType) {
    match ty {
        _ if ty.is_int() => out.emit_line(&format!("{dest} = CPyTagged_AsObject({src});")),
        _ if ty.is_bool() => out.emit_line(&format!("{dest} = PyBool_FromLong({src});")),
        RType::Tuple(t) => {
            out.emit_line(&format!("{dest} = PyTuple_New({});", t.types.len()));
            for (i, item) in t.types.iter().enumerate() {
                let field = format!("{src}.f{i}");
                if item.is_unboxed() {
                    let tmp = ctx.temp_name();
                    out.emit_line(&format!("PyObject *{tmp};"));
                    emit_box(out, ctx, &field, &tmp, item);
                    out.emit_line(&format!("PyTuple_SET_ITEM({dest}, {i}, {tmp});"));
                } else {
                    out.emit_line(&format!("Py_INCREF({field});"));
                    out.emit_line(&format!("PyTuple_SET_ITEM({dest}, {i}, {field});"));
                }
            }
        }
        _ => panic!("box of boxed type {ty}"),
    }
}

#[cfg(test)]
mod tests;
