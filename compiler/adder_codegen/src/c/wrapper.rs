//! Interpreter-facing wrapper functions.
//!
//! Every module-level function gets a wrapper that the method table
//! points at: it parses the interpreter's positional/keyword argument
//! tuple, converts each argument to the native representation, calls
//! the native entry point, and boxes the result back. Any conversion
//! failure or propagated sentinel becomes a `NULL` return with the
//! interpreter's pending exception left in place.

use adder_ir::FuncIR;

use crate::c::emitter::{emit_box, emit_cast, emit_unbox, error_value_check, Emitter};
use crate::c::{NATIVE_PREFIX, WRAPPER_PREFIX};
use crate::context::EmitterContext;

/// The C header of a function's wrapper entry point.
pub fn wrapper_function_header(func: &FuncIR) -> String {
    format!(
        "static PyObject *{WRAPPER_PREFIX}{}(PyObject *self, PyObject *args, PyObject *kw)",
        func.cname()
    )
}

/// Generate the wrapper body for one module-level function.
pub fn generate_wrapper_function(func: &FuncIR, out: &mut Emitter, ctx: &mut EmitterContext) {
    out.emit_line(&format!("{} {{", wrapper_function_header(func)));
    out.indent();

    let kwlist: String = func
        .args
        .iter()
        .map(|arg| format!("\"{}\", ", arg.name))
        .collect();
    out.emit_line(&format!("static char *kwlist[] = {{{kwlist}0}};"));
    for arg in &func.args {
        out.emit_line(&format!("PyObject *obj_{};", arg.name));
    }

    let arg_format = "O".repeat(func.args.len());
    let addresses: String = func
        .args
        .iter()
        .map(|arg| format!(", &obj_{}", arg.name))
        .collect();
    out.emit_line(&format!(
        "if (!PyArg_ParseTupleAndKeywords(args, kw, \"{arg_format}:{}\", kwlist{addresses})) {{",
        func.name
    ));
    out.emit_line("    return NULL;");
    out.emit_line("}");

    for arg in &func.args {
        let obj = format!("obj_{}", arg.name);
        let native = format!("arg_{}", arg.name);
        if arg.ty.is_object() {
            out.emit_line(&format!("PyObject *{native} = {obj};"));
            continue;
        }
        out.emit_line(&format!("{}{native};", arg.ty.ctype_spaced()));
        if arg.ty.is_unboxed() {
            emit_unbox(out, ctx, &obj, &native, &arg.ty);
        } else {
            emit_cast(out, &obj, &native, &arg.ty);
        }
        out.emit_line(&format!(
            "if ({}) {{",
            error_value_check(&native, &arg.ty, false)
        ));
        out.emit_line("    return NULL;");
        out.emit_line("}");
    }

    let call_args: Vec<String> = func
        .args
        .iter()
        .map(|arg| format!("arg_{}", arg.name))
        .collect();
    out.emit_line(&format!(
        "{}retval = {NATIVE_PREFIX}{}({});",
        func.ret_type.ctype_spaced(),
        func.cname(),
        call_args.join(", ")
    ));
    out.emit_line(&format!(
        "if ({}) {{",
        error_value_check("retval", &func.ret_type, false)
    ));
    out.emit_line("    return NULL;");
    out.emit_line("}");

    if func.ret_type.is_unboxed() {
        out.emit_line("PyObject *retbox;");
        emit_box(out, ctx, "retval", "retbox", &func.ret_type);
        out.emit_line("return retbox;");
    } else {
        out.emit_line("return retval;");
    }

    out.dedent();
    out.emit_line("}");
}

/// Forward-declaration pair for a function: the native signature and,
/// when the function is reachable from the interpreter, its wrapper
/// signature.
pub fn function_declaration_body(func: &FuncIR, with_wrapper: bool) -> Vec<String> {
    let mut body = vec![format!(
        "{};",
        crate::c::function::native_function_header(func)
    )];
    if with_wrapper {
        body.push(format!("{};", wrapper_function_header(func)));
    }
    body
}
