//! Class emission: instance structs, accessor functions, vtables, and
//! type objects.
//!
//! The vtable layout is what gives attribute and method slot indices
//! their meaning: each attribute contributes a getter/setter pair of
//! consecutive slots, methods follow after all attribute slots, and
//! `CPY_GET_ATTR`/`CPY_SET_ATTR` index straight into the array.

use adder_ir::{ClassIR, RType};

use crate::c::emitter::{
    emit_dec_ref, emit_inc_ref, error_value_check, undefined_tuple_initializer, Emitter,
};
use crate::c::NATIVE_PREFIX;
use crate::context::{EmitterContext, HeaderDeclaration};

fn getter_header(cl: &ClassIR, attr: &str, ty: &RType) -> String {
    format!(
        "static {}{NATIVE_PREFIX}{}___get_{attr}(PyObject *self)",
        ty.ctype_spaced(),
        cl.name
    )
}

fn setter_header(cl: &ClassIR, attr: &str, ty: &RType) -> String {
    format!(
        "static char {NATIVE_PREFIX}{}___set_{attr}(PyObject *self, {}value)",
        cl.name,
        ty.ctype_spaced()
    )
}

fn new_header(cl: &ClassIR) -> String {
    format!(
        "static PyObject *{NATIVE_PREFIX}{}___new(PyTypeObject *type, PyObject *args, PyObject *kwds)",
        cl.name
    )
}

fn attr_field(attr: &str) -> String {
    format!("_{attr}")
}

/// The sentinel assignment for one attribute field of a fresh
/// instance.
fn undefined_assignment(target: &str, ty: &RType) -> String {
    match ty {
        RType::Tuple(t) => format!(
            "{target} = ({}){};",
            t.ctype(),
            undefined_tuple_initializer(t)
        ),
        other => match other.c_undefined_value() {
            Some(value) => format!("{target} = {value};"),
            None => panic!("type {other} has no undefined value"),
        },
    }
}

/// Register the full class definition as one topologically-sorted
/// declaration: instance struct, accessor forward declarations, the
/// vtable, and the type object. Depends on the struct declarations of
/// tuple-typed attributes and on the native declarations of the
/// class's methods.
pub fn generate_class(cl: &ClassIR, module_name: &str, ctx: &mut EmitterContext) {
    let mut dependencies = Vec::new();
    for (_, ty) in &cl.attributes {
        if let RType::Tuple(t) = ty {
            crate::c::emitter::declare_tuple_struct(ctx, t);
            dependencies.push(t.struct_name());
        }
    }
    for method in &cl.methods {
        dependencies.push(format!("{NATIVE_PREFIX}{}", method.cname()));
    }

    let struct_name = cl.struct_name();
    let mut body = vec!["typedef struct {".to_string(), "    PyObject_HEAD".to_string()];
    body.push("    CPyVTableItem *vtable;".to_string());
    for (attr, ty) in &cl.attributes {
        body.push(format!("    {}{};", ty.ctype_spaced(), attr_field(attr)));
    }
    body.push(format!("}} {struct_name};"));
    body.push(String::new());

    for (attr, ty) in &cl.attributes {
        body.push(format!("{};", getter_header(cl, attr, ty)));
        body.push(format!("{};", setter_header(cl, attr, ty)));
    }
    body.push(format!("{};", new_header(cl)));
    body.push(String::new());

    body.push(format!("static CPyVTableItem {}_vtable[] = {{", cl.name));
    for (attr, _) in &cl.attributes {
        body.push(format!(
            "    (CPyVTableItem){NATIVE_PREFIX}{}___get_{attr},",
            cl.name
        ));
        body.push(format!(
            "    (CPyVTableItem){NATIVE_PREFIX}{}___set_{attr},",
            cl.name
        ));
    }
    for method in &cl.methods {
        body.push(format!(
            "    (CPyVTableItem){NATIVE_PREFIX}{},",
            method.cname()
        ));
    }
    if cl.attributes.is_empty() && cl.methods.is_empty() {
        body.push("    NULL,".to_string());
    }
    body.push("};".to_string());
    body.push(String::new());

    body.push(format!("static PyTypeObject {} = {{", cl.type_struct()));
    body.push("    PyVarObject_HEAD_INIT(NULL, 0)".to_string());
    body.push(format!("    .tp_name = \"{module_name}.{}\",", cl.name));
    body.push(format!("    .tp_basicsize = sizeof({struct_name}),"));
    body.push("    .tp_flags = Py_TPFLAGS_DEFAULT,".to_string());
    body.push(format!("    .tp_new = {NATIVE_PREFIX}{}___new,", cl.name));
    body.push("};".to_string());
    body.push(String::new());

    ctx.declarations
        .insert(cl.name.clone(), HeaderDeclaration::with_dependencies(dependencies, body));
}

/// Emit the accessor and allocator bodies for one class. Method bodies
/// are emitted separately, alongside the module-level functions.
pub fn generate_class_body(cl: &ClassIR, out: &mut Emitter) {
    let struct_name = cl.struct_name();

    for (attr, ty) in &cl.attributes {
        let field = attr_field(attr);

        out.emit_line(&format!("{} {{", getter_header(cl, attr, ty)));
        out.indent();
        out.emit_line(&format!(
            "{}result = (({struct_name} *)self)->{field};",
            ty.ctype_spaced()
        ));
        if ty.is_refcounted() {
            emit_inc_ref(out, "result", ty);
        }
        out.emit_line("return result;");
        out.dedent();
        out.emit_line("}");
        out.emit_line("");

        out.emit_line(&format!("{} {{", setter_header(cl, attr, ty)));
        out.indent();
        out.emit_line(&format!("{struct_name} *obj = ({struct_name} *)self;"));
        if ty.is_refcounted() {
            let field_ref = format!("obj->{field}");
            out.emit_line(&format!(
                "if ({}) {{",
                error_value_check(&field_ref, ty, true)
            ));
            emit_dec_ref(out, &field_ref, ty);
            out.emit_line("}");
            emit_inc_ref(out, "value", ty);
        }
        out.emit_line(&format!("obj->{field} = value;"));
        out.emit_line("return 1;");
        out.dedent();
        out.emit_line("}");
        out.emit_line("");
    }

    out.emit_line(&format!("{} {{", new_header(cl)));
    out.indent();
    out.emit_line(&format!(
        "{struct_name} *self = ({struct_name} *)type->tp_alloc(type, 0);"
    ));
    out.emit_line("if (self == NULL)");
    out.emit_line("    return NULL;");
    out.emit_line(&format!("self->vtable = {}_vtable;", cl.name));
    for (attr, ty) in &cl.attributes {
        out.emit_line(&undefined_assignment(&format!("self->{}", attr_field(attr)), ty));
    }
    out.emit_line("return (PyObject *)self;");
    out.dedent();
    out.emit_line("}");
    out.emit_line("");
}

#[cfg(test)]
mod tests;
