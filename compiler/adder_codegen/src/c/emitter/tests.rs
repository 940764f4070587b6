use pretty_assertions::assert_eq;

use adder_ir::{Label, RTuple, RType};

use crate::context::EmitterContext;

use super::*;

fn ctx() -> EmitterContext {
    EmitterContext::new(vec!["m".to_string()])
}

fn lines(out: &Emitter) -> Vec<String> {
    out.to_text().lines().map(str::to_string).collect()
}

// Emitter basics

#[test]
fn emit_line_honors_indentation() {
    let mut out = Emitter::new();
    out.emit_line("a;");
    out.indent();
    out.emit_line("b;");
    out.dedent();
    out.emit_line("c;");
    assert_eq!(out.to_text(), "a;\n    b;\nc;\n");
}

#[test]
fn labels_carry_an_empty_statement() {
    let mut out = Emitter::new();
    out.emit_label(Label::new(3));
    assert_eq!(out.to_text(), "CPyL3: ;\n");
}

#[test]
fn merge_concatenates_streams() {
    let mut decls = Emitter::new();
    decls.emit_line("int x;");
    let mut body = Emitter::new();
    body.emit_line("x = 1;");
    let mut out = Emitter::new();
    out.merge(decls);
    out.merge(body);
    assert_eq!(out.to_text(), "int x;\nx = 1;\n");
}

// Reference counting

#[test]
fn inc_ref_by_representation() {
    let mut out = Emitter::new();
    emit_inc_ref(&mut out, "x", &RType::INT);
    emit_inc_ref(&mut out, "y", &RType::STR);
    assert_eq!(lines(&out), vec!["CPyTagged_IncRef(x);", "Py_INCREF(y);"]);
}

#[test]
fn dec_ref_by_representation() {
    let mut out = Emitter::new();
    emit_dec_ref(&mut out, "x", &RType::INT);
    emit_dec_ref(&mut out, "y", &RType::optional(RType::STR));
    assert_eq!(lines(&out), vec!["CPyTagged_DecRef(x);", "Py_DECREF(y);"]);
}

#[test]
fn tuple_refcounting_recurses_field_by_field() {
    let ty = RType::tuple(vec![RType::INT, RType::BOOL, RType::STR]);
    let mut out = Emitter::new();
    emit_inc_ref(&mut out, "t", &ty);
    // The non-refcounted bool field is skipped entirely.
    assert_eq!(lines(&out), vec!["CPyTagged_IncRef(t.f0);", "Py_INCREF(t.f2);"]);
}

#[test]
fn nested_tuple_refcounting_recurses_deeper() {
    let ty = RType::tuple(vec![RType::tuple(vec![RType::STR]), RType::INT]);
    let mut out = Emitter::new();
    emit_dec_ref(&mut out, "t", &ty);
    assert_eq!(lines(&out), vec!["Py_DECREF(t.f0.f0);", "CPyTagged_DecRef(t.f1);"]);
}

#[test]
#[should_panic(expected = "non-refcounted")]
fn inc_ref_of_non_refcounted_type_panics() {
    let mut out = Emitter::new();
    emit_inc_ref(&mut out, "b", &RType::BOOL);
}

// Tuple structs

#[test]
fn tuple_struct_is_declared_once() {
    let mut ctx = ctx();
    let ty = RTuple::new(vec![RType::INT, RType::OBJECT]);
    declare_tuple_struct(&mut ctx, &ty);
    declare_tuple_struct(&mut ctx, &RTuple::new(vec![RType::INT, RType::OBJECT]));
    assert_eq!(ctx.declarations.len(), 1);

    let decl = match ctx.declarations.get(&ty.struct_name()) {
        Some(decl) => decl,
        None => panic!("tuple struct not registered"),
    };
    assert_eq!(
        decl.body,
        vec![
            format!("struct {} {{", ty.struct_name()),
            "    CPyTagged f0;".to_string(),
            "    PyObject *f1;".to_string(),
            "};".to_string(),
            String::new(),
        ]
    );
}

#[test]
fn nested_tuple_structs_become_dependencies() {
    let mut ctx = ctx();
    let inner = RTuple::new(vec![RType::BOOL]);
    let outer = RTuple::new(vec![RType::Tuple(inner.clone()), RType::INT]);
    declare_tuple_struct(&mut ctx, &outer);
    assert_eq!(ctx.declarations.len(), 2);
    let decl = match ctx.declarations.get(&outer.struct_name()) {
        Some(decl) => decl,
        None => panic!("outer struct not registered"),
    };
    assert_eq!(decl.dependencies, vec![inner.struct_name()]);
}

#[test]
fn undefined_tuple_initializer_uses_element_sentinels() {
    let ty = RTuple::new(vec![RType::INT, RType::STR]);
    assert_eq!(undefined_tuple_initializer(&ty), "{ CPY_INT_TAG, NULL }");

    let nested = RTuple::new(vec![RType::Tuple(ty), RType::BOOL]);
    assert_eq!(
        undefined_tuple_initializer(&nested),
        "{ { CPY_INT_TAG, NULL }, 2 }"
    );
}

// Error checks

#[test]
fn error_value_check_compares_the_sentinel() {
    assert_eq!(error_value_check("r", &RType::INT, false), "r == CPY_INT_TAG");
    assert_eq!(error_value_check("r", &RType::STR, true), "r != NULL");
    assert_eq!(error_value_check("r", &RType::BOOL, false), "r == 2");
}

#[test]
fn error_value_check_on_tuples_uses_the_first_field() {
    let ty = RType::tuple(vec![RType::INT, RType::STR]);
    assert_eq!(error_value_check("r", &ty, false), "r.f0 == CPY_INT_TAG");

    let nested = RType::tuple(vec![ty, RType::BOOL]);
    assert_eq!(error_value_check("r", &nested, true), "r.f0.f0 != CPY_INT_TAG");
}

#[test]
#[should_panic(expected = "empty tuple")]
fn error_value_check_rejects_empty_tuples() {
    error_value_check("r", &RType::tuple(vec![]), false);
}

// Casts

#[test]
fn cast_to_object_is_a_plain_assignment() {
    let mut out = Emitter::new();
    emit_cast(&mut out, "src", "dest", &RType::OBJECT);
    assert_eq!(lines(&out), vec!["dest = src;"]);
}

#[test]
fn cast_checks_the_concrete_type() {
    let mut out = Emitter::new();
    emit_cast(&mut out, "src", "dest", &RType::LIST);
    assert_eq!(
        lines(&out),
        vec![
            "if (PyList_Check(src))",
            "    dest = src;",
            "else",
            "    dest = NULL;",
        ]
    );
}

#[test]
fn cast_to_instance_checks_the_type_object() {
    let mut out = Emitter::new();
    emit_cast(&mut out, "src", "dest", &RType::instance("Foo"));
    assert_eq!(
        lines(&out)[0],
        "if (PyObject_TypeCheck(src, &FooType))"
    );
}

#[test]
fn cast_to_optional_accepts_none() {
    let mut out = Emitter::new();
    emit_cast(&mut out, "src", "dest", &RType::optional(RType::STR));
    assert_eq!(
        lines(&out)[0],
        "if (src == Py_None || PyUnicode_Check(src))"
    );
}

#[test]
#[should_panic(expected = "use unbox")]
fn cast_to_unboxed_type_panics() {
    let mut out = Emitter::new();
    emit_cast(&mut out, "src", "dest", &RType::INT);
}

// Boxing and unboxing

#[test]
fn unbox_int_produces_the_sentinel_on_mismatch() {
    let mut out = Emitter::new();
    emit_unbox(&mut out, &mut ctx(), "src", "dest", &RType::INT);
    assert_eq!(
        lines(&out),
        vec![
            "if (PyLong_Check(src))",
            "    dest = CPyTagged_FromObject(src);",
            "else",
            "    dest = CPY_INT_TAG;",
        ]
    );
}

#[test]
fn unbox_bool_compares_against_true() {
    let mut out = Emitter::new();
    emit_unbox(&mut out, &mut ctx(), "src", "dest", &RType::BOOL);
    assert_eq!(
        lines(&out),
        vec![
            "if (!PyBool_Check(src))",
            "    dest = 2;",
            "else",
            "    dest = (src == Py_True);",
        ]
    );
}

#[test]
fn unbox_tuple_checks_arity_and_converts_elementwise() {
    let mut ctx = ctx();
    let mut out = Emitter::new();
    emit_unbox(
        &mut out,
        &mut ctx,
        "src",
        "dest",
        &RType::tuple(vec![RType::INT, RType::STR]),
    );
    let text = out.to_text();
    assert!(text.contains("if (PyTuple_Check(src) && PyTuple_GET_SIZE(src) == 2) {"));
    assert!(text.contains("PyTuple_GET_ITEM(src, 0);"));
    assert!(text.contains("dest.f0 = CPyTagged_FromObject("));
    assert!(text.contains("dest.f1 = NULL;"));
    // The struct for the tuple shape was declared along the way.
    assert_eq!(ctx.declarations.len(), 1);
}

#[test]
fn box_int_and_bool() {
    let mut out = Emitter::new();
    emit_box(&mut out, &mut ctx(), "src", "dest", &RType::INT);
    emit_box(&mut out, &mut ctx(), "b", "dest2", &RType::BOOL);
    assert_eq!(
        lines(&out),
        vec![
            "dest = CPyTagged_AsObject(src);",
            "dest2 = PyBool_FromLong(b);",
        ]
    );
}

#[test]
fn box_tuple_builds_a_host_tuple() {
    let mut out = Emitter::new();
    emit_box(
        &mut out,
        &mut ctx(),
        "src",
        "dest",
        &RType::tuple(vec![RType::INT, RType::STR]),
    );
    let text = out.to_text();
    assert!(text.contains("dest = PyTuple_New(2);"));
    // Unboxed field: boxed into a temp, then stolen by SET_ITEM.
    assert!(text.contains("= CPyTagged_AsObject(src.f0);"));
    // Boxed field: retained, then stolen by SET_ITEM.
    assert!(text.contains("Py_INCREF(src.f1);"));
    assert!(text.contains("PyTuple_SET_ITEM(dest, 1, src.f1);"));
}

#[test]
#[should_panic(expected = "box of boxed type")]
fn box_of_boxed_type_panics() {
    let mut out = Emitter::new();
    emit_box(&mut out, &mut ctx(), "src", "dest", &RType::STR);
}
