use pretty_assertions::assert_eq;

use adder_ir::{ClassIR, Environment, FuncIR, RType, RuntimeArg};

use crate::context::EmitterContext;

use super::*;

fn method(name: &str, class: &str) -> FuncIR {
    FuncIR::new(
        name,
        Some(class.to_string()),
        vec![RuntimeArg::new("self", RType::instance(class))],
        RType::INT,
        vec![],
        Environment::new(),
    )
}

fn point() -> ClassIR {
    let mut cl = ClassIR::new(
        "Point",
        vec![
            ("x".to_string(), RType::INT),
            ("y".to_string(), RType::STR),
        ],
    );
    cl.methods.push(method("norm", "Point"));
    cl
}

fn declaration_body(cl: &ClassIR) -> Vec<String> {
    let mut ctx = EmitterContext::new(vec!["m".to_string()]);
    generate_class(cl, "m", &mut ctx);
    match ctx.declarations.get(&cl.name) {
        Some(decl) => decl.body.clone(),
        None => panic!("class declaration not registered"),
    }
}

#[test]
fn instance_struct_lays_out_attributes_in_order() {
    let body = declaration_body(&point());
    let struct_at = body
        .iter()
        .position(|l| l == "typedef struct {")
        .unwrap_or(usize::MAX);
    assert_eq!(body[struct_at + 1], "    PyObject_HEAD");
    assert_eq!(body[struct_at + 2], "    CPyVTableItem *vtable;");
    assert_eq!(body[struct_at + 3], "    CPyTagged _x;");
    assert_eq!(body[struct_at + 4], "    PyObject *_y;");
    assert_eq!(body[struct_at + 5], "} PointObject;");
}

#[test]
fn vtable_slots_match_the_class_layout() {
    let cl = point();
    let body = declaration_body(&cl);
    let vtable_at = body
        .iter()
        .position(|l| l.contains("Point_vtable[]"))
        .unwrap_or(usize::MAX);
    let slots: Vec<&String> = body[vtable_at + 1..]
        .iter()
        .take_while(|l| l.starts_with("    ("))
        .collect();
    // Getter/setter pairs first, then methods — the same ordering the
    // slot-index lookups compute.
    assert_eq!(slots.len(), 5);
    assert!(slots[cl.getter_index("x")].contains("CPyDef_Point___get_x"));
    assert!(slots[cl.setter_index("x")].contains("CPyDef_Point___set_x"));
    assert!(slots[cl.getter_index("y")].contains("CPyDef_Point___get_y"));
    assert!(slots[cl.setter_index("y")].contains("CPyDef_Point___set_y"));
    assert!(slots[cl.method_index("norm")].contains("CPyDef_Point___norm"));
}

#[test]
fn type_object_uses_the_module_qualified_name() {
    let body = declaration_body(&point());
    assert!(body.contains(&"static PyTypeObject PointType = {".to_string()));
    assert!(body.contains(&"    .tp_name = \"m.Point\",".to_string()));
    assert!(body.contains(&"    .tp_basicsize = sizeof(PointObject),".to_string()));
    assert!(body.contains(&"    .tp_new = CPyDef_Point___new,".to_string()));
}

#[test]
fn class_declaration_depends_on_its_method_symbols() {
    let cl = point();
    let mut ctx = EmitterContext::new(vec!["m".to_string()]);
    generate_class(&cl, "m", &mut ctx);
    let decl = match ctx.declarations.get("Point") {
        Some(decl) => decl,
        None => panic!("class declaration not registered"),
    };
    assert_eq!(decl.dependencies, vec!["CPyDef_Point___norm".to_string()]);
}

#[test]
fn tuple_attributes_pull_in_their_struct_declarations() {
    let ty = RType::tuple(vec![RType::INT, RType::INT]);
    let cl = ClassIR::new("Pair", vec![("coords".to_string(), ty.clone())]);
    let mut ctx = EmitterContext::new(vec!["m".to_string()]);
    generate_class(&cl, "m", &mut ctx);
    let decl = match ctx.declarations.get("Pair") {
        Some(decl) => decl,
        None => panic!("class declaration not registered"),
    };
    let RType::Tuple(t) = &ty else {
        panic!("expected a tuple type");
    };
    assert_eq!(decl.dependencies, vec![t.struct_name()]);
    assert!(ctx.declarations.contains(&t.struct_name()));
}

#[test]
fn accessors_retain_and_release_refcounted_attributes() {
    let mut out = Emitter::new();
    generate_class_body(&point(), &mut out);
    let text = out.to_text();

    // Getter: copy the slot, retain, return.
    assert!(text.contains("CPyTagged result = ((PointObject *)self)->_x;"));
    assert!(text.contains("CPyTagged_IncRef(result);"));

    // Setter: release the old value unless it is still undefined,
    // retain the new one, report success.
    assert!(text.contains("if (obj->_x != CPY_INT_TAG) {"));
    assert!(text.contains("CPyTagged_DecRef(obj->_x);"));
    assert!(text.contains("if (obj->_y != NULL) {"));
    assert!(text.contains("Py_DECREF(obj->_y);"));
    assert!(text.contains("return 1;"));
}

#[test]
fn allocator_initializes_attributes_to_their_sentinels() {
    let mut out = Emitter::new();
    generate_class_body(&point(), &mut out);
    let text = out.to_text();
    assert!(text.contains("PointObject *self = (PointObject *)type->tp_alloc(type, 0);"));
    assert!(text.contains("self->vtable = Point_vtable;"));
    assert!(text.contains("self->_x = CPY_INT_TAG;"));
    assert!(text.contains("self->_y = NULL;"));
}

#[test]
fn non_refcounted_attributes_skip_the_refcount_dance() {
    let cl = ClassIR::new("Flag", vec![("on".to_string(), RType::BOOL)]);
    let mut out = Emitter::new();
    generate_class_body(&cl, &mut out);
    let text = out.to_text();
    assert!(text.contains("obj->_on = value;"));
    assert!(!text.contains("IncRef"));
    assert!(!text.contains("INCREF"));
}
