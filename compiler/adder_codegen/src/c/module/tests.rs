use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use adder_ir::{
    BasicBlock, ClassIR, Environment, ExitOp, FuncIR, Label, Literal, ModuleIR, RType,
    RegisterOp, RuntimeArg,
};

use super::*;

fn answer_func() -> FuncIR {
    let mut env = Environment::new();
    let r0 = env.add_temp(RType::INT);
    let mut block = BasicBlock::new(Label::new(0), ExitOp::Return { reg: r0 });
    block.ops.push(RegisterOp::LoadInt { dest: r0, value: 21 });
    FuncIR::new("answer", None, vec![], RType::INT, vec![block], env)
}

fn paths(names: &[&str]) -> FxHashMap<String, String> {
    names
        .iter()
        .map(|name| ((*name).to_string(), format!("{name}.py")))
        .collect()
}

fn single_module() -> Vec<(String, ModuleIR)> {
    let module = ModuleIR::new(vec![], vec![answer_func()], vec![]);
    vec![("m".to_string(), module)]
}

#[test]
fn encode_as_c_string_escapes_and_measures_bytes() {
    assert_eq!(encode_as_c_string("abc"), ("\"abc\"".to_string(), 3));
    assert_eq!(encode_as_c_string("a\"b"), ("\"a\\\"b\"".to_string(), 3));
    assert_eq!(encode_as_c_string("a\nb"), ("\"a\\nb\"".to_string(), 3));
    // Non-ASCII text is escaped byte-by-byte; the length counts bytes.
    assert_eq!(
        encode_as_c_string("héllo"),
        ("\"h\\xc3\\xa9llo\"".to_string(), 6)
    );
}

#[test]
fn single_module_uses_the_canonical_entry_point() {
    let modules = single_module();
    let text = generate_c(&modules, &paths(&["m"]));
    assert!(text.contains("PyMODINIT_FUNC PyInit_m(void)"));
    assert!(!text.contains("x_PyInit_"));
}

#[test]
fn multi_module_builds_use_internal_initializers() {
    let modules = vec![
        ("a".to_string(), ModuleIR::new(vec![], vec![], vec![])),
        ("b".to_string(), ModuleIR::new(vec![], vec![], vec![])),
    ];
    let text = generate_c(&modules, &paths(&["a", "b"]));
    assert!(text.contains("PyObject *x_PyInit_a(void)"));
    assert!(text.contains("PyObject *x_PyInit_b(void)"));
    assert!(!text.contains("PyMODINIT_FUNC"));
}

#[test]
fn output_opens_with_the_runtime_includes() {
    let modules = single_module();
    let text = generate_c(&modules, &paths(&["m"]));
    assert!(text.starts_with("#include <Python.h>\n#include <CPy.h>\n"));
}

#[test]
fn declarations_precede_all_bodies() {
    let modules = single_module();
    let text = generate_c(&modules, &paths(&["m"]));
    let decl_at = text.find("static CPyTagged CPyDef_answer(void);");
    let body_at = text.find("static CPyTagged CPyDef_answer(void) {");
    match (decl_at, body_at) {
        (Some(decl_at), Some(body_at)) => assert!(decl_at < body_at),
        _ => panic!("missing declaration or body:\n{text}"),
    }
}

#[test]
fn method_table_binds_names_to_wrappers() {
    let modules = single_module();
    let text = generate_c(&modules, &paths(&["m"]));
    assert!(text.contains("static PyMethodDef m_module_methods[] = {"));
    assert!(text.contains(
        "{\"answer\", (PyCFunction)CPyPy_answer, METH_VARARGS | METH_KEYWORDS, NULL /* docstring */},"
    ));
    assert!(text.contains("{NULL, NULL, 0, NULL}"));
}

#[test]
fn init_imports_builtins_and_bails_out_on_failure() {
    let modules = single_module();
    let text = generate_c(&modules, &paths(&["m"]));
    assert!(text.contains("module_builtins = PyImport_ImportModule(\"builtins\");"));
    assert!(text.contains("if (module_builtins == NULL)"));
    assert!(text.contains("_globals = PyModule_GetDict(m);"));
}

#[test]
fn literals_are_materialized_by_kind() {
    let mut module = ModuleIR::new(vec![], vec![], vec![]);
    module.add_literal(Literal::Int("12345678901234567890".to_string()), "big");
    module.add_literal(Literal::float(2.5), "half_five");
    module.add_literal(Literal::str("hi"), "greeting");
    let modules = vec![("m".to_string(), module)];
    let text = generate_c(&modules, &paths(&["m"]));

    assert!(text.contains("static PyObject *big;"));
    assert!(text.contains("big = PyLong_FromString(\"12345678901234567890\", NULL, 10);"));
    assert!(text.contains("half_five = PyFloat_FromDouble(2.5);"));
    assert!(text.contains("greeting = PyUnicode_FromStringAndSize(\"hi\", 2);"));
    assert!(text.contains("if (greeting == NULL)"));
}

#[test]
fn classes_are_readied_and_registered() {
    let cl = ClassIR::new("Point", vec![("x".to_string(), RType::INT)]);
    let module = ModuleIR::new(vec![], vec![], vec![cl]);
    let modules = vec![("m".to_string(), module)];
    let text = generate_c(&modules, &paths(&["m"]));

    assert!(text.contains("if (PyType_Ready(&PointType) < 0)"));
    assert!(text.contains("Py_INCREF(&PointType);"));
    assert!(text.contains("PyModule_AddObject(m, \"Point\", (PyObject *)&PointType);"));
    // The full class definition landed in the declaration section.
    assert!(text.contains("} PointObject;"));
}

#[test]
fn tuple_structs_are_declared_before_signatures_that_name_them() {
    let tuple_ty = RType::tuple(vec![RType::INT, RType::INT]);
    let func = FuncIR::new(
        "pair",
        None,
        vec![RuntimeArg::new("p", tuple_ty.clone())],
        RType::INT,
        vec![],
        Environment::new(),
    );
    let module = ModuleIR::new(vec![], vec![func], vec![]);
    let modules = vec![("m".to_string(), module)];
    let text = generate_c(&modules, &paths(&["m"]));

    let RType::Tuple(t) = &tuple_ty else {
        panic!("expected a tuple type");
    };
    let struct_at = text.find(&format!("struct {} {{", t.struct_name()));
    let decl_at = text.find("CPyDef_pair(struct");
    match (struct_at, decl_at) {
        (Some(struct_at), Some(decl_at)) => assert!(struct_at < decl_at),
        _ => panic!("missing struct or declaration:\n{text}"),
    }
}

#[test]
fn repeated_compilations_are_byte_identical() {
    let first = generate_c(&single_module(), &paths(&["m"]));
    let second = generate_c(&single_module(), &paths(&["m"]));
    assert_eq!(first, second);
}

#[test]
fn whole_unit_smoke_test() {
    let modules = single_module();
    let text = generate_c(&modules, &paths(&["m"]));

    // Declarations, then tables, then bodies — per the unit layout.
    let globals_at = text.find("static PyObject *_globals;");
    let table_at = text.find("m_module_methods");
    let native_at = text.find("cpy_r_r0 = 42;");
    let wrapper_at = text.find("static PyObject *CPyPy_answer(PyObject *self");
    match (globals_at, table_at, native_at, wrapper_at) {
        (Some(g), Some(t), Some(n), Some(w)) => {
            assert!(g < t, "globals must precede method tables");
            assert!(t < n, "tables must precede native bodies");
            assert!(n < w, "native body precedes its wrapper");
        }
        _ => panic!("missing section:\n{text}"),
    }
}
