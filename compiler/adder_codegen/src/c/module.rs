//! Module assembly: one C compilation unit from one or more modules.
//!
//! The output is structured as: topologically-sorted forward
//! declarations (shared globals, per-import module objects, literal
//! statics, function declaration pairs, class definitions, tuple
//! structs), then per-module method tables, module descriptors, and
//! initialization routines, then every native and wrapper body in
//! source order.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;
use tracing::debug;

use adder_ir::{c_module_name, FuncIR, Literal, ModuleIR, RType};

use crate::c::class_gen::{generate_class, generate_class_body};
use crate::c::emitter::{declare_tuple_struct, Emitter};
use crate::c::function::generate_native_function;
use crate::c::wrapper::{function_declaration_body, generate_wrapper_function};
use crate::c::{NATIVE_PREFIX, WRAPPER_PREFIX};
use crate::context::{ClassTable, EmitterContext, HeaderDeclaration};

/// Produce a UTF-8 encoded, escaped, quoted C string literal and its
/// byte length.
pub fn encode_as_c_string(s: &str) -> (String, usize) {
    let bytes = s.as_bytes();
    let mut escaped = String::with_capacity(bytes.len() + 2);
    escaped.push('"');
    for &b in bytes {
        match b {
            b'"' => escaped.push_str("\\\""),
            b'\\' => escaped.push_str("\\\\"),
            b'\t' => escaped.push_str("\\t"),
            b'\n' => escaped.push_str("\\n"),
            b'\r' => escaped.push_str("\\r"),
            0x20..=0x7e => escaped.push(b as char),
            _ => {
                let _ = write!(escaped, "\\x{b:02x}");
            }
        }
    }
    escaped.push('"');
    (escaped, bytes.len())
}

fn module_prefix(module_name: &str) -> String {
    format!("{}_", module_name.replace('.', "___"))
}

/// Assembles a group of modules compiled together into one C unit.
pub struct ModuleGenerator<'ir> {
    modules: &'ir [(String, ModuleIR)],
    source_paths: &'ir FxHashMap<String, String>,
    context: EmitterContext,
}

impl<'ir> ModuleGenerator<'ir> {
    pub fn new(
        modules: &'ir [(String, ModuleIR)],
        source_paths: &'ir FxHashMap<String, String>,
    ) -> Self {
        let module_names = modules.iter().map(|(name, _)| name.clone()).collect();
        Self {
            modules,
            source_paths,
            context: EmitterContext::new(module_names),
        }
    }

    /// Generate the complete compilation unit.
    pub fn generate_c_for_modules(mut self) -> String {
        debug!(modules = self.modules.len(), "assembling C unit");

        let modules = self.modules;
        let classes =
            ClassTable::new(modules.iter().flat_map(|(_, module)| module.classes.iter()));
        let mut emitter = Emitter::new();

        self.declare_internal_globals();
        for (_, module) in modules {
            self.declare_imports(&module.imports);
        }
        for (_, module) in modules {
            for (_, symbol) in module.literals() {
                self.declare_static_pyobject(symbol);
            }
        }
        for (_, module) in modules {
            for func in &module.functions {
                self.declare_function(func, true);
            }
        }
        for (module_name, module) in modules {
            for cl in &module.classes {
                for method in &cl.methods {
                    self.declare_function(method, false);
                }
                generate_class(cl, module_name, &mut self.context);
            }
        }

        emitter.emit_line("");

        for (module_name, module) in modules {
            self.generate_module_def(&mut emitter, module_name, module);
        }

        for (module_name, module) in modules {
            let source_path = self.source_path(module_name);
            for func in &module.functions {
                emitter.emit_line("");
                generate_native_function(
                    func,
                    &mut emitter,
                    &mut self.context,
                    &classes,
                    &source_path,
                );
                emitter.emit_line("");
                generate_wrapper_function(func, &mut emitter, &mut self.context);
            }
            for cl in &module.classes {
                emitter.emit_line("");
                generate_class_body(cl, &mut emitter);
                for method in &cl.methods {
                    emitter.emit_line("");
                    generate_native_function(
                        method,
                        &mut emitter,
                        &mut self.context,
                        &classes,
                        &source_path,
                    );
                }
            }
        }

        let mut declarations = Emitter::new();
        declarations.emit_line("#include <Python.h>");
        declarations.emit_line("#include <CPy.h>");
        declarations.emit_line("");
        for declaration in self.context.declarations.toposort() {
            for line in &declaration.body {
                declarations.emit_line(line);
            }
        }

        let mut text = declarations.to_text();
        text.push_str(&emitter.to_text());
        text
    }

    fn source_path(&self, module_name: &str) -> String {
        match self.source_paths.get(module_name) {
            Some(path) => path.clone(),
            None => panic!("no source path for module {module_name:?}"),
        }
    }

    fn declare_global(&mut self, type_spaced: &str, name: &str) {
        self.context.declarations.insert(
            name.to_string(),
            HeaderDeclaration::new(vec![format!("static {type_spaced}{name};")]),
        );
    }

    fn declare_internal_globals(&mut self) {
        self.declare_global("PyObject *", "_globals");
    }

    fn declare_imports(&mut self, imports: &[String]) {
        for imp in imports {
            self.declare_global("CPyModule *", &c_module_name(imp));
        }
    }

    fn declare_static_pyobject(&mut self, symbol: &str) {
        self.declare_global("PyObject *", symbol);
    }

    /// Register the forward-declaration pair for a function. The entry
    /// depends on the struct declarations of any tuple types named in
    /// the signature.
    fn declare_function(&mut self, func: &FuncIR, with_wrapper: bool) {
        let mut dependencies = Vec::new();
        for ty in func
            .args
            .iter()
            .map(|arg| &arg.ty)
            .chain(std::iter::once(&func.ret_type))
        {
            if let RType::Tuple(t) = ty {
                declare_tuple_struct(&mut self.context, t);
                dependencies.push(t.struct_name());
            }
        }
        self.context.declarations.insert(
            format!("{NATIVE_PREFIX}{}", func.cname()),
            HeaderDeclaration::with_dependencies(
                dependencies,
                function_declaration_body(func, with_wrapper),
            ),
        );
    }

    fn generate_module_def(&self, emitter: &mut Emitter, module_name: &str, module: &ModuleIR) {
        let prefix = module_prefix(module_name);

        // Method table: external name -> wrapper entry point.
        emitter.emit_line(&format!(
            "static PyMethodDef {prefix}module_methods[] = {{"
        ));
        for func in &module.functions {
            emitter.emit_line(&format!(
                "{{\"{}\", (PyCFunction){WRAPPER_PREFIX}{}, METH_VARARGS | METH_KEYWORDS, NULL /* docstring */}},",
                func.name,
                func.cname()
            ));
        }
        emitter.emit_line("{NULL, NULL, 0, NULL}");
        emitter.emit_line("};");
        emitter.emit_line("");

        // Module descriptor.
        emitter.emit_lines(&[
            &format!("static struct PyModuleDef {prefix}module = {{"),
            "PyModuleDef_HEAD_INIT,",
            &format!("\"{module_name}\","),
            "NULL, /* docstring */",
            "-1,       /* size of per-interpreter state of the module,",
            "             or -1 if the module keeps state in global variables. */",
            &format!("{prefix}module_methods"),
            "};",
        ]);
        emitter.emit_line("");

        // Initialization routine. With a single module this is the
        // host's canonical entry point; a multi-module build packs
        // everything into one shared unit, so each module gets an
        // internally-named initializer invoked by a thin shim.
        let declaration = if self.context.module_names.len() == 1 {
            format!("PyMODINIT_FUNC PyInit_{module_name}(void)")
        } else {
            format!("PyObject *x_PyInit_{module_name}(void)")
        };
        emitter.emit_lines(&[&declaration, "{", "PyObject *m;"]);
        for cl in &module.classes {
            emitter.emit_lines(&[
                &format!("if (PyType_Ready(&{}) < 0)", cl.type_struct()),
                "    return NULL;",
            ]);
        }
        emitter.emit_lines(&[
            &format!("m = PyModule_Create(&{prefix}module);"),
            "if (m == NULL)",
            "    return NULL;",
        ]);
        emitter.emit_lines(&[
            "_globals = PyModule_GetDict(m);",
            "if (_globals == NULL)",
            "    return NULL;",
        ]);
        self.generate_imports_init_section(&module.imports, emitter);

        for (literal, symbol) in module.literals() {
            match literal {
                Literal::Int(decimal) => {
                    emitter.emit_line(&format!(
                        "{symbol} = PyLong_FromString(\"{decimal}\", NULL, 10);"
                    ));
                }
                Literal::Float(bits) => {
                    emitter.emit_line(&format!(
                        "{symbol} = PyFloat_FromDouble({:?});",
                        f64::from_bits(*bits)
                    ));
                }
                Literal::Str(value) => {
                    let (encoded, size) = encode_as_c_string(value);
                    emitter.emit_lines(&[
                        &format!("{symbol} = PyUnicode_FromStringAndSize({encoded}, {size});"),
                        &format!("if ({symbol} == NULL)"),
                        "    return NULL;",
                    ]);
                }
            }
        }

        for cl in &module.classes {
            let type_struct = cl.type_struct();
            emitter.emit_lines(&[
                &format!("Py_INCREF(&{type_struct});"),
                &format!(
                    "PyModule_AddObject(m, \"{}\", (PyObject *)&{type_struct});",
                    cl.name
                ),
            ]);
        }
        emitter.emit_line("return m;");
        emitter.emit_line("}");
    }

    fn generate_imports_init_section(&self, imports: &[String], emitter: &mut Emitter) {
        for imp in imports {
            let global = c_module_name(imp);
            emitter.emit_line(&format!("{global} = PyImport_ImportModule(\"{imp}\");"));
            emitter.emit_line(&format!("if ({global} == NULL)"));
            emitter.emit_line("    return NULL;");
        }
    }
}

/// Convenience wrapper over [`ModuleGenerator`] for the common case.
pub fn generate_c(
    modules: &[(String, ModuleIR)],
    source_paths: &FxHashMap<String, String>,
) -> String {
    ModuleGenerator::new(modules, source_paths).generate_c_for_modules()
}

#[cfg(test)]
mod tests;
