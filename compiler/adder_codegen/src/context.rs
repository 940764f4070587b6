//! Code generation context and declaration bookkeeping.
//!
//! The [`EmitterContext`] is shared by every emitter in one code
//! generation run. It owns the forward-declaration table and the
//! counter for emitter temporaries. Emission order of declarations is
//! fully deterministic: the table is insertion-ordered and dependency
//! lists are ordered vectors, so repeated compilations of unchanged
//! input produce byte-identical output.

use rustc_hash::{FxHashMap, FxHashSet};

use adder_ir::ClassIR;

/// One forward declaration: body lines plus the names of declarations
/// that must be emitted before it (struct definitions referenced by
/// value, for example).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderDeclaration {
    pub dependencies: Vec<String>,
    pub body: Vec<String>,
}

impl HeaderDeclaration {
    pub fn new(body: Vec<String>) -> Self {
        Self {
            dependencies: Vec::new(),
            body,
        }
    }

    pub fn with_dependencies(dependencies: Vec<String>, body: Vec<String>) -> Self {
        Self { dependencies, body }
    }
}

/// Insertion-ordered declaration table keyed by declared name.
///
/// The first insertion under a name wins; re-registering is a no-op.
/// That is what makes declare-once guards (tuple structs, shared
/// globals) fall out of the table itself.
#[derive(Default)]
pub struct Declarations {
    order: Vec<String>,
    by_name: FxHashMap<String, HeaderDeclaration>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, declaration: HeaderDeclaration) {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return;
        }
        self.order.push(name.clone());
        self.by_name.insert(name, declaration);
    }

    pub fn get(&self, name: &str) -> Option<&HeaderDeclaration> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Topologically sort the table by dependencies.
    ///
    /// Depth-first, emit-on-first-visit in registration order: any
    /// declaration naming another as a dependency is emitted after
    /// that dependency. The dependency relation is strict structural
    /// containment, so the graph is acyclic by construction. Runs in
    /// `O(V + E)`.
    ///
    /// # Panics
    ///
    /// Panics if a dependency names a declaration that was never
    /// registered.
    pub fn toposort(&self) -> Vec<&HeaderDeclaration> {
        fn visit<'d>(
            decls: &'d Declarations,
            name: &str,
            visited: &mut FxHashSet<&'d str>,
            result: &mut Vec<&'d HeaderDeclaration>,
        ) {
            let (key, declaration) = match decls.by_name.get_key_value(name) {
                Some(entry) => entry,
                None => panic!("declaration depends on unregistered name {name:?}"),
            };
            if !visited.insert(key.as_str()) {
                return;
            }
            for child in &declaration.dependencies {
                visit(decls, child, visited, result);
            }
            result.push(declaration);
        }

        let mut visited = FxHashSet::default();
        let mut result = Vec::with_capacity(self.order.len());
        for name in &self.order {
            visit(self, name, &mut visited, &mut result);
        }
        result
    }
}

/// Shared state for one code generation run.
pub struct EmitterContext {
    pub declarations: Declarations,
    /// Names of the modules being compiled together.
    pub module_names: Vec<String>,
    temp_counter: u32,
}

impl EmitterContext {
    pub fn new(module_names: Vec<String>) -> Self {
        Self {
            declarations: Declarations::new(),
            module_names,
            temp_counter: 0,
        }
    }

    /// A fresh emitter-temporary name, unique across the whole run.
    pub fn temp_name(&mut self) -> String {
        self.temp_counter += 1;
        format!("__tmp{}", self.temp_counter)
    }
}

/// Class lookup for slot-index resolution during emission.
///
/// Instance types carry only their class name; attribute getter/setter
/// and method slot indices come from the owning [`ClassIR`]'s ordering,
/// resolved through this table.
pub struct ClassTable<'ir> {
    by_name: FxHashMap<&'ir str, &'ir ClassIR>,
}

impl<'ir> ClassTable<'ir> {
    pub fn new(classes: impl IntoIterator<Item = &'ir ClassIR>) -> Self {
        let mut by_name = FxHashMap::default();
        for cl in classes {
            by_name.insert(cl.name.as_str(), cl);
        }
        Self { by_name }
    }

    /// # Panics
    ///
    /// Panics if no class with this name was registered; an op naming
    /// an unknown class means the upstream lowering is malformed.
    pub fn get(&self, name: &str) -> &'ir ClassIR {
        match self.by_name.get(name) {
            Some(cl) => cl,
            None => panic!("reference to unknown class {name:?}"),
        }
    }
}
