//! Runtime type model.
//!
//! Every register in the IR carries an [`RType`] describing its runtime
//! representation: the C storage type, whether the value lives inline
//! (unboxed) or behind a `PyObject *`, whether it participates in
//! reference counting, and which bit pattern serves as its
//! undefined/error sentinel.
//!
//! The representation set is closed — primitives, fixed-length unboxed
//! tuples, native class instances, and nullable wrappers — and every
//! consumer dispatches over it with an exhaustive `match`.

use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Strip the `builtins.` prefix from a fully-qualified type name.
pub fn short_name(name: &str) -> &str {
    name.strip_prefix("builtins.").unwrap_or(name)
}

// ── Primitives ──────────────────────────────────────────────────────

/// Built-in primitive representation.
///
/// The registry is closed and eagerly constructed: each variant indexes
/// a row of [`PRIMITIVE_INFO`]. Two primitives are the same type iff
/// their names match, which for this registry is variant identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RPrimitive {
    /// Arbitrary boxed object (`PyObject *`).
    Object,
    /// Unboxed tagged integer (`CPyTagged`). The low bit distinguishes
    /// inline small integers from boxed fallback objects sharing the
    /// same storage slot; stored literals are doubled accordingly.
    Int,
    /// Unboxed single byte (`char`). Sentinel is `2`, outside the
    /// valid `0`/`1` range.
    Bool,
    /// The `None` singleton, stored boxed.
    None,
    List,
    Dict,
    /// At the C layer, `str` is PyUnicode.
    Str,
    /// Tuple of arbitrary length (`Tuple[t, ...]`), stored boxed.
    /// Distinct from [`RTuple`], the fixed-length unboxed aggregate.
    Tuple,
}

struct PrimitiveInfo {
    name: &'static str,
    ctype: &'static str,
    is_unboxed: bool,
    is_refcounted: bool,
    c_undefined: &'static str,
}

/// One row per [`RPrimitive`] variant, in declaration order.
const PRIMITIVE_INFO: [PrimitiveInfo; 8] = [
    PrimitiveInfo {
        name: "builtins.object",
        ctype: "PyObject *",
        is_unboxed: false,
        is_refcounted: true,
        c_undefined: "NULL",
    },
    PrimitiveInfo {
        name: "builtins.int",
        ctype: "CPyTagged",
        is_unboxed: true,
        is_refcounted: true,
        c_undefined: "CPY_INT_TAG",
    },
    PrimitiveInfo {
        name: "builtins.bool",
        ctype: "char",
        is_unboxed: true,
        is_refcounted: false,
        c_undefined: "2",
    },
    PrimitiveInfo {
        name: "builtins.None",
        ctype: "PyObject *",
        is_unboxed: false,
        is_refcounted: true,
        c_undefined: "NULL",
    },
    PrimitiveInfo {
        name: "builtins.list",
        ctype: "PyObject *",
        is_unboxed: false,
        is_refcounted: true,
        c_undefined: "NULL",
    },
    PrimitiveInfo {
        name: "builtins.dict",
        ctype: "PyObject *",
        is_unboxed: false,
        is_refcounted: true,
        c_undefined: "NULL",
    },
    PrimitiveInfo {
        name: "builtins.str",
        ctype: "PyObject *",
        is_unboxed: false,
        is_refcounted: true,
        c_undefined: "NULL",
    },
    PrimitiveInfo {
        name: "builtins.tuple",
        ctype: "PyObject *",
        is_unboxed: false,
        is_refcounted: true,
        c_undefined: "NULL",
    },
];

impl RPrimitive {
    fn info(self) -> &'static PrimitiveInfo {
        &PRIMITIVE_INFO[self as usize]
    }

    /// Fully-qualified name, e.g. `builtins.int`.
    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn ctype(self) -> &'static str {
        self.info().ctype
    }

    pub fn is_unboxed(self) -> bool {
        self.info().is_unboxed
    }

    pub fn is_refcounted(self) -> bool {
        self.info().is_refcounted
    }

    pub fn c_undefined(self) -> &'static str {
        self.info().c_undefined
    }
}

// ── Fixed-length tuples ─────────────────────────────────────────────

/// Fixed-length, heterogeneous, unboxed tuple.
///
/// Identity is structural: two independently-constructed `RTuple`s with
/// equal element sequences are the same type, and must be compared with
/// [`is_same_type`](crate::sametype::is_same_type) or `==`, never by
/// address. There is no single-expression undefined sentinel — callers
/// materialize a temporary aggregate from the element sentinels.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RTuple {
    pub types: Vec<RType>,
}

impl RTuple {
    pub fn new(types: Vec<RType>) -> Self {
        Self { types }
    }

    /// Refcounted iff any element type is.
    pub fn is_refcounted(&self) -> bool {
        self.types.iter().any(RType::is_refcounted)
    }

    /// Stable identifier for the generated C struct name.
    ///
    /// C has no anonymous structural type equivalence, so each distinct
    /// tuple shape gets one named struct, declared once. The identifier
    /// is the `FxHasher` fingerprint of the structural encoding (the
    /// derived `Hash`: variant discriminants plus names plus element
    /// recursion), rendered as 16 hex digits. The fingerprint is 64
    /// bits wide, so the chance of any collision among `n` distinct
    /// shapes in one compilation is about `n^2 / 2^65` — negligible for
    /// realistic module sizes, but not zero; a collision would merge
    /// two struct declarations.
    pub fn unique_id(&self) -> String {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Name of the generated C struct for this tuple shape.
    pub fn struct_name(&self) -> String {
        format!("tuple_def_{}", self.unique_id())
    }

    pub fn ctype(&self) -> String {
        format!("struct {}", self.struct_name())
    }
}

// ── Class instances ─────────────────────────────────────────────────

/// Instance of a compiled class, stored as an opaque managed pointer.
///
/// Carries only the class name; attribute and method slot indices are
/// computed from the owning [`ClassIR`](crate::func::ClassIR)'s
/// ordering, resolved through a class table at emission time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RInstance {
    pub class_name: String,
}

impl RInstance {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }

    /// Name of the generated C object struct.
    pub fn struct_name(&self) -> String {
        format!("{}Object", self.class_name)
    }

    /// Name of the generated C type object.
    pub fn type_struct(&self) -> String {
        format!("{}Type", self.class_name)
    }
}

// ── Optionals ───────────────────────────────────────────────────────

/// `Optional[x]`, always boxed.
///
/// The undefined sentinel is the null pointer, which collides with a
/// boxed value type's own absent-object value: for `Optional[object]`
/// the sentinel is indistinguishable from "holds the boxed absence
/// value". The front end must not wrap an already-nullable boxed type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ROptional {
    pub value_type: Box<RType>,
}

impl ROptional {
    pub fn new(value_type: RType) -> Self {
        Self {
            value_type: Box::new(value_type),
        }
    }
}

// ── The runtime type sum ────────────────────────────────────────────

/// A runtime representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RType {
    Primitive(RPrimitive),
    Tuple(RTuple),
    Instance(RInstance),
    Optional(ROptional),
}

impl RType {
    pub const OBJECT: RType = RType::Primitive(RPrimitive::Object);
    pub const INT: RType = RType::Primitive(RPrimitive::Int);
    pub const BOOL: RType = RType::Primitive(RPrimitive::Bool);
    pub const NONE: RType = RType::Primitive(RPrimitive::None);
    pub const LIST: RType = RType::Primitive(RPrimitive::List);
    pub const DICT: RType = RType::Primitive(RPrimitive::Dict);
    pub const STR: RType = RType::Primitive(RPrimitive::Str);
    pub const TUPLE: RType = RType::Primitive(RPrimitive::Tuple);

    pub fn tuple(types: Vec<RType>) -> Self {
        RType::Tuple(RTuple::new(types))
    }

    pub fn instance(class_name: impl Into<String>) -> Self {
        RType::Instance(RInstance::new(class_name))
    }

    pub fn optional(value_type: RType) -> Self {
        RType::Optional(ROptional::new(value_type))
    }

    /// Symbolic name of this representation.
    pub fn name(&self) -> &str {
        match self {
            RType::Primitive(p) => p.name(),
            RType::Tuple(_) => "tuple",
            RType::Instance(i) => &i.class_name,
            RType::Optional(_) => "optional",
        }
    }

    /// Stored inline by value rather than behind a managed pointer.
    pub fn is_unboxed(&self) -> bool {
        match self {
            RType::Primitive(p) => p.is_unboxed(),
            RType::Tuple(_) => true,
            RType::Instance(_) | RType::Optional(_) => false,
        }
    }

    /// Participates in retain/release bookkeeping.
    pub fn is_refcounted(&self) -> bool {
        match self {
            RType::Primitive(p) => p.is_refcounted(),
            RType::Tuple(t) => t.is_refcounted(),
            RType::Instance(_) | RType::Optional(_) => true,
        }
    }

    /// The C storage type.
    pub fn ctype(&self) -> String {
        match self {
            RType::Primitive(p) => p.ctype().to_string(),
            RType::Tuple(t) => t.ctype(),
            RType::Instance(_) | RType::Optional(_) => "PyObject *".to_string(),
        }
    }

    /// The C storage type with a trailing space for non-pointer
    /// declaration contexts.
    pub fn ctype_spaced(&self) -> String {
        let ctype = self.ctype();
        if ctype.ends_with('*') {
            ctype
        } else {
            format!("{ctype} ")
        }
    }

    /// The undefined/error sentinel as a single C expression.
    ///
    /// Returns `None` for fixed-length tuples, which have no
    /// single-expression sentinel: callers must materialize a temporary
    /// aggregate whose fields are each element's own sentinel.
    pub fn c_undefined_value(&self) -> Option<&'static str> {
        match self {
            RType::Primitive(p) => Some(p.c_undefined()),
            RType::Tuple(_) => None,
            RType::Instance(_) | RType::Optional(_) => Some("NULL"),
        }
    }

    /// The error-signalling value; identical to the undefined value.
    pub fn c_error_value(&self) -> Option<&'static str> {
        self.c_undefined_value()
    }

    pub fn is_object(&self) -> bool {
        matches!(self, RType::Primitive(RPrimitive::Object))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, RType::Primitive(RPrimitive::Int))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, RType::Primitive(RPrimitive::Bool))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RType::Primitive(RPrimitive::None))
    }
}

impl fmt::Display for RType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RType::Primitive(p) => write!(f, "{}", short_name(p.name())),
            RType::Tuple(t) => {
                write!(f, "tuple[")?;
                for (i, item) in t.types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            RType::Instance(i) => write!(f, "{}", short_name(&i.class_name)),
            RType::Optional(o) => write!(f, "optional[{}]", o.value_type),
        }
    }
}
