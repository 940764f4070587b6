//! Structural equality for runtime types and signatures.
//!
//! Tuple and optional types have no canonical identity: two
//! structurally-equal values built independently are distinct objects,
//! so sameness must always be checked by structure, never by address.

use crate::func::FuncIR;
use crate::types::RType;

/// Symmetric, reflexive structural equality over runtime types.
///
/// Primitives are equal iff their names match, instances iff their
/// class names match, optionals iff their wrapped types are equal, and
/// tuples iff they have the same arity with pairwise-equal elements.
/// Cross-variant comparisons are always false.
pub fn is_same_type(a: &RType, b: &RType) -> bool {
    match (a, b) {
        (RType::Primitive(x), RType::Primitive(y)) => x.name() == y.name(),
        (RType::Instance(x), RType::Instance(y)) => x.class_name == y.class_name,
        (RType::Optional(x), RType::Optional(y)) => is_same_type(&x.value_type, &y.value_type),
        (RType::Tuple(x), RType::Tuple(y)) => {
            x.types.len() == y.types.len()
                && x.types
                    .iter()
                    .zip(&y.types)
                    .all(|(t1, t2)| is_same_type(t1, t2))
        }
        _ => false,
    }
}

/// Signature equality for plain functions: same arity, pairwise-equal
/// argument types *and names*, equal return type.
pub fn is_same_signature(a: &FuncIR, b: &FuncIR) -> bool {
    a.args.len() == b.args.len()
        && is_same_type(&a.ret_type, &b.ret_type)
        && a.args
            .iter()
            .zip(&b.args)
            .all(|(x, y)| is_same_type(&x.ty, &y.ty) && x.name == y.name)
}

/// Signature equality for methods: skips the receiver argument, whose
/// binding differs between the compared functions, and ignores
/// argument names.
pub fn is_same_method_signature(a: &FuncIR, b: &FuncIR) -> bool {
    a.args.len() == b.args.len()
        && is_same_type(&a.ret_type, &b.ret_type)
        && a.args
            .iter()
            .skip(1)
            .zip(b.args.iter().skip(1))
            .all(|(x, y)| is_same_type(&x.ty, &y.ty))
}
