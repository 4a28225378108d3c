//! Optional-field rewrite for nested structs.
//!
//! Fields of non-root structs become optional: a plain `T` turns into
//! `Optional(T)`, while sequences and mappings keep their container and make
//! the element optional instead. Root fields are left alone. Applying the
//! pass twice changes nothing.
use crate::ir::{TypeModel, TypeRef};

pub fn pointerize(model: &mut TypeModel) {
    for def in model.structs.values_mut() {
        for field in &mut def.fields {
            let ty = std::mem::replace(&mut field.ty, TypeRef::Any);
            field.ty = pointerize_type(ty);
        }
    }
}

pub fn pointerize_type(ty: TypeRef) -> TypeRef {
    match ty {
        TypeRef::Sequence(inner) => TypeRef::seq(optional(*inner)),
        TypeRef::Mapping(inner) => TypeRef::map(optional(*inner)),
        other => optional(other),
    }
}

fn optional(ty: TypeRef) -> TypeRef {
    match ty {
        TypeRef::Optional(_) => ty,
        other => TypeRef::opt(other),
    }
}
