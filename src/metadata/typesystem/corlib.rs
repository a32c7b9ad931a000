//! Well-known `System` types and methods.
//!
//! These carry a null token: they are referenced by name and imported into a
//! [`crate::metadata::DynamicScope`] when generated code uses them.

use crate::metadata::{
    members::MethodRef,
    signatures::SignatureMethod,
    token::Token,
    typesystem::{TypeRef, TypeShape},
};

fn system(name: &str, is_value_type: bool, base: Option<TypeRef>) -> TypeRef {
    TypeRef {
        token: Token(0),
        namespace: "System".to_string(),
        name: name.to_string(),
        is_value_type,
        generic_arity: 0,
        base: base.map(Box::new),
    }
}

/// `System.Object`
#[must_use]
pub fn object() -> TypeRef {
    system("Object", false, None)
}

/// `System.ValueType`
#[must_use]
pub fn value_type() -> TypeRef {
    system("ValueType", false, Some(object()))
}

/// `System.Delegate`
#[must_use]
pub fn delegate() -> TypeRef {
    system("Delegate", false, Some(object()))
}

/// `System.RuntimeMethodHandle`
#[must_use]
pub fn runtime_method_handle() -> TypeRef {
    system("RuntimeMethodHandle", true, Some(value_type()))
}

/// `System.RuntimeTypeHandle`
#[must_use]
pub fn runtime_type_handle() -> TypeRef {
    system("RuntimeTypeHandle", true, Some(value_type()))
}

/// `System.Reflection.MethodBase`
#[must_use]
pub fn method_base() -> TypeRef {
    TypeRef {
        namespace: "System.Reflection".to_string(),
        ..system("MethodBase", false, Some(object()))
    }
}

/// `object[]`, the shape of `__args`
#[must_use]
pub fn object_array() -> TypeShape {
    TypeShape::Object.sz_array()
}

/// `MethodBase.GetMethodFromHandle(RuntimeMethodHandle)`
#[must_use]
pub fn get_method_from_handle() -> MethodRef {
    MethodRef::new(
        Token(0),
        method_base(),
        "GetMethodFromHandle",
        SignatureMethod::new_static(
            TypeShape::Class(method_base()),
            vec![TypeShape::ValueType(runtime_method_handle())],
        ),
    )
}

/// `MethodBase.GetMethodFromHandle(RuntimeMethodHandle, RuntimeTypeHandle)`, for members of
/// generic types
#[must_use]
pub fn get_method_from_handle_generic() -> MethodRef {
    MethodRef::new(
        Token(0),
        method_base(),
        "GetMethodFromHandle",
        SignatureMethod::new_static(
            TypeShape::Class(method_base()),
            vec![
                TypeShape::ValueType(runtime_method_handle()),
                TypeShape::ValueType(runtime_type_handle()),
            ],
        ),
    )
}
