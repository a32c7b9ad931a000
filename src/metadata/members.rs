//! Resolved operands of member-referencing instructions.
//!
//! Tokens in a method body are resolved into these values by a
//! [`crate::metadata::SymbolResolver`]. The encoder goes the other way and turns them back
//! into tokens through a [`crate::metadata::DynamicScope`].

use std::fmt;

use crate::metadata::{
    signatures::SignatureMethod,
    token::Token,
    typesystem::{GenericContext, TypeRef, TypeShape},
};

/// A field of some type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Token of the field in its own module
    pub token: Token,
    /// Declaring type
    pub owner: TypeRef,
    /// Field name
    pub name: String,
    /// Type of the field
    pub shape: TypeShape,
    /// Static fields have no receiver
    pub is_static: bool,
}

impl FieldRef {
    /// Close the field type over a generic context
    #[must_use]
    pub fn substitute(&self, context: &GenericContext) -> FieldRef {
        FieldRef {
            shape: context.substitute(&self.shape),
            ..self.clone()
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.shape, self.owner, self.name)
    }
}

/// A method of some type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Token of the method in its own module
    pub token: Token,
    /// Declaring type
    pub owner: TypeRef,
    /// Method name
    pub name: String,
    /// Calling convention, parameters and return type
    pub signature: SignatureMethod,
}

impl MethodRef {
    /// Create a method reference
    #[must_use]
    pub fn new(token: Token, owner: TypeRef, name: &str, signature: SignatureMethod) -> Self {
        MethodRef {
            token,
            owner,
            name: name.to_string(),
            signature,
        }
    }

    /// Close the signature over a generic context
    #[must_use]
    pub fn substitute(&self, context: &GenericContext) -> MethodRef {
        MethodRef {
            signature: self.signature.substitute(context),
            ..self.clone()
        }
    }

    /// `Owner::Name`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.owner, self.name)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signature = &self.signature;
        if signature.has_this {
            f.write_str("instance ")?;
        }
        write!(f, "{} {}::{}(", signature.return_type, self.owner, self.name)?;
        for (index, param) in signature.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

/// The target of a field, method or type token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRef {
    /// `ldfld`, `stsfld`, `ldflda`, ...
    Field(FieldRef),
    /// `call`, `callvirt`, `newobj`, `ldftn`, ...
    Method(MethodRef),
    /// `box`, `newarr`, `castclass`, `initobj`, ...
    Type(TypeShape),
}

impl MemberRef {
    /// The field, if this is one
    #[must_use]
    pub fn as_field(&self) -> Option<&FieldRef> {
        match self {
            MemberRef::Field(field) => Some(field),
            _ => None,
        }
    }

    /// The method, if this is one
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodRef> {
        match self {
            MemberRef::Method(method) => Some(method),
            _ => None,
        }
    }

    /// The type, if this is one
    #[must_use]
    pub fn as_type(&self) -> Option<&TypeShape> {
        match self {
            MemberRef::Type(shape) => Some(shape),
            _ => None,
        }
    }
}

impl From<FieldRef> for MemberRef {
    fn from(field: FieldRef) -> Self {
        MemberRef::Field(field)
    }
}

impl From<MethodRef> for MemberRef {
    fn from(method: MethodRef) -> Self {
        MemberRef::Method(method)
    }
}

impl From<TypeShape> for MemberRef {
    fn from(shape: TypeShape) -> Self {
        MemberRef::Type(shape)
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRef::Field(field) => write!(f, "{field}"),
            MemberRef::Method(method) => write!(f, "{method}"),
            MemberRef::Type(shape) => write!(f, "{shape}"),
        }
    }
}
