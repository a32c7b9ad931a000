//! The shapes of values as seen by decoded and generated CIL.
//!
//! This is deliberately a small model. It knows enough to pick the right indirect load/store,
//! decide whether a value must be boxed, and check whether a hook parameter can receive a
//! value. It does not attempt to load or lay out types.
//!
//! # Key Components
//!
//! - [`TypeShape`] - a signature-level type (`int32`, `class Foo`, `valuetype Bar&`, `!0`, ...)
//! - [`TypeRef`] - a named class or value type with its base chain
//! - [`GenericContext`] - type arguments used to close generic shapes during resolution
//! - [`corlib`] - the handful of `System` types and methods the hook compiler references

pub mod corlib;
mod generics;

pub use generics::GenericContext;

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::metadata::token::Token;

/// A named class or value type.
///
/// Identity is the token together with the full name, the base chain is carried along so
/// reference assignability can be answered without a type loader.
#[derive(Debug, Clone)]
pub struct TypeRef {
    /// Token of the type in its own module
    pub token: Token,
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple name, including the generic arity suffix if any
    pub name: String,
    /// Value types are copied and boxed, classes are referenced
    pub is_value_type: bool,
    /// Number of generic parameters of the type definition
    pub generic_arity: u32,
    /// Base type, `None` for `System.Object` and interfaces
    pub base: Option<Box<TypeRef>>,
}

impl TypeRef {
    /// A reference type deriving from `System.Object`
    #[must_use]
    pub fn class(token: Token, namespace: &str, name: &str) -> Self {
        TypeRef {
            token,
            namespace: namespace.to_string(),
            name: name.to_string(),
            is_value_type: false,
            generic_arity: 0,
            base: Some(Box::new(corlib::object())),
        }
    }

    /// A value type deriving from `System.ValueType`
    #[must_use]
    pub fn value_type(token: Token, namespace: &str, name: &str) -> Self {
        TypeRef {
            token,
            namespace: namespace.to_string(),
            name: name.to_string(),
            is_value_type: true,
            generic_arity: 0,
            base: Some(Box::new(corlib::value_type())),
        }
    }

    /// Replace the base type
    #[must_use]
    pub fn with_base(mut self, base: TypeRef) -> Self {
        self.base = Some(Box::new(base));
        self
    }

    /// Set the generic arity
    #[must_use]
    pub fn with_generic_arity(mut self, arity: u32) -> Self {
        self.generic_arity = arity;
        self
    }

    /// `Namespace.Name`, or just `Name` in the global namespace
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Returns true if the type has generic parameters
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.generic_arity > 0
    }

    /// Returns true if `other` is this type or one of its bases
    #[must_use]
    pub fn derives_from(&self, other: &TypeRef) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty == other {
                return true;
            }
            current = ty.base.as_deref();
        }
        false
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token && self.namespace == other.namespace && self.name == other.name
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.hash(state);
        self.namespace.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// A type as it appears in a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeShape {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `int8`
    I1,
    /// `unsigned int8`
    U1,
    /// `int16`
    I2,
    /// `unsigned int16`
    U2,
    /// `int32`
    I4,
    /// `unsigned int32`
    U4,
    /// `int64`
    I8,
    /// `unsigned int64`
    U8,
    /// `float32`
    R4,
    /// `float64`
    R8,
    /// `native int`
    I,
    /// `native unsigned int`
    U,
    /// `string`
    String,
    /// `object`
    Object,
    /// A class reference
    Class(TypeRef),
    /// A user value type (struct)
    ValueType(TypeRef),
    /// An enum, stored and loaded as `int32`
    Enum(TypeRef),
    /// A single-dimension zero-based array
    SzArray(Box<TypeShape>),
    /// A managed pointer (`ref`/`out` parameters)
    ByRef(Box<TypeShape>),
    /// `!n`, a type parameter of the declaring type
    GenericParam(u32),
    /// `!!n`, a type parameter of the method
    GenericMethodParam(u32),
}

impl TypeShape {
    /// Wrap into a managed pointer
    #[must_use]
    pub fn by_ref(self) -> TypeShape {
        TypeShape::ByRef(Box::new(self))
    }

    /// Wrap into a single-dimension array
    #[must_use]
    pub fn sz_array(self) -> TypeShape {
        TypeShape::SzArray(Box::new(self))
    }

    /// Returns true for `void`
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeShape::Void)
    }

    /// Returns true for `bool`
    #[must_use]
    pub fn is_boolean(&self) -> bool {
        matches!(self, TypeShape::Boolean)
    }

    /// Returns true for managed pointers
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeShape::ByRef(_))
    }

    /// The pointee of a managed pointer, `self` otherwise
    #[must_use]
    pub fn element(&self) -> &TypeShape {
        match self {
            TypeShape::ByRef(inner) => inner,
            other => other,
        }
    }

    /// Returns true for values that are copied rather than referenced
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            TypeShape::Boolean
                | TypeShape::Char
                | TypeShape::I1
                | TypeShape::U1
                | TypeShape::I2
                | TypeShape::U2
                | TypeShape::I4
                | TypeShape::U4
                | TypeShape::I8
                | TypeShape::U8
                | TypeShape::R4
                | TypeShape::R8
                | TypeShape::I
                | TypeShape::U
                | TypeShape::ValueType(_)
                | TypeShape::Enum(_)
        )
    }

    /// Returns true for user value types, which need `ldobj`/`stobj`/`initobj`
    #[must_use]
    pub fn is_struct(&self) -> bool {
        matches!(self, TypeShape::ValueType(_))
    }

    /// Returns true for primitive values and enums, which use `ldind.*`/`stind.*`
    #[must_use]
    pub fn is_primitive_value(&self) -> bool {
        self.is_value_type() && !self.is_struct()
    }

    /// The named type behind this shape, if any
    #[must_use]
    pub fn type_ref(&self) -> Option<&TypeRef> {
        match self {
            TypeShape::Class(ty) | TypeShape::ValueType(ty) | TypeShape::Enum(ty) => Some(ty),
            _ => None,
        }
    }

    /// Returns true if a location of this shape can hold a value of shape `source` without
    /// conversion, boxing aside.
    ///
    /// Covers identity, `object` from anything, and classes from derived classes. Value
    /// types are only assignable from themselves; see [`TypeShape::needs_box_from`].
    #[must_use]
    pub fn is_assignable_from(&self, source: &TypeShape) -> bool {
        if self == source {
            return true;
        }

        match (self, source) {
            (_, TypeShape::Void) | (TypeShape::Void, _) => false,
            (TypeShape::ByRef(_), _) | (_, TypeShape::ByRef(_)) => false,
            (TypeShape::Object, _) => true,
            (TypeShape::Class(target), TypeShape::Class(ty))
            | (TypeShape::Class(target), TypeShape::ValueType(ty))
            | (TypeShape::Class(target), TypeShape::Enum(ty)) => ty.derives_from(target),
            (TypeShape::Class(target), TypeShape::String) => {
                *target == corlib::object() || target.full_name() == "System.String"
            }
            (TypeShape::Class(target), TypeShape::SzArray(_)) => {
                *target == corlib::object() || target.full_name() == "System.Array"
            }
            (TypeShape::SzArray(target), TypeShape::SzArray(element)) => {
                !element.is_value_type() && target.is_assignable_from(element)
            }
            _ => false,
        }
    }

    /// Returns true if moving a `source` value into this shape requires `box`
    #[must_use]
    pub fn needs_box_from(&self, source: &TypeShape) -> bool {
        self != source
            && !self.is_value_type()
            && source.is_value_type()
            && self.is_assignable_from(source)
    }

    /// Conversion instructions implementing an implicit numeric widening from `source`.
    ///
    /// Returns `None` if there is no implicit widening, `Some(&[])` if the evaluation stack
    /// representation already matches.
    #[must_use]
    pub fn widening_from(&self, source: &TypeShape) -> Option<&'static [&'static str]> {
        use TypeShape as S;

        let unsigned = matches!(source, S::U1 | S::U2 | S::Char | S::U4 | S::U8);
        let source_rank = match source {
            S::I1 | S::U1 | S::I2 | S::U2 | S::Char | S::I4 | S::U4 => 32,
            S::I8 | S::U8 => 64,
            S::R4 => 4,
            _ => return None,
        };

        let allowed = match source {
            S::I1 => matches!(self, S::I2 | S::I4 | S::I8 | S::R4 | S::R8),
            S::U1 => matches!(
                self,
                S::I2 | S::U2 | S::I4 | S::U4 | S::I8 | S::U8 | S::R4 | S::R8
            ),
            S::I2 => matches!(self, S::I4 | S::I8 | S::R4 | S::R8),
            S::U2 | S::Char => matches!(self, S::I4 | S::U4 | S::I8 | S::U8 | S::R4 | S::R8)
                || (matches!(source, S::Char) && matches!(self, S::U2)),
            S::I4 => matches!(self, S::I8 | S::R4 | S::R8),
            S::U4 => matches!(self, S::I8 | S::U8 | S::R4 | S::R8),
            S::I8 | S::U8 => matches!(self, S::R4 | S::R8),
            S::R4 => matches!(self, S::R8),
            _ => false,
        };
        if !allowed {
            return None;
        }

        Some(match (self, source_rank, unsigned) {
            (S::I2 | S::U2 | S::I4 | S::U4, 32, _) => &[],
            (S::I8, 32, false) => &["conv.i8"],
            (S::I8 | S::U8, 32, true) => &["conv.u8"],
            (S::R8, 4, _) => &["conv.r8"],
            (S::R4, _, false) => &["conv.r4"],
            (S::R8, _, false) => &["conv.r8"],
            (S::R4, _, true) => &["conv.r.un", "conv.r4"],
            (S::R8, _, true) => &["conv.r.un", "conv.r8"],
            _ => return None,
        })
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeShape::Void => f.write_str("void"),
            TypeShape::Boolean => f.write_str("bool"),
            TypeShape::Char => f.write_str("char"),
            TypeShape::I1 => f.write_str("int8"),
            TypeShape::U1 => f.write_str("uint8"),
            TypeShape::I2 => f.write_str("int16"),
            TypeShape::U2 => f.write_str("uint16"),
            TypeShape::I4 => f.write_str("int32"),
            TypeShape::U4 => f.write_str("uint32"),
            TypeShape::I8 => f.write_str("int64"),
            TypeShape::U8 => f.write_str("uint64"),
            TypeShape::R4 => f.write_str("float32"),
            TypeShape::R8 => f.write_str("float64"),
            TypeShape::I => f.write_str("native int"),
            TypeShape::U => f.write_str("native uint"),
            TypeShape::String => f.write_str("string"),
            TypeShape::Object => f.write_str("object"),
            TypeShape::Class(ty) => write!(f, "class {ty}"),
            TypeShape::ValueType(ty) | TypeShape::Enum(ty) => write!(f, "valuetype {ty}"),
            TypeShape::SzArray(element) => write!(f, "{element}[]"),
            TypeShape::ByRef(element) => write!(f, "{element}&"),
            TypeShape::GenericParam(index) => write!(f, "!{index}"),
            TypeShape::GenericMethodParam(index) => write!(f, "!!{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animal() -> TypeRef {
        TypeRef::class(Token(0x0200_0002), "Zoo", "Animal")
    }

    fn dog() -> TypeRef {
        TypeRef::class(Token(0x0200_0003), "Zoo", "Dog").with_base(animal())
    }

    fn point() -> TypeRef {
        TypeRef::value_type(Token(0x0200_0004), "Geo", "Point")
    }

    #[test]
    fn value_type_classification() {
        assert!(TypeShape::I4.is_value_type());
        assert!(TypeShape::I4.is_primitive_value());
        assert!(!TypeShape::I4.is_struct());
        assert!(TypeShape::ValueType(point()).is_struct());
        assert!(TypeShape::Enum(point()).is_primitive_value());
        assert!(!TypeShape::String.is_value_type());
        assert!(!TypeShape::Void.is_value_type());
        assert!(!TypeShape::I4.by_ref().is_value_type());
    }

    #[test]
    fn assignability() {
        let animal = TypeShape::Class(animal());
        let dog = TypeShape::Class(dog());

        assert!(animal.is_assignable_from(&dog));
        assert!(!dog.is_assignable_from(&animal));
        assert!(TypeShape::Object.is_assignable_from(&dog));
        assert!(TypeShape::Object.is_assignable_from(&TypeShape::I4));
        assert!(TypeShape::Class(corlib::value_type()).is_assignable_from(&TypeShape::ValueType(point())));
        assert!(!TypeShape::I4.is_assignable_from(&TypeShape::Object));
        assert!(!TypeShape::Object.is_assignable_from(&TypeShape::Void));
        assert!(!TypeShape::Object.is_assignable_from(&TypeShape::I4.by_ref()));

        let animals = animal.clone().sz_array();
        assert!(animals.is_assignable_from(&dog.clone().sz_array()));
        assert!(!TypeShape::Object.sz_array().is_assignable_from(&TypeShape::I4.sz_array()));
    }

    #[test]
    fn boxing() {
        assert!(TypeShape::Object.needs_box_from(&TypeShape::I4));
        assert!(TypeShape::Object.needs_box_from(&TypeShape::ValueType(point())));
        assert!(!TypeShape::Object.needs_box_from(&TypeShape::String));
        assert!(!TypeShape::I4.needs_box_from(&TypeShape::I4));
    }

    #[test]
    fn widening() {
        assert_eq!(TypeShape::I8.widening_from(&TypeShape::I4), Some(&["conv.i8"][..]));
        assert_eq!(TypeShape::I8.widening_from(&TypeShape::U4), Some(&["conv.u8"][..]));
        assert_eq!(TypeShape::I4.widening_from(&TypeShape::I2), Some(&[][..]));
        assert_eq!(TypeShape::R8.widening_from(&TypeShape::R4), Some(&["conv.r8"][..]));
        assert_eq!(
            TypeShape::R8.widening_from(&TypeShape::U8),
            Some(&["conv.r.un", "conv.r8"][..])
        );
        assert_eq!(TypeShape::U2.widening_from(&TypeShape::Char), Some(&[][..]));
        assert_eq!(TypeShape::I4.widening_from(&TypeShape::I8), None);
        assert_eq!(TypeShape::U4.widening_from(&TypeShape::I4), None);
        assert_eq!(TypeShape::I4.widening_from(&TypeShape::Boolean), None);
    }

    #[test]
    fn display() {
        assert_eq!(TypeShape::I4.by_ref().to_string(), "int32&");
        assert_eq!(TypeShape::Object.sz_array().to_string(), "object[]");
        assert_eq!(TypeShape::Class(dog()).to_string(), "class Zoo.Dog");
        assert_eq!(TypeShape::GenericMethodParam(1).to_string(), "!!1");
    }
}
