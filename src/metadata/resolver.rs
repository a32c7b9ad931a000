//! Token resolution.
//!
//! The decoder never interprets metadata tables itself. Every field, method, type, string and
//! signature token is handed to a [`SymbolResolver`] supplied by the host, together with the
//! generic context of the routine being decoded.
//!
//! [`SymbolTable`] is an in-memory resolver backed by `DashMap`, so a host can populate it from
//! several threads while decoding reads from it.
//!
//! # Examples
//!
//! ```rust
//! use dothook::metadata::{
//!     token::Token, typesystem::{GenericContext, TypeShape}, SymbolResolver, SymbolTable,
//! };
//!
//! let table = SymbolTable::new();
//! table.insert_string(Token(0x7000_0001), "hello");
//! table.insert_type(Token(0x0100_0002), TypeShape::I4);
//!
//! assert_eq!(table.resolve_string(Token(0x7000_0001))?, "hello");
//! assert_eq!(table.resolve_type(Token(0x0100_0002), &GenericContext::default())?, TypeShape::I4);
//! assert!(table.resolve_string(Token(0x7000_0002)).is_err());
//! # Ok::<(), dothook::Error>(())
//! ```

use dashmap::DashMap;

use crate::{
    metadata::{
        members::{FieldRef, MemberRef, MethodRef},
        signatures::SignatureMethod,
        token::Token,
        typesystem::{GenericContext, TypeShape},
    },
    Error::UnresolvedToken,
    Result,
};

/// Turns operand tokens into resolved members.
///
/// Implementations apply `context` so that members of generic types come back closed over the
/// routine's instantiation.
pub trait SymbolResolver {
    /// Resolve a field token (`ldfld`, `stsfld`, ...)
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown.
    fn resolve_field(&self, token: Token, context: &GenericContext) -> Result<FieldRef>;

    /// Resolve a method token (`call`, `newobj`, `ldftn`, ...)
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown.
    fn resolve_method(&self, token: Token, context: &GenericContext) -> Result<MethodRef>;

    /// Resolve a type token (`box`, `newarr`, `castclass`, catch clauses, ...)
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown.
    fn resolve_type(&self, token: Token, context: &GenericContext) -> Result<TypeShape>;

    /// Resolve a user string token (`ldstr`)
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown.
    fn resolve_string(&self, token: Token) -> Result<String>;

    /// Resolve a stand-alone signature token (`calli`)
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown.
    fn resolve_signature(&self, token: Token, context: &GenericContext) -> Result<SignatureMethod>;

    /// Resolve a token of any member kind, dispatching on its table (`ldtoken`).
    ///
    /// `MemberRef` tokens may name either a method or a field, methods are tried first.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown or its table does not
    /// name a member.
    fn resolve_member(&self, token: Token, context: &GenericContext) -> Result<MemberRef> {
        match token.table() {
            Token::FIELD => Ok(MemberRef::Field(self.resolve_field(token, context)?)),
            Token::METHOD_DEF | Token::METHOD_SPEC => {
                Ok(MemberRef::Method(self.resolve_method(token, context)?))
            }
            Token::MEMBER_REF => match self.resolve_method(token, context) {
                Ok(method) => Ok(MemberRef::Method(method)),
                Err(_) => Ok(MemberRef::Field(self.resolve_field(token, context)?)),
            },
            Token::TYPE_DEF | Token::TYPE_REF | Token::TYPE_SPEC => {
                Ok(MemberRef::Type(self.resolve_type(token, context)?))
            }
            _ => Err(UnresolvedToken(token)),
        }
    }
}

/// An in-memory [`SymbolResolver`].
///
/// Entries are stored open, generic contexts are applied on every lookup.
#[derive(Default)]
pub struct SymbolTable {
    members: DashMap<Token, MemberRef>,
    strings: DashMap<Token, String>,
    signatures: DashMap<Token, SignatureMethod>,
}

impl SymbolTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        SymbolTable {
            members: DashMap::new(),
            strings: DashMap::new(),
            signatures: DashMap::new(),
        }
    }

    /// Register a field under its own token
    pub fn insert_field(&self, field: FieldRef) {
        self.members.insert(field.token, MemberRef::Field(field));
    }

    /// Register a method under its own token
    pub fn insert_method(&self, method: MethodRef) {
        self.members.insert(method.token, MemberRef::Method(method));
    }

    /// Register a type under `token`
    pub fn insert_type(&self, token: Token, shape: TypeShape) {
        self.members.insert(token, MemberRef::Type(shape));
    }

    /// Register a user string
    pub fn insert_string(&self, token: Token, value: &str) {
        self.strings.insert(token, value.to_string());
    }

    /// Register a stand-alone signature
    pub fn insert_signature(&self, token: Token, signature: SignatureMethod) {
        self.signatures.insert(token, signature);
    }

    /// Number of registered entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len() + self.strings.len() + self.signatures.len()
    }

    /// Returns true if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.members.clear();
        self.strings.clear();
        self.signatures.clear();
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve_field(&self, token: Token, context: &GenericContext) -> Result<FieldRef> {
        match self.members.get(&token).as_deref() {
            Some(MemberRef::Field(field)) => Ok(field.substitute(context)),
            _ => Err(UnresolvedToken(token)),
        }
    }

    fn resolve_method(&self, token: Token, context: &GenericContext) -> Result<MethodRef> {
        match self.members.get(&token).as_deref() {
            Some(MemberRef::Method(method)) => Ok(method.substitute(context)),
            _ => Err(UnresolvedToken(token)),
        }
    }

    fn resolve_type(&self, token: Token, context: &GenericContext) -> Result<TypeShape> {
        match self.members.get(&token).as_deref() {
            Some(MemberRef::Type(shape)) => Ok(context.substitute(shape)),
            _ => Err(UnresolvedToken(token)),
        }
    }

    fn resolve_string(&self, token: Token) -> Result<String> {
        self.strings
            .get(&token)
            .map(|entry| entry.value().clone())
            .ok_or(UnresolvedToken(token))
    }

    fn resolve_signature(&self, token: Token, context: &GenericContext) -> Result<SignatureMethod> {
        self.signatures
            .get(&token)
            .map(|entry| entry.value().substitute(context))
            .ok_or(UnresolvedToken(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::TypeRef;

    fn holder() -> TypeRef {
        TypeRef::class(Token(0x0200_0002), "Demo", "Holder`1").with_generic_arity(1)
    }

    #[test]
    fn resolve_kinds() {
        let table = SymbolTable::new();
        let method = MethodRef::new(
            Token(0x0600_0001),
            holder(),
            "Get",
            SignatureMethod::new_instance(TypeShape::GenericParam(0), vec![]),
        );
        table.insert_method(method.clone());
        table.insert_signature(
            Token(0x1100_0001),
            SignatureMethod::new_static(TypeShape::Void, vec![]),
        );

        let context = GenericContext::default();
        assert_eq!(table.resolve_method(Token(0x0600_0001), &context).unwrap(), method);
        assert!(table.resolve_field(Token(0x0600_0001), &context).is_err());
        assert!(table.resolve_signature(Token(0x1100_0001), &context).is_ok());
        assert_eq!(table.len(), 2);

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn generic_context_applied() {
        let table = SymbolTable::new();
        table.insert_field(FieldRef {
            token: Token(0x0400_0001),
            owner: holder(),
            name: "item".to_string(),
            shape: TypeShape::GenericParam(0),
            is_static: false,
        });

        let context = GenericContext::new(vec![TypeShape::String], vec![]);
        let field = table.resolve_field(Token(0x0400_0001), &context).unwrap();
        assert_eq!(field.shape, TypeShape::String);
    }

    #[test]
    fn member_dispatch() {
        let table = SymbolTable::new();
        let field = FieldRef {
            token: Token(0x0A00_0003),
            owner: holder(),
            name: "count".to_string(),
            shape: TypeShape::I4,
            is_static: true,
        };
        table.insert_field(field.clone());
        table.insert_type(Token(0x0100_0001), TypeShape::Object);

        let context = GenericContext::default();
        assert_eq!(
            table.resolve_member(Token(0x0A00_0003), &context).unwrap(),
            MemberRef::Field(field)
        );
        assert_eq!(
            table.resolve_member(Token(0x0100_0001), &context).unwrap(),
            MemberRef::Type(TypeShape::Object)
        );
        assert!(matches!(
            table.resolve_member(Token(0x7000_0001), &context),
            Err(UnresolvedToken(Token(0x7000_0001)))
        ));
    }
}
