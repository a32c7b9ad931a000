//! Token space of generated code.
//!
//! Code produced by the hook compiler refers to hooks, fields, types and strings that may live
//! in modules unrelated to each other. A [`DynamicScope`] hands out a private token for every
//! distinct operand, in the same `table << 24 | row` layout as module tokens, so the code bytes
//! are well-formed CIL. The host maps the scope's entries to runtime handles when it loads the
//! routine.
//!
//! Entries are deduplicated, importing the same member twice yields the same token. Row `n` of
//! each table is entry `n - 1` of the matching accessor.
//!
//! # Examples
//!
//! ```rust
//! use dothook::metadata::{token::Token, typesystem::TypeShape, DynamicScope};
//!
//! let mut scope = DynamicScope::new();
//! let first = scope.import_type(&TypeShape::Object);
//! let again = scope.import_type(&TypeShape::Object);
//! let text = scope.import_string("hi");
//!
//! assert_eq!(first, again);
//! assert_eq!(first, Token(0x0100_0001));
//! assert_eq!(text, Token(0x7000_0001));
//! ```

use std::collections::HashMap;

use crate::{
    metadata::{
        members::{FieldRef, MemberRef, MethodRef},
        resolver::SymbolResolver,
        signatures::SignatureMethod,
        token::Token,
        typesystem::{GenericContext, TypeShape},
    },
    Error::UnresolvedToken,
    Result,
};

/// A growing, deduplicated token table for one generated routine.
#[derive(Debug, Clone, Default)]
pub struct DynamicScope {
    types: Vec<TypeShape>,
    members: Vec<MemberRef>,
    strings: Vec<String>,
    signatures: Vec<SignatureMethod>,
    lookup: HashMap<ScopeKey, Token>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ScopeKey {
    Type(TypeShape),
    Member(MemberRef),
    String(String),
    Signature(SignatureMethod),
}

fn next_token(table: u8, len: usize) -> Token {
    // Rows are 24 bits wide, a routine never comes close
    #[allow(clippy::cast_possible_truncation)]
    Token::from_parts(table, len as u32 + 1)
}

impl DynamicScope {
    /// Create an empty scope
    #[must_use]
    pub fn new() -> Self {
        DynamicScope::default()
    }

    /// Token for a type operand
    pub fn import_type(&mut self, shape: &TypeShape) -> Token {
        let key = ScopeKey::Type(shape.clone());
        if let Some(token) = self.lookup.get(&key) {
            return *token;
        }

        let token = next_token(Token::TYPE_REF, self.types.len());
        self.types.push(shape.clone());
        self.lookup.insert(key, token);
        token
    }

    /// Token for a field or method operand, types are routed to [`DynamicScope::import_type`]
    pub fn import_member(&mut self, member: &MemberRef) -> Token {
        if let MemberRef::Type(shape) = member {
            return self.import_type(shape);
        }

        let key = ScopeKey::Member(member.clone());
        if let Some(token) = self.lookup.get(&key) {
            return *token;
        }

        let token = next_token(Token::MEMBER_REF, self.members.len());
        self.members.push(member.clone());
        self.lookup.insert(key, token);
        token
    }

    /// Token for an `ldstr` literal
    pub fn import_string(&mut self, value: &str) -> Token {
        let key = ScopeKey::String(value.to_string());
        if let Some(token) = self.lookup.get(&key) {
            return *token;
        }

        let token = next_token(Token::USER_STRING, self.strings.len());
        self.strings.push(value.to_string());
        self.lookup.insert(key, token);
        token
    }

    /// Token for a `calli` signature
    pub fn import_signature(&mut self, signature: &SignatureMethod) -> Token {
        let key = ScopeKey::Signature(signature.clone());
        if let Some(token) = self.lookup.get(&key) {
            return *token;
        }

        let token = next_token(Token::STANDALONE_SIG, self.signatures.len());
        self.signatures.push(signature.clone());
        self.lookup.insert(key, token);
        token
    }

    /// Imported types, row `n` at index `n - 1`
    #[must_use]
    pub fn types(&self) -> &[TypeShape] {
        &self.types
    }

    /// Imported fields and methods, row `n` at index `n - 1`
    #[must_use]
    pub fn members(&self) -> &[MemberRef] {
        &self.members
    }

    /// Imported string literals, row `n` at index `n - 1`
    #[must_use]
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Imported signatures, row `n` at index `n - 1`
    #[must_use]
    pub fn signatures(&self) -> &[SignatureMethod] {
        &self.signatures
    }

    /// Total number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Returns true if nothing was imported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    fn row<T>(entries: &[T], token: Token, table: u8) -> Option<&T> {
        if token.table() != table || token.row() == 0 {
            return None;
        }
        entries.get(token.row() as usize - 1)
    }
}

impl SymbolResolver for DynamicScope {
    fn resolve_field(&self, token: Token, context: &GenericContext) -> Result<FieldRef> {
        match Self::row(&self.members, token, Token::MEMBER_REF) {
            Some(MemberRef::Field(field)) => Ok(field.substitute(context)),
            _ => Err(UnresolvedToken(token)),
        }
    }

    fn resolve_method(&self, token: Token, context: &GenericContext) -> Result<MethodRef> {
        match Self::row(&self.members, token, Token::MEMBER_REF) {
            Some(MemberRef::Method(method)) => Ok(method.substitute(context)),
            _ => Err(UnresolvedToken(token)),
        }
    }

    fn resolve_type(&self, token: Token, context: &GenericContext) -> Result<TypeShape> {
        Self::row(&self.types, token, Token::TYPE_REF)
            .map(|shape| context.substitute(shape))
            .ok_or(UnresolvedToken(token))
    }

    fn resolve_string(&self, token: Token) -> Result<String> {
        Self::row(&self.strings, token, Token::USER_STRING)
            .cloned()
            .ok_or(UnresolvedToken(token))
    }

    fn resolve_signature(&self, token: Token, context: &GenericContext) -> Result<SignatureMethod> {
        Self::row(&self.signatures, token, Token::STANDALONE_SIG)
            .map(|signature| signature.substitute(context))
            .ok_or(UnresolvedToken(token))
    }
}
