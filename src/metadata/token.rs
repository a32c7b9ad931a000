use std::fmt;
use std::hash::{Hash, Hasher};

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
///
/// Tokens handed out by a [`crate::metadata::DynamicScope`] use the same layout, so decoded
/// and generated code can be inspected with the same tools.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// `TypeDef` table
    pub const TYPE_DEF: u8 = 0x02;
    /// `TypeRef` table
    pub const TYPE_REF: u8 = 0x01;
    /// `Field` table
    pub const FIELD: u8 = 0x04;
    /// `MethodDef` table
    pub const METHOD_DEF: u8 = 0x06;
    /// `MemberRef` table (fields and methods of other modules)
    pub const MEMBER_REF: u8 = 0x0A;
    /// `StandAloneSig` table
    pub const STANDALONE_SIG: u8 = 0x11;
    /// `TypeSpec` table
    pub const TYPE_SPEC: u8 = 0x1B;
    /// `MethodSpec` table
    pub const METHOD_SPEC: u8 = 0x2B;
    /// User string heap
    pub const USER_STRING: u8 = 0x70;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Builds a token from a table id and a row
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token points into a table that describes a type
    #[must_use]
    pub fn is_type(&self) -> bool {
        matches!(
            self.table(),
            Self::TYPE_DEF | Self::TYPE_REF | Self::TYPE_SPEC
        )
    }

    /// Returns true if the token points into the field table
    #[must_use]
    pub fn is_field(&self) -> bool {
        self.table() == Self::FIELD
    }

    /// Returns true if the token points into a table that describes a method
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(self.table(), Self::METHOD_DEF | Self::METHOD_SPEC)
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parts() {
        let token = Token(0x0600_0001);
        assert_eq!(token.table(), Token::METHOD_DEF);
        assert_eq!(token.row(), 1);
        assert!(token.is_method());
        assert!(!token.is_type());

        let token = Token(0x06FF_FFFF);
        assert_eq!(token.row(), 0x00FF_FFFF);
    }

    #[test]
    fn from_parts() {
        let token = Token::from_parts(Token::USER_STRING, 3);
        assert_eq!(token.value(), 0x7000_0003);

        // Row overflow is masked, table survives
        let token = Token::from_parts(Token::TYPE_REF, 0x0100_0002);
        assert_eq!(token.value(), 0x0100_0002);
    }

    #[test]
    fn null() {
        assert!(Token(0).is_null());
        assert!(!Token(0x0400_0001).is_null());
        assert!(Token(0x0400_0001).is_field());
    }

    #[test]
    fn conversions() {
        let token: Token = 0x0200_0005u32.into();
        let back: u32 = token.into();
        assert_eq!(back, 0x0200_0005);
        assert!(token.is_type());
    }

    #[test]
    fn formatting() {
        let token = Token(0x0A00_0010);
        assert_eq!(format!("{token}"), "0x0a000010");
        assert_eq!(
            format!("{token:?}"),
            "Token(0x0a000010, table: 0x0a, row: 16)"
        );
    }

    #[test]
    fn hashing() {
        let mut set = HashSet::new();
        set.insert(Token(0x0600_0001));
        set.insert(Token(0x0600_0001));
        set.insert(Token(0x0600_0002));
        assert_eq!(set.len(), 2);
    }
}
