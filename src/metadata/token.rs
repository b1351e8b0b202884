//! Metadata token type.
//!
//! A token is the 32-bit handle .NET uses for every metadata row: the high byte
//! selects the table and the low 24 bits the row. Tokens appear in this crate as
//! handler and helper method identities, as `Token` operand records, as the
//! optional hint carried by reconstructed operand records, and as the key of
//! chain-cipher passwords.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A metadata token.
///
/// # Examples
///
/// ```rust
/// use eazdevirt::metadata::token::{Token, TokenKind};
///
/// let token = Token::new(0x06000012);
/// assert_eq!(token.table(), 0x06);
/// assert_eq!(token.row(), 0x12);
/// assert_eq!(token.kind(), Some(TokenKind::MethodDef));
/// assert_eq!("0x06000012".parse::<Token>().unwrap(), token);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

/// The metadata tables a reconstructed operand can point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `TypeRef` table (0x01)
    TypeRef,
    /// `TypeDef` table (0x02)
    TypeDef,
    /// `Field` table (0x04)
    Field,
    /// `MethodDef` table (0x06)
    MethodDef,
    /// `MemberRef` table (0x0A)
    MemberRef,
    /// `TypeSpec` table (0x1B)
    TypeSpec,
    /// `MethodSpec` table (0x2B)
    MethodSpec,
    /// User string heap (0x70)
    UserString,
}

impl Token {
    /// Creates a new token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the table identifier (high byte).
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the row index (low 24 bits).
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Classifies the token by table, `None` for tables never referenced by
    /// instruction operands.
    #[must_use]
    pub fn kind(&self) -> Option<TokenKind> {
        match self.table() {
            0x01 => Some(TokenKind::TypeRef),
            0x02 => Some(TokenKind::TypeDef),
            0x04 => Some(TokenKind::Field),
            0x06 => Some(TokenKind::MethodDef),
            0x0A => Some(TokenKind::MemberRef),
            0x1B => Some(TokenKind::TypeSpec),
            0x2B => Some(TokenKind::MethodSpec),
            0x70 => Some(TokenKind::UserString),
            _ => None,
        }
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

impl FromStr for Token {
    type Err = Error;

    /// Parses `0x`-prefixed hexadecimal or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16)
        } else {
            s.parse::<u32>()
        };

        parsed
            .map(Token)
            .map_err(|_| malformed_error!("Invalid metadata token - '{}'", s))
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
