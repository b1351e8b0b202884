//! Chain-cipher passwords supplied by the user.
//!
//! Passwords cannot be recovered from the protected assembly. They are given per
//! method token, optionally per guarded range ordinal, in the form
//! `TOKEN[#ORDINAL]:PASSWORD`. A password without ordinal applies to every range
//! of the method that has no more specific entry.

use std::{collections::HashMap, fmt, str::FromStr};

use crate::{metadata::Token, Error, Result};

/// One `TOKEN[#ORDINAL]:PASSWORD` argument.
///
/// # Examples
///
/// ```rust
/// use eazdevirt::devirt::PasswordEntry;
/// use eazdevirt::metadata::Token;
///
/// let entry: PasswordEntry = "0x06000012#1:hunter2".parse()?;
/// assert_eq!(entry.token, Token(0x0600_0012));
/// assert_eq!(entry.ordinal, Some(1));
/// assert_eq!(entry.password, "hunter2");
/// # Ok::<(), eazdevirt::Error>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordEntry {
    /// Method the password belongs to
    pub token: Token,
    /// Guarded range ordinal, `None` for all ranges
    pub ordinal: Option<u32>,
    /// The password
    pub password: String,
}

impl fmt::Debug for PasswordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordEntry")
            .field("token", &self.token)
            .field("ordinal", &self.ordinal)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parses a method token: `0x` hex, eight bare hex digits, or decimal.
fn parse_token(text: &str) -> Result<Token> {
    let text = text.trim();
    if text.len() == 8 && !text.starts_with("0x") && text.chars().all(|c| c.is_ascii_hexdigit()) {
        return u32::from_str_radix(text, 16)
            .map(Token)
            .map_err(|_| malformed_error!("Invalid method token '{}'", text));
    }
    text.parse()
}

impl FromStr for PasswordEntry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (key, password) = s
            .split_once(':')
            .ok_or_else(|| malformed_error!("Password argument '{}' lacks ':'", s))?;
        if password.is_empty() {
            return Err(malformed_error!("Empty password for '{}'", key));
        }

        let (token, ordinal) = match key.split_once('#') {
            Some((token, ordinal)) => {
                let ordinal = ordinal
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| malformed_error!("Invalid range ordinal '{}'", ordinal))?;
                (parse_token(token)?, Some(ordinal))
            }
            None => (parse_token(key)?, None),
        };

        Ok(PasswordEntry {
            token,
            ordinal,
            password: password.to_string(),
        })
    }
}

/// Passwords keyed by method token and range ordinal.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PasswordStore {
    entries: HashMap<(Token, Option<u32>), String>,
}

impl PasswordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing an earlier one with the same key.
    pub fn insert(&mut self, entry: PasswordEntry) {
        self.entries.insert((entry.token, entry.ordinal), entry.password);
    }

    /// Returns the password for range `ordinal` of `token`.
    #[must_use]
    pub fn get(&self, token: Token, ordinal: u32) -> Option<&str> {
        self.entries
            .get(&(token, Some(ordinal)))
            .or_else(|| self.entries.get(&(token, None)))
            .map(String::as_str)
    }

    /// Returns `true` if any password is stored for `token`.
    #[must_use]
    pub fn has_method(&self, token: Token) -> bool {
        self.entries.keys().any(|(t, _)| *t == token)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PasswordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl FromIterator<PasswordEntry> for PasswordStore {
    fn from_iter<I: IntoIterator<Item = PasswordEntry>>(iter: I) -> Self {
        let mut store = PasswordStore::new();
        for entry in iter {
            store.insert(entry);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let entry: PasswordEntry = "06000001:secret:with:colons".parse().unwrap();
        assert_eq!(entry.token, Token(0x0600_0001));
        assert_eq!(entry.ordinal, None);
        assert_eq!(entry.password, "secret:with:colons");

        let entry: PasswordEntry = "100663297#3:pw".parse().unwrap();
        assert_eq!(entry.token, Token(0x0600_0001));
        assert_eq!(entry.ordinal, Some(3));
    }

    #[test]
    fn test_parse_errors() {
        assert!("0x06000001".parse::<PasswordEntry>().is_err());
        assert!("0x06000001:".parse::<PasswordEntry>().is_err());
        assert!("0x06000001#x:pw".parse::<PasswordEntry>().is_err());
        assert!("nothex:pw".parse::<PasswordEntry>().is_err());
    }

    #[test]
    fn test_lookup_prefers_ordinal() {
        let store: PasswordStore = ["0x06000001:all", "0x06000001#2:second"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(store.get(Token(0x0600_0001), 2), Some("second"));
        assert_eq!(store.get(Token(0x0600_0001), 0), Some("all"));
        assert_eq!(store.get(Token(0x0600_0002), 0), None);
        assert!(store.has_method(Token(0x0600_0001)));
        assert_eq!(store.len(), 2);
        assert!(!format!("{store:?}").contains("second"));
    }
}
