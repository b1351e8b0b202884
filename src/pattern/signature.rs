//! Signatures: symbol sequences with an optional verification callback.

use std::{fmt, sync::Arc};

use crate::{
    assembly::Instruction,
    pattern::{matcher::MatchContext, symbol::Symbol},
};

/// Verification callback over a matched instruction window.
///
/// Verifiers inspect operands of the window (field identity, called helper, type
/// operands) and may recurse into other bodies through the [`MatchContext`].
pub type Verifier = dyn Fn(&MatchContext<'_>, &[Instruction]) -> bool + Send + Sync;

/// How a signature is applied to a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// The symbols must cover the whole body
    Contiguous,
    /// The symbols must match a contiguous window anywhere in the body
    #[default]
    Window,
}

/// An ordered list of shape symbols.
#[derive(Clone)]
pub struct Signature {
    name: String,
    symbols: Vec<Symbol>,
    mode: MatchMode,
    verifier: Option<Arc<Verifier>>,
}

impl Signature {
    /// Creates a signature that must match a whole body.
    pub fn contiguous(name: impl Into<String>, symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Signature {
            name: name.into(),
            symbols: symbols.into_iter().collect(),
            mode: MatchMode::Contiguous,
            verifier: None,
        }
    }

    /// Creates a signature that matches the first verified window of a body.
    pub fn window(name: impl Into<String>, symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Signature {
            name: name.into(),
            symbols: symbols.into_iter().collect(),
            mode: MatchMode::Window,
            verifier: None,
        }
    }

    /// Attaches a verifier. A match is only reported when it returns `true`.
    #[must_use]
    pub fn with_verifier<F>(mut self, verifier: F) -> Self
    where
        F: Fn(&MatchContext<'_>, &[Instruction]) -> bool + Send + Sync + 'static,
    {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Returns the signature name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the symbols.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Returns the match mode.
    #[must_use]
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Returns `true` if a verifier is attached.
    #[must_use]
    pub fn has_verifier(&self) -> bool {
        self.verifier.is_some()
    }

    pub(crate) fn shape_matches(&self, window: &[Instruction]) -> bool {
        window.len() == self.symbols.len()
            && self
                .symbols
                .iter()
                .zip(window)
                .all(|(symbol, instruction)| symbol.matches(instruction))
    }

    pub(crate) fn verify(&self, context: &MatchContext<'_>, window: &[Instruction]) -> bool {
        self.verifier
            .as_ref()
            .map_or(true, |verifier| verifier(context, window))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("name", &self.name)
            .field("symbols", &self.symbols)
            .field("mode", &self.mode)
            .field("verifier", &self.verifier.is_some())
            .finish()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbols: Vec<String> = self.symbols.iter().map(ToString::to_string).collect();
        write!(f, "{}: [{}]", self.name, symbols.join(", "))
    }
}
