//! Configuration of a devirtualization run.
//!
//! [`DevirtConfig`] carries the only user inputs that influence recovery itself
//! (chain-cipher passwords and XOR counter policies) together with the output
//! flags a front-end applies when saving the result.

use crate::{
    crypto::CounterSeed,
    devirt::password::{PasswordEntry, PasswordStore},
    resolver::DEFAULT_MAX_DEPTH,
};

/// How the XOR counter of one stream role is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum CounterMode {
    /// Counter equals the absolute stream position
    #[default]
    Position,
    /// Counter restarts from the key of the method being decoded
    MethodKey,
}

/// XOR counter seeding per stream role.
///
/// The two roles are observed to differ in protected samples: records of the
/// resolver stream are keyed by position, method bodies by the method's own key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterPolicy {
    /// Resolver stream reads
    pub resolver: CounterMode,
    /// Method stream reads
    pub method_body: CounterMode,
}

impl Default for CounterPolicy {
    fn default() -> Self {
        CounterPolicy {
            resolver: CounterMode::Position,
            method_body: CounterMode::MethodKey,
        }
    }
}

impl CounterPolicy {
    /// Seed of a resolver cursor used while decoding a method keyed `seed`.
    #[must_use]
    pub fn resolver_seed(&self, seed: u32) -> CounterSeed {
        match self.resolver {
            CounterMode::Position => CounterSeed::Position,
            CounterMode::MethodKey => CounterSeed::Reseeded { origin: 0, seed },
        }
    }

    /// Seed of the method stream for a body starting at `origin`.
    #[must_use]
    pub fn method_seed(&self, origin: u64, seed: u32) -> CounterSeed {
        match self.method_body {
            CounterMode::Position => CounterSeed::Position,
            CounterMode::MethodKey => CounterSeed::Reseeded { origin, seed },
        }
    }
}

/// Boundary flags applied when writing the devirtualized assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputOptions {
    /// Keep original metadata tokens when writing
    pub preserve_tokens: bool,
    /// Skip label and stack verification for every method
    pub skip_verification: bool,
    /// Write output even if some methods failed
    pub save_anyway: bool,
    /// Splice only fully recovered methods
    pub only_recovered: bool,
}

/// Configuration of a devirtualization run.
#[derive(Debug, Clone, PartialEq)]
pub struct DevirtConfig {
    /// Chain-cipher passwords
    pub passwords: PasswordStore,
    /// XOR counter seeding
    pub counter_policy: CounterPolicy,
    /// Decrypt chain-cipher guarded ranges; when off, guarded methods are
    /// unrecoverable
    pub chain_cipher: bool,
    /// Output flags
    pub output: OutputOptions,
    /// Bound on nested operand record references
    pub max_resolve_depth: usize,
    /// Classify handlers on the rayon thread pool
    pub parallel_catalog: bool,
}

impl Default for DevirtConfig {
    fn default() -> Self {
        DevirtConfig {
            passwords: PasswordStore::new(),
            counter_policy: CounterPolicy::default(),
            chain_cipher: true,
            output: OutputOptions::default(),
            max_resolve_depth: DEFAULT_MAX_DEPTH,
            parallel_catalog: true,
        }
    }
}

impl DevirtConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Splices only fully recovered bodies and withholds output on failures.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            output: OutputOptions {
                only_recovered: true,
                ..OutputOptions::default()
            },
            ..Self::default()
        }
    }

    /// Splices degraded bodies too and saves whatever was recovered.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            output: OutputOptions {
                save_anyway: true,
                ..OutputOptions::default()
            },
            ..Self::default()
        }
    }

    /// Adds a chain-cipher password.
    #[must_use]
    pub fn with_password(mut self, entry: PasswordEntry) -> Self {
        self.passwords.insert(entry);
        self
    }

    /// Sets the XOR counter policy.
    #[must_use]
    pub fn with_counter_policy(mut self, policy: CounterPolicy) -> Self {
        self.counter_policy = policy;
        self
    }

    /// Enables or disables the chain-cipher layer.
    #[must_use]
    pub fn with_chain_cipher(mut self, enabled: bool) -> Self {
        self.chain_cipher = enabled;
        self
    }

    /// Sets the output flags.
    #[must_use]
    pub fn with_output(mut self, output: OutputOptions) -> Self {
        self.output = output;
        self
    }

    /// Sets the bound on nested operand record references.
    #[must_use]
    pub fn with_max_resolve_depth(mut self, depth: usize) -> Self {
        self.max_resolve_depth = depth;
        self
    }

    /// Enables or disables parallel handler classification.
    #[must_use]
    pub fn with_parallel_catalog(mut self, parallel: bool) -> Self {
        self.parallel_catalog = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Token;

    #[test]
    fn test_presets() {
        let strict = DevirtConfig::strict();
        assert!(strict.output.only_recovered);
        assert!(!strict.output.save_anyway);

        let lenient = DevirtConfig::lenient();
        assert!(lenient.output.save_anyway);
        assert!(!lenient.output.only_recovered);
        assert_eq!(lenient.max_resolve_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_builders() {
        let config = DevirtConfig::new()
            .with_password("0x06000001:pw".parse().unwrap())
            .with_chain_cipher(false)
            .with_parallel_catalog(false)
            .with_max_resolve_depth(8);
        assert_eq!(config.passwords.get(Token(0x0600_0001), 0), Some("pw"));
        assert!(!config.chain_cipher);
        assert!(!config.parallel_catalog);
        assert_eq!(config.max_resolve_depth, 8);
    }

    #[test]
    fn test_counter_policy_seeds() {
        let policy = CounterPolicy::default();
        assert_eq!(policy.resolver_seed(7), CounterSeed::Position);
        assert_eq!(
            policy.method_seed(100, 7),
            CounterSeed::Reseeded { origin: 100, seed: 7 }
        );

        let positional = CounterPolicy {
            resolver: CounterMode::MethodKey,
            method_body: CounterMode::Position,
        };
        assert_eq!(positional.method_seed(100, 7), CounterSeed::Position);
        assert_eq!(
            positional.resolver_seed(7),
            CounterSeed::Reseeded { origin: 0, seed: 7 }
        );
    }
}
