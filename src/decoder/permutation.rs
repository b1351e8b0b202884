//! Byte permutations of scrambled multi-byte primitives.

use std::fmt;

use crate::Result;

/// Widths that carry a permutation.
pub const WIDTHS: [usize; 3] = [2, 4, 8];

/// A byte permutation of one primitive width.
///
/// `order[i]` is the little-endian byte index that stream byte `i` holds, so the
/// identity permutation describes plain little-endian data.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Permutation {
    order: Vec<u8>,
}

impl Permutation {
    /// Creates a permutation from its order vector.
    ///
    /// # Errors
    /// Returns [`crate::Error::Bootstrap`] if the width is not 2, 4 or 8 or the
    /// vector is not a permutation of `0..width`.
    pub fn new(order: Vec<u8>) -> Result<Self> {
        if !WIDTHS.contains(&order.len()) {
            return Err(bootstrap_error!(
                "Unsupported primitive width {}",
                order.len()
            ));
        }

        let mut seen = 0u16;
        for &index in &order {
            if usize::from(index) >= order.len() || seen & (1 << index) != 0 {
                return Err(bootstrap_error!("{:?} is not a byte permutation", order));
            }
            seen |= 1 << index;
        }

        Ok(Permutation { order })
    }

    /// Returns the identity permutation of `width` bytes, clamped to 8.
    #[must_use]
    pub fn identity(width: usize) -> Self {
        let width = width.min(8) as u8;
        Permutation {
            order: (0..width).collect(),
        }
    }

    /// Returns the primitive width in bytes.
    #[must_use]
    pub fn width(&self) -> usize {
        self.order.len()
    }

    /// Returns the order vector.
    #[must_use]
    pub fn order(&self) -> &[u8] {
        &self.order
    }

    /// Returns `true` for plain little-endian order.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.order.iter().enumerate().all(|(i, &o)| usize::from(o) == i)
    }

    /// Reorders stream bytes into little-endian order.
    ///
    /// `stream` must hold at least [`Permutation::width`] bytes.
    #[must_use]
    pub fn unscramble(&self, stream: &[u8]) -> [u8; 8] {
        let mut le = [0u8; 8];
        for (i, &target) in self.order.iter().enumerate() {
            le[usize::from(target)] = stream[i];
        }
        le
    }

    /// Reorders little-endian bytes into stream order.
    #[must_use]
    pub fn scramble(&self, le: &[u8]) -> Vec<u8> {
        self.order.iter().map(|&target| le[usize::from(target)]).collect()
    }

    /// Decodes `stream` as an unsigned integer of this width.
    #[must_use]
    pub fn decode(&self, stream: &[u8]) -> u64 {
        u64::from_le_bytes(self.unscramble(stream))
    }
}

impl fmt::Debug for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permutation{:?}", self.order)
    }
}

/// One permutation per width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationProfile {
    /// 16-bit integers
    pub p2: Permutation,
    /// 32-bit integers and floats
    pub p4: Permutation,
    /// 64-bit integers and floats
    pub p8: Permutation,
}

impl PermutationProfile {
    /// Creates a profile from three permutations of width 2, 4 and 8.
    ///
    /// # Errors
    /// Returns [`crate::Error::Bootstrap`] if a permutation has the wrong width.
    pub fn new(p2: Permutation, p4: Permutation, p8: Permutation) -> Result<Self> {
        for (expected, permutation) in WIDTHS.iter().zip([&p2, &p4, &p8]) {
            if permutation.width() != *expected {
                return Err(bootstrap_error!(
                    "Expected a {}-byte permutation, got {:?}",
                    expected,
                    permutation
                ));
            }
        }
        Ok(PermutationProfile { p2, p4, p8 })
    }

    /// Creates a profile from raw order vectors.
    ///
    /// # Errors
    /// Returns [`crate::Error::Bootstrap`] if any vector is invalid.
    pub fn from_orders(o2: &[u8], o4: &[u8], o8: &[u8]) -> Result<Self> {
        PermutationProfile::new(
            Permutation::new(o2.to_vec())?,
            Permutation::new(o4.to_vec())?,
            Permutation::new(o8.to_vec())?,
        )
    }

    /// Returns the plain little-endian profile.
    #[must_use]
    pub fn identity() -> Self {
        PermutationProfile {
            p2: Permutation::identity(2),
            p4: Permutation::identity(4),
            p8: Permutation::identity(8),
        }
    }

    /// Returns the permutation for `width`, if one exists.
    #[must_use]
    pub fn for_width(&self, width: usize) -> Option<&Permutation> {
        match width {
            2 => Some(&self.p2),
            4 => Some(&self.p4),
            8 => Some(&self.p8),
            _ => None,
        }
    }
}

impl Default for PermutationProfile {
    fn default() -> Self {
        PermutationProfile::identity()
    }
}

/// Selects one of the two profiles of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum ProfileKind {
    /// Headers, exception tables and resolver records
    #[default]
    General,
    /// Virtual opcode codes and their operands
    Instruction,
}

/// The two permutation profiles discovered for one protected assembly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScrambledProfiles {
    /// Profile of general reads
    pub general: PermutationProfile,
    /// Profile of the instruction stream
    pub instruction: PermutationProfile,
}

impl ScrambledProfiles {
    /// Creates the pair.
    #[must_use]
    pub fn new(general: PermutationProfile, instruction: PermutationProfile) -> Self {
        ScrambledProfiles {
            general,
            instruction,
        }
    }

    /// Returns the profile of `kind`.
    #[must_use]
    pub fn get(&self, kind: ProfileKind) -> &PermutationProfile {
        match kind {
            ProfileKind::General => &self.general,
            ProfileKind::Instruction => &self.instruction,
        }
    }
}
