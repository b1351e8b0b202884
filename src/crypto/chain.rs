//! Chain layer guarding selected method-body ranges.
//!
//! A small substitution-permutation network over 32-bit blocks with an 80-bit key,
//! modelled on PRESENT: five rounds of round-key addition, a 4-bit S-box layer and
//! a bit permutation, followed by a final key addition. Blocks are chained in CBC
//! mode; a trailing partial block is XORed with the encryption of the previous
//! ciphertext block (CFB style), so ciphertext length equals plaintext length.
//!
//! Keys cannot be recovered from the protected binary. They are derived from a
//! user-supplied password with PBKDF2-HMAC-SHA1, salted with the method token and
//! the ordinal of the guarded range inside the method.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

use crate::metadata::Token;

/// Number of SPN rounds.
pub const ROUNDS: usize = 5;

/// PBKDF2 iteration count.
pub const KDF_ITERATIONS: u32 = 1000;

const SBOX: [u8; 16] = [
    0xC, 0x5, 0x6, 0xB, 0x9, 0x0, 0xA, 0xD, 0x3, 0xE, 0xF, 0x8, 0x4, 0x7, 0x1, 0x2,
];

const fn invert_sbox(sbox: [u8; 16]) -> [u8; 16] {
    let mut inverse = [0u8; 16];
    let mut i = 0;
    while i < 16 {
        inverse[sbox[i] as usize] = i as u8;
        i += 1;
    }
    inverse
}

const SBOX_INV: [u8; 16] = invert_sbox(SBOX);

const KEY_MASK: u128 = (1u128 << 80) - 1;

#[inline]
fn substitute(state: u32, table: &[u8; 16]) -> u32 {
    let mut out = 0u32;
    for nibble in 0..8 {
        let shift = nibble * 4;
        out |= u32::from(table[((state >> shift) & 0xF) as usize]) << shift;
    }
    out
}

/// Bit `i` moves to `i * 8 mod 31`; bit 31 stays in place.
#[inline]
fn permute(state: u32) -> u32 {
    let mut out = state & 0x8000_0000;
    for bit in 0..31 {
        out |= ((state >> bit) & 1) << ((bit * 8) % 31);
    }
    out
}

#[inline]
fn permute_inverse(state: u32) -> u32 {
    // 8 * 4 = 32 = 1 (mod 31)
    let mut out = state & 0x8000_0000;
    for bit in 0..31 {
        out |= ((state >> bit) & 1) << ((bit * 4) % 31);
    }
    out
}

/// Expanded key of the chain layer.
#[derive(Clone, PartialEq, Eq)]
pub struct ChainKey {
    round_keys: [u32; ROUNDS + 1],
    iv: u32,
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainKey").finish_non_exhaustive()
    }
}

impl ChainKey {
    /// Expands an 80-bit key (big-endian bytes) and a 4-byte IV (little-endian).
    #[must_use]
    pub fn new(key: [u8; 10], iv: [u8; 4]) -> Self {
        let mut register = key
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | u128::from(b));

        let mut round_keys = [0u32; ROUNDS + 1];
        for (round, round_key) in round_keys.iter_mut().enumerate() {
            *round_key = (register >> 48) as u32;

            register = ((register << 61) | (register >> 19)) & KEY_MASK;
            let top = (register >> 76) as usize & 0xF;
            register = (register & !(0xFu128 << 76)) | (u128::from(SBOX[top]) << 76);
            register ^= ((round as u128 + 1) & 0x1F) << 15;
        }

        ChainKey {
            round_keys,
            iv: u32::from_le_bytes(iv),
        }
    }

    /// Derives a key from a password and salt with PBKDF2-HMAC-SHA1.
    #[must_use]
    pub fn derive(password: &str, salt: &[u8]) -> Self {
        let mut material = [0u8; 14];
        pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, KDF_ITERATIONS, &mut material);

        let mut key = [0u8; 10];
        let mut iv = [0u8; 4];
        key.copy_from_slice(&material[..10]);
        iv.copy_from_slice(&material[10..]);
        ChainKey::new(key, iv)
    }

    /// Derives the key of guarded range `ordinal` inside method `token`.
    #[must_use]
    pub fn for_range(password: &str, token: Token, ordinal: u32) -> Self {
        let mut salt = [0u8; 8];
        salt[..4].copy_from_slice(&token.value().to_le_bytes());
        salt[4..].copy_from_slice(&ordinal.to_le_bytes());
        ChainKey::derive(password, &salt)
    }

    /// Encrypts one block.
    #[must_use]
    pub fn encrypt_block(&self, block: u32) -> u32 {
        let mut state = block;
        for round_key in &self.round_keys[..ROUNDS] {
            state ^= round_key;
            state = substitute(state, &SBOX);
            state = permute(state);
        }
        state ^ self.round_keys[ROUNDS]
    }

    /// Decrypts one block.
    #[must_use]
    pub fn decrypt_block(&self, block: u32) -> u32 {
        let mut state = block ^ self.round_keys[ROUNDS];
        for round_key in self.round_keys[..ROUNDS].iter().rev() {
            state = permute_inverse(state);
            state = substitute(state, &SBOX_INV);
            state ^= round_key;
        }
        state
    }

    /// Encrypts `data` in CBC mode.
    #[must_use]
    pub fn encrypt(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        let mut previous = self.iv;

        let mut chunks = data.chunks_exact(4);
        for chunk in &mut chunks {
            let plain = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            previous = self.encrypt_block(plain ^ previous);
            out.extend_from_slice(&previous.to_le_bytes());
        }
        self.apply_tail(chunks.remainder(), previous, &mut out);
        out
    }

    /// Decrypts `data` in CBC mode.
    #[must_use]
    pub fn decrypt(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        let mut previous = self.iv;

        let mut chunks = data.chunks_exact(4);
        for chunk in &mut chunks {
            let cipher = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            out.extend_from_slice(&(self.decrypt_block(cipher) ^ previous).to_le_bytes());
            previous = cipher;
        }
        self.apply_tail(chunks.remainder(), previous, &mut out);
        out
    }

    fn apply_tail(&self, tail: &[u8], previous: u32, out: &mut Vec<u8>) {
        let stream = self.encrypt_block(previous).to_le_bytes();
        out.extend(tail.iter().zip(stream).map(|(b, k)| b ^ k));
    }
}
