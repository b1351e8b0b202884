//! Position-keyed XOR layer.
//!
//! Every byte is masked with the low byte of `key ^ counter`. The counter follows
//! the byte's absolute stream position for general reads, while method bodies are
//! read with a counter restarted from the method's own decrypted key. Which policy
//! applies is decided per stream role by the caller through [`CounterSeed`].

use std::io::{self, Read, Seek, SeekFrom};

/// How the XOR counter of the next byte is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterSeed {
    /// Counter equals the absolute stream position
    #[default]
    Position,
    /// Counter equals `seed + (position - origin)`
    Reseeded {
        /// Stream position at which the counter equals `seed`
        origin: u64,
        /// Counter value at `origin`
        seed: u32,
    },
}

impl CounterSeed {
    /// Returns the counter for the byte at `position`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn counter_at(&self, position: u64) -> u32 {
        match *self {
            CounterSeed::Position => position as u32,
            CounterSeed::Reseeded { origin, seed } => {
                seed.wrapping_add(position.wrapping_sub(origin) as u32)
            }
        }
    }
}

#[inline]
fn mask(key: u32, counter: u32) -> u8 {
    (key ^ counter) as u8
}

/// Applies the XOR layer to `data`, the first byte having counter `first_counter`.
///
/// The transform is its own inverse.
///
/// # Examples
///
/// ```rust
/// use eazdevirt::crypto::xor_transform;
///
/// let mut data = *b"virtualized";
/// xor_transform(&mut data, 0x5A17_C0DE, 100);
/// assert_ne!(&data, b"virtualized");
/// xor_transform(&mut data, 0x5A17_C0DE, 100);
/// assert_eq!(&data, b"virtualized");
/// ```
pub fn xor_transform(data: &mut [u8], key: u32, first_counter: u32) {
    for (i, byte) in data.iter_mut().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let counter = first_counter.wrapping_add(i as u32);
        *byte ^= mask(key, counter);
    }
}

/// A reader that removes the XOR layer from an inner stream.
///
/// With `key == None` the stream passes bytes through unchanged, which keeps the
/// reader type identical for streams without an XOR layer.
#[derive(Debug)]
pub struct XorStream<R> {
    inner: R,
    key: Option<u32>,
    seed: CounterSeed,
    position: u64,
}

impl<R: Read + Seek> XorStream<R> {
    /// Wraps `inner`, counting positions from its current position.
    ///
    /// # Errors
    /// Returns an error if the inner position cannot be queried.
    pub fn new(mut inner: R, key: Option<u32>, seed: CounterSeed) -> io::Result<Self> {
        let position = inner.stream_position()?;
        Ok(XorStream {
            inner,
            key,
            seed,
            position,
        })
    }

    /// Switches the counter policy for subsequent reads.
    pub fn set_seed(&mut self, seed: CounterSeed) {
        self.seed = seed;
    }

    /// Returns the counter policy in effect.
    #[must_use]
    pub fn seed(&self) -> CounterSeed {
        self.seed
    }

    /// Returns the current stream position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for XorStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        if let Some(key) = self.key {
            let first = self.seed.counter_at(self.position);
            xor_transform(&mut buf[..read], key, first);
        }
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for XorStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}
