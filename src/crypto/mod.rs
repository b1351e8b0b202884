//! Layered decryption of the interpreter's program streams.
//!
//! The protected assembly carries its virtual program in resources that are
//! wrapped in up to two stream layers, plus a third layer guarding selected
//! method-body ranges:
//!
//! - [`rsa`] - public-key decryption of fixed-size blocks, cached by index
//! - [`xor`] - position-keyed XOR with a pluggable counter policy
//! - [`chain`] - password-keyed block cipher over guarded body ranges
//!
//! A [`StreamSpec`] describes one resource and its layers; [`StreamSpec::open`]
//! validates it into a [`LayeredStream`], from which any number of independent
//! [`ProgramStream`] cursors can be created. Cursors over a block-encrypted
//! resource share one decryption cache.
//!
//! # Examples
//!
//! ```rust
//! use std::{io::Read, sync::Arc};
//! use eazdevirt::crypto::{xor_transform, CounterSeed, CryptoContext, StreamSpec};
//!
//! let mut data = b"program".to_vec();
//! xor_transform(&mut data, 0x42, 0);
//!
//! let spec = StreamSpec::new(Arc::from(data), vec![CryptoContext::Xor(0x42)]);
//! let stream = spec.open()?;
//! let mut cursor = stream.cursor(CounterSeed::Position)?;
//! let mut plain = String::new();
//! cursor.read_to_string(&mut plain)?;
//! assert_eq!(plain, "program");
//! # Ok::<(), eazdevirt::Error>(())
//! ```

pub mod chain;
pub mod rsa;
pub mod xor;

use std::{
    io::{self, Cursor, Read, Seek, SeekFrom},
    sync::Arc,
};

pub use chain::ChainKey;
pub use rsa::{BlockSource, BlockStream, RsaKey};
pub use xor::{xor_transform, CounterSeed, XorStream};

use crate::{Error, Result};

/// Key material of one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoContext {
    /// XOR layer key
    Xor(u32),
    /// Block layer public key
    Rsa(RsaKey),
    /// Chain layer key schedule
    Chain(ChainKey),
}

/// A resource and the layers protecting it, outermost first.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    /// Raw resource bytes
    pub data: Arc<[u8]>,
    /// Layers in decryption order
    pub layers: Vec<CryptoContext>,
}

impl StreamSpec {
    /// Creates a spec.
    #[must_use]
    pub fn new(data: Arc<[u8]>, layers: Vec<CryptoContext>) -> Self {
        StreamSpec { data, layers }
    }

    /// Validates the layer stack and prepares the stream.
    ///
    /// The block layer, when present, must come first; at most one XOR layer may
    /// follow. Chain keys guard method ranges and are rejected here.
    ///
    /// # Errors
    /// Returns [`Error::Crypto`] for an invalid layer stack or a block resource
    /// whose header cannot be decrypted.
    pub fn open(&self) -> Result<LayeredStream> {
        let mut base = Base::Memory(self.data.clone());
        let mut xor_key = None;

        for (index, layer) in self.layers.iter().enumerate() {
            match layer {
                CryptoContext::Rsa(key) if index == 0 => {
                    base = Base::Blocks(Arc::new(BlockSource::new(
                        key.clone(),
                        self.data.clone(),
                    )?));
                }
                CryptoContext::Rsa(_) => {
                    return Err(Error::Crypto(
                        "Block layer must be the outermost layer".to_string(),
                    ))
                }
                CryptoContext::Xor(key) if xor_key.is_none() => xor_key = Some(*key),
                CryptoContext::Xor(_) => {
                    return Err(Error::Crypto("Duplicate XOR layer".to_string()))
                }
                CryptoContext::Chain(_) => {
                    return Err(Error::Crypto(
                        "Chain keys apply to method ranges, not streams".to_string(),
                    ))
                }
            }
        }

        Ok(LayeredStream { base, xor_key })
    }
}

#[derive(Debug, Clone)]
enum Base {
    Memory(Arc<[u8]>),
    Blocks(Arc<BlockSource>),
}

/// An opened logical stream.
#[derive(Debug, Clone)]
pub struct LayeredStream {
    base: Base,
    xor_key: Option<u32>,
}

impl LayeredStream {
    /// Returns the logical length of the stream.
    #[must_use]
    pub fn len(&self) -> u64 {
        match &self.base {
            Base::Memory(data) => data.len() as u64,
            Base::Blocks(source) => source.payload_len(),
        }
    }

    /// Returns `true` if the logical stream is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the XOR key, if the stream has an XOR layer.
    #[must_use]
    pub fn xor_key(&self) -> Option<u32> {
        self.xor_key
    }

    /// Returns the shared block source, if the stream has a block layer.
    #[must_use]
    pub fn block_source(&self) -> Option<&Arc<BlockSource>> {
        match &self.base {
            Base::Blocks(source) => Some(source),
            Base::Memory(_) => None,
        }
    }

    /// Creates an independent cursor at position 0.
    ///
    /// # Errors
    /// Returns an error if the cursor position cannot be established.
    pub fn cursor(&self, seed: CounterSeed) -> Result<ProgramStream> {
        let source = match &self.base {
            Base::Memory(data) => Source::Memory(Cursor::new(data.clone())),
            Base::Blocks(source) => Source::Blocks(BlockStream::new(source.clone())),
        };
        Ok(XorStream::new(source, self.xor_key, seed)?)
    }
}

/// The innermost reader of a [`ProgramStream`].
#[derive(Debug)]
pub enum Source {
    /// Unencrypted or XOR-only resource
    Memory(Cursor<Arc<[u8]>>),
    /// Block-encrypted resource
    Blocks(BlockStream),
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Memory(cursor) => cursor.read(buf),
            Source::Blocks(stream) => stream.read(buf),
        }
    }
}

impl Seek for Source {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Source::Memory(cursor) => cursor.seek(pos),
            Source::Blocks(stream) => stream.seek(pos),
        }
    }
}

/// A cursor over a fully decrypted logical stream.
pub type ProgramStream = XorStream<Source>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::crypto::{rsa_encrypt_stream, test_key_512};

    #[test]
    fn test_layer_validation() {
        let data: Arc<[u8]> = Arc::from(vec![0u8; 8]);
        let key = test_key_512().public.clone();

        let bad = StreamSpec::new(
            data.clone(),
            vec![CryptoContext::Xor(1), CryptoContext::Rsa(key)],
        );
        assert!(matches!(bad.open(), Err(Error::Crypto(_))));

        let bad = StreamSpec::new(
            data.clone(),
            vec![CryptoContext::Xor(1), CryptoContext::Xor(2)],
        );
        assert!(bad.open().is_err());

        let bad = StreamSpec::new(
            data,
            vec![CryptoContext::Chain(ChainKey::new([0; 10], [0; 4]))],
        );
        assert!(bad.open().is_err());
    }

    #[test]
    fn test_rsa_then_xor() -> Result<()> {
        let pair = test_key_512();
        let plain: Vec<u8> = (0..150u8).collect();
        let mut layered = plain.clone();
        xor_transform(&mut layered, 0xC0FF_EE00, 0);
        let data = rsa_encrypt_stream(&pair, &layered, 50);

        let spec = StreamSpec::new(
            data,
            vec![CryptoContext::Rsa(pair.public.clone()), CryptoContext::Xor(0xC0FF_EE00)],
        );
        let stream = spec.open()?;
        assert_eq!(stream.len(), 150);
        assert!(stream.block_source().is_some());

        let mut a = stream.cursor(CounterSeed::Position)?;
        let mut b = stream.cursor(CounterSeed::Position)?;
        b.seek(SeekFrom::Start(100))?;

        let mut buf = [0u8; 10];
        b.read_exact(&mut buf)?;
        assert_eq!(&buf, &plain[100..110]);
        a.read_exact(&mut buf)?;
        assert_eq!(&buf, &plain[..10]);
        Ok(())
    }
}
