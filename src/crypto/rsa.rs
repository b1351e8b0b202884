//! Block layer: public-key decryption of fixed-size ciphertext blocks.
//!
//! The program resource is a sequence of ciphertext blocks as wide as the RSA
//! modulus (256 bytes for the 2048-bit keys in use). Each block is raised to the
//! public exponent and PKCS#1 v1.5 unpadded, yielding a variable-length plaintext
//! block of at most `k - 3` bytes. The plaintexts concatenate into the logical
//! stream, whose first four bytes are a little-endian length header.
//!
//! Decrypted blocks are cached by index in a [`DashMap`]: readers seek backwards
//! routinely (every resolver lookup seeks first), and one modular exponentiation
//! per block is the dominating cost of a run. [`BlockSource`] owns the ciphertext
//! and the cache and is shared between all cursors ([`BlockStream`]) over the
//! same resource.

use std::{
    io::{self, Read, Seek, SeekFrom},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use dashmap::DashMap;
use num_bigint::BigUint;

use crate::{Error, Result};

/// Size of the logical stream length header.
pub const LENGTH_HEADER_SIZE: u64 = 4;

/// An RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKey {
    modulus: BigUint,
    exponent: BigUint,
    block_size: usize,
}

impl RsaKey {
    /// The public exponent used by the protector.
    pub const DEFAULT_EXPONENT: u32 = 65537;

    /// Creates a key from a big-endian modulus and a public exponent.
    ///
    /// # Errors
    /// Returns [`Error::Crypto`] if the modulus is too small to hold a PKCS#1 block.
    pub fn new(modulus_be: &[u8], exponent: u32) -> Result<Self> {
        let modulus = BigUint::from_bytes_be(modulus_be);
        let block_size = modulus.bits().div_ceil(8) as usize;
        if block_size < 12 {
            return Err(Error::Crypto(format!(
                "RSA modulus of {block_size} bytes is too small"
            )));
        }
        if exponent < 3 {
            return Err(Error::Crypto(format!("Invalid RSA exponent {exponent}")));
        }

        Ok(RsaKey {
            modulus,
            exponent: BigUint::from(exponent),
            block_size,
        })
    }

    /// Creates a key from a hexadecimal modulus, as found in configuration files.
    ///
    /// # Errors
    /// Returns [`Error::Crypto`] for invalid hex or a too small modulus.
    pub fn from_hex(modulus_hex: &str, exponent: u32) -> Result<Self> {
        let modulus = BigUint::parse_bytes(modulus_hex.trim().as_bytes(), 16)
            .ok_or_else(|| Error::Crypto("RSA modulus is not valid hex".to_string()))?;
        RsaKey::new(&modulus.to_bytes_be(), exponent)
    }

    /// Returns the ciphertext block size in bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Decrypts and unpads one ciphertext block.
    ///
    /// # Errors
    /// Returns [`Error::Crypto`] for a block of the wrong size, a value not below
    /// the modulus, or invalid padding.
    pub fn decrypt_block(&self, block: &[u8]) -> Result<Vec<u8>> {
        if block.len() != self.block_size {
            return Err(Error::Crypto(format!(
                "RSA block of {} bytes, expected {}",
                block.len(),
                self.block_size
            )));
        }

        let c = BigUint::from_bytes_be(block);
        if c >= self.modulus {
            return Err(Error::Crypto("RSA block exceeds modulus".to_string()));
        }

        let m = c.modpow(&self.exponent, &self.modulus).to_bytes_be();
        if m.len() > self.block_size {
            return Err(Error::Crypto("RSA result exceeds block size".to_string()));
        }
        let mut encoded = vec![0u8; self.block_size - m.len()];
        encoded.extend_from_slice(&m);

        unpad_pkcs1(&encoded)
    }
}

/// Strips PKCS#1 v1.5 padding (`00 BT PS 00 DATA`) with block type 1 or 2.
///
/// The padding string may be empty: the protector fills blocks up to the last
/// byte, so the usual eight byte minimum is not enforced.
fn unpad_pkcs1(encoded: &[u8]) -> Result<Vec<u8>> {
    if encoded.len() < 3 || encoded[0] != 0x00 {
        return Err(Error::Crypto("Invalid PKCS#1 block header".to_string()));
    }

    let padding = &encoded[2..];
    let separator = match encoded[1] {
        0x01 => padding
            .iter()
            .position(|&b| b != 0xFF)
            .filter(|&i| padding[i] == 0x00),
        0x02 => padding.iter().position(|&b| b == 0x00),
        other => {
            return Err(Error::Crypto(format!(
                "Unsupported PKCS#1 block type {other}"
            )))
        }
    };

    match separator {
        Some(index) => Ok(padding[index + 1..].to_vec()),
        None => Err(Error::Crypto("PKCS#1 separator not found".to_string())),
    }
}

/// Shared state of one block-encrypted resource: ciphertext, key and cache.
#[derive(Debug)]
pub struct BlockSource {
    key: RsaKey,
    data: Arc<[u8]>,
    cache: DashMap<usize, Arc<[u8]>>,
    /// `offsets[i]` is the logical start of block `i`; grows as blocks are decrypted.
    offsets: RwLock<Vec<u64>>,
    payload_len: u64,
    decryptions: AtomicUsize,
}

impl BlockSource {
    /// Creates the source and reads the logical length header from block 0.
    ///
    /// # Errors
    /// Returns [`Error::Crypto`] if the resource is not a whole number of blocks,
    /// block 0 does not decrypt, or the header exceeds the available plaintext.
    pub fn new(key: RsaKey, data: Arc<[u8]>) -> Result<Self> {
        let block_size = key.block_size();
        if data.is_empty() || data.len() % block_size != 0 {
            return Err(Error::Crypto(format!(
                "Resource of {} bytes is not a sequence of {}-byte blocks",
                data.len(),
                block_size
            )));
        }

        let mut source = BlockSource {
            key,
            data,
            cache: DashMap::new(),
            offsets: RwLock::new(vec![0]),
            payload_len: 0,
            decryptions: AtomicUsize::new(0),
        };
        source.payload_len = source.read_length_header()?;
        Ok(source)
    }

    fn read_length_header(&self) -> Result<u64> {
        let first = self.block(0)?;
        if first.len() < LENGTH_HEADER_SIZE as usize {
            return Err(Error::Crypto(
                "First block too short for the length header".to_string(),
            ));
        }
        let len = u64::from(u32::from_le_bytes([first[0], first[1], first[2], first[3]]));

        // the header cannot promise more plaintext than the blocks can carry
        let max = (self.block_count() * (self.key.block_size() - 3)) as u64;
        if len + LENGTH_HEADER_SIZE > max {
            return Err(Error::Crypto(format!(
                "Length header {len} exceeds resource capacity"
            )));
        }
        Ok(len)
    }

    /// Returns the number of ciphertext blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.data.len() / self.key.block_size()
    }

    /// Returns the logical payload length announced by the header.
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    /// Returns how many modular exponentiations were performed so far.
    #[must_use]
    pub fn decryptions(&self) -> usize {
        self.decryptions.load(Ordering::Relaxed)
    }

    /// Decrypts block `index` without consulting or filling the cache.
    ///
    /// # Errors
    /// Returns an error for an out-of-range index or an undecryptable block.
    pub fn decrypt_uncached(&self, index: usize) -> Result<Vec<u8>> {
        let size = self.key.block_size();
        let start = index
            .checked_mul(size)
            .filter(|&start| start < self.data.len())
            .ok_or_else(|| out_of_bounds_error!())?;
        self.decryptions.fetch_add(1, Ordering::Relaxed);
        self.key.decrypt_block(&self.data[start..start + size])
    }

    /// Returns the plaintext of block `index`, decrypting it on first use.
    ///
    /// # Errors
    /// Returns an error for an out-of-range index or an undecryptable block.
    pub fn block(&self, index: usize) -> Result<Arc<[u8]>> {
        if let Some(block) = self.cache.get(&index) {
            return Ok(block.clone());
        }

        let plain: Arc<[u8]> = Arc::from(self.decrypt_uncached(index)?);
        Ok(self.cache.entry(index).or_insert(plain).clone())
    }

    /// Locates the block containing the logical stream byte `absolute` (header
    /// included), returning the block index and the offset inside it.
    fn locate(&self, absolute: u64) -> Result<Option<(usize, usize)>> {
        {
            let offsets = read_lock!(self.offsets)?;
            if let Some(found) = Self::search(&offsets, absolute) {
                return Ok(Some(found));
            }
        }

        let mut offsets = write_lock!(self.offsets)?;
        loop {
            if let Some(found) = Self::search(&offsets, absolute) {
                return Ok(Some(found));
            }
            let next = offsets.len() - 1;
            if next >= self.block_count() {
                return Ok(None);
            }
            let len = self.block(next)?.len() as u64;
            let start = offsets[next];
            offsets.push(start + len);
        }
    }

    fn search(offsets: &[u64], absolute: u64) -> Option<(usize, usize)> {
        // offsets has one more entry than known blocks; the last is an end marker
        let known = offsets.len() - 1;
        if known == 0 || absolute >= offsets[known] {
            return None;
        }
        let index = offsets.partition_point(|&start| start <= absolute) - 1;
        Some((index, (absolute - offsets[index]) as usize))
    }
}

/// A cursor over the logical payload of a [`BlockSource`].
///
/// Position 0 is the first byte after the length header.
#[derive(Debug, Clone)]
pub struct BlockStream {
    source: Arc<BlockSource>,
    position: u64,
}

impl BlockStream {
    /// Creates a cursor at the start of the payload.
    #[must_use]
    pub fn new(source: Arc<BlockSource>) -> Self {
        BlockStream {
            source,
            position: 0,
        }
    }

    /// Returns the shared source.
    #[must_use]
    pub fn source(&self) -> &Arc<BlockSource> {
        &self.source
    }

    /// Re-reads the length header through the cache.
    ///
    /// # Errors
    /// Returns an error if block 0 cannot be decrypted.
    pub fn length_header(&self) -> Result<u64> {
        self.source.read_length_header()
    }
}

impl Read for BlockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.source.payload_len.saturating_sub(self.position);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let absolute = self.position + LENGTH_HEADER_SIZE;
        let Some((index, offset)) = self.source.locate(absolute).map_err(io::Error::other)? else {
            return Ok(0);
        };
        let block = self.source.block(index).map_err(io::Error::other)?;

        let available = (block.len() - offset).min(remaining as usize);
        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&block[offset..offset + count]);
        self.position += count as u64;
        Ok(count)
    }
}

impl Seek for BlockStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.source.payload_len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of block stream",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::crypto::{rsa_encrypt_stream, test_key_2048, test_key_512, TestKeyPair};

    #[test]
    fn test_unpad_types() {
        let mut block = vec![0x00, 0x01, 0xFF, 0xFF, 0x00];
        block.extend_from_slice(b"abc");
        assert_eq!(unpad_pkcs1(&block).unwrap(), b"abc");

        let block = vec![0x00, 0x02, 0x13, 0x37, 0x00, 0x42];
        assert_eq!(unpad_pkcs1(&block).unwrap(), vec![0x42]);

        assert!(unpad_pkcs1(&[0x00, 0x01, 0xFF, 0x17, 0x00]).is_err());
        assert!(unpad_pkcs1(&[0x01, 0x01, 0x00]).is_err());
        assert!(unpad_pkcs1(&[0x00, 0x03, 0x00]).is_err());
    }

    #[test]
    fn test_block_size_from_modulus() {
        assert_eq!(test_key_2048().public.block_size(), 256);
        assert_eq!(test_key_512().public.block_size(), 64);
        assert!(RsaKey::new(&[0xFF; 4], 65537).is_err());
    }

    #[test]
    fn test_single_block_roundtrip() {
        let pair = test_key_2048();
        let block = pair.encrypt_block(b"hello block");
        assert_eq!(block.len(), 256);
        assert_eq!(pair.public.decrypt_block(&block).unwrap(), b"hello block");
    }

    #[test]
    fn test_cache_idempotence() -> crate::Result<()> {
        let pair = test_key_2048();
        let payload: Vec<u8> = (0..200u8).collect();
        let data = rsa_encrypt_stream(&pair, &payload, 200);
        let source = BlockSource::new(pair.public.clone(), data)?;

        let first = source.block(0)?;
        let decryptions = source.decryptions();
        let second = source.block(0)?;
        assert_eq!(first, second);
        assert_eq!(source.decryptions(), decryptions);
        assert_eq!(&first[..], &source.decrypt_uncached(0)?[..]);
        Ok(())
    }

    #[test]
    fn test_stream_reads_across_blocks() -> crate::Result<()> {
        let pair: &TestKeyPair = test_key_512();
        let payload: Vec<u8> = (0..500u32).map(|i| (i * 7 % 251) as u8).collect();
        // 40 byte chunks force many block boundaries
        let data = rsa_encrypt_stream(pair, &payload, 40);
        let source = Arc::new(BlockSource::new(pair.public.clone(), data)?);
        assert_eq!(source.payload_len(), 500);

        let mut stream = BlockStream::new(source.clone());
        let mut all = Vec::new();
        stream.read_to_end(&mut all)?;
        assert_eq!(all, payload);

        stream.seek(SeekFrom::Start(333))?;
        let mut buf = [0u8; 50];
        stream.read_exact(&mut buf)?;
        assert_eq!(&buf[..], &payload[333..383]);

        // backward seek to the start hits the cache
        let before = source.decryptions();
        stream.seek(SeekFrom::Start(0))?;
        stream.read_exact(&mut buf)?;
        assert_eq!(&buf[..], &payload[..50]);
        assert_eq!(stream.length_header()?, 500);
        assert_eq!(source.decryptions(), before);
        Ok(())
    }

    #[test]
    fn test_rejects_partial_blocks() {
        let pair = test_key_512();
        let data: Arc<[u8]> = Arc::from(vec![0u8; 65]);
        assert!(matches!(
            BlockSource::new(pair.public.clone(), data),
            Err(Error::Crypto(_))
        ));
    }
}
