//! Reading scrambled primitives from a decrypted program stream.

use std::{
    io::{self, Read, Seek, SeekFrom},
    sync::Arc,
};

use crate::{
    decoder::permutation::{PermutationProfile, ProfileKind, ScrambledProfiles},
    Error, Result,
};

/// Upper bound for a single string record.
pub const MAX_STRING_LEN: usize = 1 << 20;

/// A .NET `System.Decimal` as its four 32-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decimal {
    /// Low 32 bits of the 96-bit integer
    pub lo: i32,
    /// Middle 32 bits
    pub mid: i32,
    /// High 32 bits
    pub hi: i32,
    /// Scale in bits 16..23, sign in bit 31
    pub flags: i32,
}

impl Decimal {
    /// Returns the scale (power of ten divisor).
    #[must_use]
    pub fn scale(&self) -> u8 {
        ((self.flags >> 16) & 0xFF) as u8
    }

    /// Returns `true` if the sign bit is set.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.flags < 0
    }
}

fn map_io(error: io::Error) -> Error {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        out_of_bounds_error!()
    } else {
        Error::Io(error)
    }
}

/// Reads primitives through the active permutation profile.
///
/// The reader holds both profiles of a target; [`PrimitiveReader::set_profile`]
/// switches between header and instruction reads of the same stream.
///
/// # Examples
///
/// ```rust
/// use std::{io::Cursor, sync::Arc};
/// use eazdevirt::decoder::{PermutationProfile, PrimitiveReader, ScrambledProfiles};
///
/// let general = PermutationProfile::from_orders(&[1, 0], &[2, 0, 3, 1], &[0, 1, 2, 3, 4, 5, 6, 7])?;
/// let profiles = Arc::new(ScrambledProfiles::new(general, PermutationProfile::identity()));
///
/// let mut reader = PrimitiveReader::new(Cursor::new(vec![0x34, 0x78, 0x12, 0x56]), profiles);
/// assert_eq!(reader.read_u32()?, 0x1234_5678);
/// # Ok::<(), eazdevirt::Error>(())
/// ```
#[derive(Debug)]
pub struct PrimitiveReader<R> {
    inner: R,
    profiles: Arc<ScrambledProfiles>,
    active: ProfileKind,
}

impl<R: Read + Seek> PrimitiveReader<R> {
    /// Creates a reader using the general profile.
    pub fn new(inner: R, profiles: Arc<ScrambledProfiles>) -> Self {
        PrimitiveReader {
            inner,
            profiles,
            active: ProfileKind::General,
        }
    }

    /// Switches the active profile.
    pub fn set_profile(&mut self, kind: ProfileKind) {
        self.active = kind;
    }

    /// Returns the active profile kind.
    #[must_use]
    pub fn profile_kind(&self) -> ProfileKind {
        self.active
    }

    /// Returns the profiles.
    #[must_use]
    pub fn profiles(&self) -> &Arc<ScrambledProfiles> {
        &self.profiles
    }

    fn profile(&self) -> &PermutationProfile {
        self.profiles.get(self.active)
    }

    /// Returns the underlying stream.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consumes the reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Returns the stream position.
    ///
    /// # Errors
    /// Returns an error if the underlying stream cannot report its position.
    pub fn position(&mut self) -> Result<u64> {
        self.inner.stream_position().map_err(Error::Io)
    }

    /// Seeks to an absolute stream position.
    ///
    /// # Errors
    /// Returns an error if the underlying stream cannot seek.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position)).map_err(Error::Io)?;
        Ok(())
    }

    /// Skips `count` bytes.
    ///
    /// # Errors
    /// Returns an error if the underlying stream cannot seek.
    pub fn skip(&mut self, count: u64) -> Result<()> {
        let delta = i64::try_from(count).map_err(|_| out_of_bounds_error!())?;
        self.inner.seek(SeekFrom::Current(delta)).map_err(Error::Io)?;
        Ok(())
    }

    /// Reads `count` raw bytes.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        (&mut self.inner)
            .take(count as u64)
            .read_to_end(&mut buffer)
            .map_err(map_io)?;
        if buffer.len() < count {
            return Err(out_of_bounds_error!());
        }
        Ok(buffer)
    }

    fn read_scrambled(&mut self, width: usize) -> Result<[u8; 8]> {
        let mut raw = [0u8; 8];
        self.inner.read_exact(&mut raw[..width]).map_err(map_io)?;
        match self.profile().for_width(width) {
            Some(permutation) => Ok(permutation.unscramble(&raw)),
            None => Err(malformed_error!("No permutation for width {}", width)),
        }
    }

    /// Reads one byte.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.inner.read_exact(&mut byte).map_err(map_io)?;
        Ok(byte[0])
    }

    /// Reads a signed byte.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a boolean (any non-zero byte is `true`).
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_u16(&mut self) -> Result<u16> {
        let le = self.read_scrambled(2)?;
        Ok(u16::from_le_bytes([le[0], le[1]]))
    }

    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_u32(&mut self) -> Result<u32> {
        let le = self.read_scrambled(4)?;
        Ok(u32::from_le_bytes([le[0], le[1], le[2], le[3]]))
    }

    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_scrambled(8)?))
    }

    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads a 32-bit float through the 4-byte permutation.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads a 64-bit float through the 8-byte permutation.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Reads a 16-byte decimal as four scrambled 32-bit integers.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] at end of stream.
    pub fn read_decimal(&mut self) -> Result<Decimal> {
        Ok(Decimal {
            lo: self.read_i32()?,
            mid: self.read_i32()?,
            hi: self.read_i32()?,
            flags: self.read_i32()?,
        })
    }

    /// Reads a 7-bit encoded unsigned integer of at most five bytes.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the encoding runs past five bytes.
    pub fn read_7bit_encoded(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(malformed_error!("7-bit encoded integer exceeds five bytes"))
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for oversized or invalid strings.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_7bit_encoded()? as usize;
        if len > MAX_STRING_LEN {
            return Err(malformed_error!("String length {} exceeds limit", len));
        }
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| malformed_error!("Invalid UTF-8 string - {}", e))
    }

    /// Reads an `i32` count followed by that many `i32` values.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a negative or oversized count.
    pub fn read_i32_list(&mut self) -> Result<Vec<i32>> {
        let count = self.read_count()?;
        (0..count).map(|_| self.read_i32()).collect()
    }

    /// Reads a non-negative `i32` element count.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a negative or oversized count.
    pub fn read_count(&mut self) -> Result<usize> {
        let count = self.read_i32()?;
        match usize::try_from(count) {
            Ok(count) if count <= MAX_STRING_LEN => Ok(count),
            _ => Err(malformed_error!("Invalid element count {}", count)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::streams::ScrambledWriter;
    use std::io::Cursor;

    fn profiles() -> Arc<ScrambledProfiles> {
        Arc::new(ScrambledProfiles::new(
            PermutationProfile::from_orders(&[1, 0], &[2, 0, 3, 1], &[7, 6, 5, 4, 0, 1, 2, 3])
                .unwrap(),
            PermutationProfile::from_orders(&[1, 0], &[3, 2, 1, 0], &[1, 0, 3, 2, 5, 4, 7, 6])
                .unwrap(),
        ))
    }

    #[test]
    fn test_reads_every_primitive() {
        let profiles = profiles();
        let mut writer = ScrambledWriter::new(profiles.clone());
        writer.write_u8(0xAB);
        writer.write_bool(true);
        writer.write_i16(-2);
        writer.write_i32(-123_456);
        writer.write_i64(0x0102_0304_0506_0708);
        writer.write_f32(1.5);
        writer.write_f64(-2.25);
        writer.write_decimal(Decimal { lo: 12345, mid: 0, hi: 0, flags: 2 << 16 });
        writer.write_string("Fööbar");
        writer.write_i32_list(&[1, -1, 7]);

        let mut reader = PrimitiveReader::new(Cursor::new(writer.into_bytes()), profiles);
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_i32().unwrap(), -123_456);
        assert_eq!(reader.read_i64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_f64().unwrap(), -2.25);
        let decimal = reader.read_decimal().unwrap();
        assert_eq!(decimal.lo, 12345);
        assert_eq!(decimal.scale(), 2);
        assert!(!decimal.is_negative());
        assert_eq!(reader.read_string().unwrap(), "Fööbar");
        assert_eq!(reader.read_i32_list().unwrap(), vec![1, -1, 7]);
        assert!(matches!(reader.read_u8(), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_profile_switch() {
        let profiles = profiles();
        let mut writer = ScrambledWriter::new(profiles.clone());
        writer.write_u32(0xCAFE_BABE);
        writer.set_profile(ProfileKind::Instruction);
        writer.write_u32(0xCAFE_BABE);

        let bytes = writer.into_bytes();
        assert_ne!(bytes[..4], bytes[4..]);

        let mut reader = PrimitiveReader::new(Cursor::new(bytes), profiles);
        assert_eq!(reader.read_u32().unwrap(), 0xCAFE_BABE);
        reader.set_profile(ProfileKind::Instruction);
        assert_eq!(reader.read_u32().unwrap(), 0xCAFE_BABE);
        assert_eq!(reader.position().unwrap(), 8);
    }

    #[test]
    fn test_7bit_limits() {
        let profiles = profiles();
        let mut reader = PrimitiveReader::new(Cursor::new(vec![0x80, 0x01]), profiles.clone());
        assert_eq!(reader.read_7bit_encoded().unwrap(), 128);

        let mut reader = PrimitiveReader::new(Cursor::new(vec![0xFF; 6]), profiles.clone());
        assert!(matches!(reader.read_7bit_encoded(), Err(Error::Malformed { .. })));

        let mut reader = PrimitiveReader::new(Cursor::new(vec![0x03, b'a']), profiles);
        assert!(matches!(reader.read_string(), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_negative_count_rejected() {
        let profiles = profiles();
        let mut writer = ScrambledWriter::new(profiles.clone());
        writer.write_i32(-1);
        let mut reader = PrimitiveReader::new(Cursor::new(writer.into_bytes()), profiles);
        assert!(reader.read_count().is_err());
    }

    #[test]
    fn test_read_bytes_past_end() {
        let mut reader = PrimitiveReader::new(Cursor::new(vec![1, 2, 3]), profiles());
        assert!(matches!(reader.read_bytes(usize::MAX), Err(Error::OutOfBounds { .. })));

        let mut reader = PrimitiveReader::new(Cursor::new(vec![1, 2, 3]), profiles());
        assert_eq!(reader.read_bytes(2).unwrap(), vec![1, 2]);
    }
}
