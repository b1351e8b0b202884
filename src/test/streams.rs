//! Writers producing scrambled program streams for tests.

use std::sync::Arc;

use crate::decoder::{Decimal, ProfileKind, ScrambledProfiles};

/// The inverse of [`crate::decoder::PrimitiveReader`].
#[derive(Debug, Clone)]
pub struct ScrambledWriter {
    buffer: Vec<u8>,
    profiles: Arc<ScrambledProfiles>,
    active: ProfileKind,
}

impl ScrambledWriter {
    pub fn new(profiles: Arc<ScrambledProfiles>) -> Self {
        ScrambledWriter {
            buffer: Vec::new(),
            profiles,
            active: ProfileKind::General,
        }
    }

    pub fn set_profile(&mut self, kind: ProfileKind) {
        self.active = kind;
    }

    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn write_scrambled(&mut self, le: &[u8]) {
        let permutation = self.profiles.get(self.active).for_width(le.len()).unwrap();
        let scrambled = permutation.scramble(le);
        self.buffer.extend_from_slice(&scrambled);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_scrambled(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_scrambled(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_scrambled(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_scrambled(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_scrambled(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_scrambled(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    pub fn write_decimal(&mut self, value: Decimal) {
        for part in [value.lo, value.mid, value.hi, value.flags] {
            self.write_i32(part);
        }
    }

    pub fn write_7bit_encoded(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.buffer.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.buffer.push(value as u8);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_7bit_encoded(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    pub fn write_i32_list(&mut self, values: &[i32]) {
        self.write_i32(values.len() as i32);
        for &value in values {
            self.write_i32(value);
        }
    }

    /// Overwrites a previously written `u32` at `position`.
    pub fn patch_u32(&mut self, position: usize, value: u32) {
        let permutation = self.profiles.get(self.active).for_width(4).unwrap();
        let scrambled = permutation.scramble(&value.to_le_bytes());
        self.buffer[position..position + 4].copy_from_slice(&scrambled);
    }
}
