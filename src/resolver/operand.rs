//! Operand records of the resolver stream.
//!
//! Every reference operand of a virtual instruction is a position into the
//! resolver stream, where a record starts with a one-byte discriminator followed
//! by positional fields. Records reference each other by position: a field record
//! names its declaring type by the position of a type record, a method record its
//! declaring, return and parameter types.
//!
//! Type, field and method records also carry the original metadata token as a
//! hint. Builds differ in where the hint sits; see [`OperandLayout`].

use std::io::{Read, Seek};

use bitflags::bitflags;

use crate::{decoder::PrimitiveReader, metadata::Token, vm::OperandLayout, Result};

bitflags! {
    /// Flags of a method record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodRecordFlags: u8 {
        /// Static method
        const STATIC = 0x01;
        /// Called through virtual dispatch
        const VIRTUAL = 0x02;
    }
}

/// Record discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum RecordKind {
    /// Direct metadata token
    Token,
    /// Type description
    Type,
    /// Field description
    Field,
    /// Method description
    Method,
    /// Packed call of a method record
    EazCall,
    /// String literal
    UserString,
}

impl RecordKind {
    /// Decodes a discriminator byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown discriminator.
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => RecordKind::Token,
            1 => RecordKind::Type,
            2 => RecordKind::Field,
            3 => RecordKind::Method,
            4 => RecordKind::EazCall,
            5 => RecordKind::UserString,
            _ => return Err(malformed_error!("Unknown operand record kind {}", code)),
        })
    }

    /// Returns the discriminator byte.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Index of a generic parameter named by a type record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericParamRef {
    /// Parameter index
    pub index: u32,
    /// Parameter of the method rather than of the declaring type
    pub on_method: bool,
}

/// A type record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    /// Assembly-qualified type name with modifiers
    pub name: String,
    /// Positions of generic arguments
    pub generic_args: Vec<i32>,
    /// Set when the record stands for a generic parameter
    pub generic_param: Option<GenericParamRef>,
    /// Token hint
    pub token: Option<Token>,
}

/// A field record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    /// Position of the declaring type
    pub declaring: i32,
    /// Field name
    pub name: String,
    /// Token hint
    pub token: Option<Token>,
}

/// A method record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    /// Position of the declaring type
    pub declaring: i32,
    /// Method name
    pub name: String,
    /// Static and virtual flags
    pub flags: MethodRecordFlags,
    /// Position of the return type
    pub return_type: i32,
    /// Positions of the parameter types
    pub params: Vec<i32>,
    /// Positions of the method generic arguments
    pub generic_args: Vec<i32>,
    /// Token hint
    pub token: Option<Token>,
}

impl MethodRecord {
    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodRecordFlags::STATIC)
    }

    /// Returns `true` for virtually dispatched calls.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodRecordFlags::VIRTUAL)
    }
}

/// An inlined call: a method position packed with dispatch flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EazCallRecord {
    /// Position of the method record
    pub method: i32,
    /// Positions of method generic arguments
    pub generic_args: Vec<i32>,
    /// Called through virtual dispatch
    pub virtual_call: bool,
}

impl EazCallRecord {
    /// Bits of the packed value holding the method position.
    pub const POSITION_MASK: u32 = 0x3FFF_FFFF;
    /// Bit announcing a generic argument list.
    pub const GENERIC_FLAG: u32 = 0x4000_0000;
    /// Bit requesting virtual dispatch.
    pub const VIRTUAL_FLAG: u32 = 0x8000_0000;

    /// Packs position and flags, the inverse of reading the leading `i32`.
    #[must_use]
    pub fn packed(&self) -> u32 {
        let mut packed = (self.method as u32) & Self::POSITION_MASK;
        if !self.generic_args.is_empty() {
            packed |= Self::GENERIC_FLAG;
        }
        if self.virtual_call {
            packed |= Self::VIRTUAL_FLAG;
        }
        packed
    }
}

/// One decoded operand record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandRecord {
    /// Metadata token valid in the destination module
    Token(Token),
    /// Type description
    Type(TypeRecord),
    /// Field description
    Field(FieldRecord),
    /// Method description
    Method(MethodRecord),
    /// Inlined call
    EazCall(EazCallRecord),
    /// String literal
    UserString(String),
}

fn read_hint<R: Read + Seek>(reader: &mut PrimitiveReader<R>) -> Result<Option<Token>> {
    let raw = reader.read_i32()?;
    Ok((raw != 0).then(|| Token(raw as u32)))
}

impl OperandRecord {
    /// Reads the record at the reader's current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown discriminator or
    /// invalid counts, or an I/O error if the stream ends inside the record.
    pub fn read<R: Read + Seek>(
        reader: &mut PrimitiveReader<R>,
        layout: OperandLayout,
    ) -> Result<Self> {
        let kind = RecordKind::from_code(reader.read_u8()?)?;
        let hint_first = layout == OperandLayout::TokenFirst;

        let record = match kind {
            RecordKind::Token => OperandRecord::Token(Token(reader.read_i32()? as u32)),
            RecordKind::UserString => OperandRecord::UserString(reader.read_string()?),
            RecordKind::EazCall => {
                let packed = reader.read_u32()?;
                let generic_args = if packed & EazCallRecord::GENERIC_FLAG != 0 {
                    reader.read_i32_list()?
                } else {
                    Vec::new()
                };
                OperandRecord::EazCall(EazCallRecord {
                    method: (packed & EazCallRecord::POSITION_MASK) as i32,
                    generic_args,
                    virtual_call: packed & EazCallRecord::VIRTUAL_FLAG != 0,
                })
            }
            RecordKind::Type => {
                let leading = if hint_first { read_hint(reader)? } else { None };
                let name = reader.read_string()?;
                let generic_args = reader.read_i32_list()?;
                let is_param = reader.read_bool()?;
                let index = reader.read_i32()?;
                let on_method = reader.read_bool()?;
                let token = if hint_first { leading } else { read_hint(reader)? };

                let generic_param = if is_param {
                    let index = u32::try_from(index).map_err(|_| {
                        malformed_error!("Negative generic parameter index {}", index)
                    })?;
                    Some(GenericParamRef { index, on_method })
                } else {
                    None
                };
                OperandRecord::Type(TypeRecord {
                    name,
                    generic_args,
                    generic_param,
                    token,
                })
            }
            RecordKind::Field => {
                let leading = if hint_first { read_hint(reader)? } else { None };
                let declaring = reader.read_i32()?;
                let name = reader.read_string()?;
                let token = if hint_first { leading } else { read_hint(reader)? };
                OperandRecord::Field(FieldRecord {
                    declaring,
                    name,
                    token,
                })
            }
            RecordKind::Method => {
                let leading = if hint_first { read_hint(reader)? } else { None };
                let declaring = reader.read_i32()?;
                let name = reader.read_string()?;
                let flags = MethodRecordFlags::from_bits_truncate(reader.read_u8()?);
                let return_type = reader.read_i32()?;
                let params = reader.read_i32_list()?;
                let generic_args = reader.read_i32_list()?;
                let token = if hint_first { leading } else { read_hint(reader)? };
                OperandRecord::Method(MethodRecord {
                    declaring,
                    name,
                    flags,
                    return_type,
                    params,
                    generic_args,
                    token,
                })
            }
        };
        Ok(record)
    }

    /// Returns the discriminator of the record.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            OperandRecord::Token(_) => RecordKind::Token,
            OperandRecord::Type(_) => RecordKind::Type,
            OperandRecord::Field(_) => RecordKind::Field,
            OperandRecord::Method(_) => RecordKind::Method,
            OperandRecord::EazCall(_) => RecordKind::EazCall,
            OperandRecord::UserString(_) => RecordKind::UserString,
        }
    }

    /// Returns the token hint of a type, field or method record.
    #[must_use]
    pub fn token_hint(&self) -> Option<Token> {
        match self {
            OperandRecord::Type(r) => r.token,
            OperandRecord::Field(r) => r.token,
            OperandRecord::Method(r) => r.token,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, sync::Arc};

    use super::*;
    use crate::{
        decoder::{PermutationProfile, ScrambledProfiles},
        test::{protected::RecordWriter, streams::ScrambledWriter},
    };

    fn profiles() -> Arc<ScrambledProfiles> {
        let general =
            PermutationProfile::from_orders(&[1, 0], &[2, 0, 3, 1], &[7, 6, 5, 4, 3, 2, 1, 0])
                .unwrap();
        Arc::new(ScrambledProfiles::new(general, PermutationProfile::identity()))
    }

    fn read_back(
        bytes: Vec<u8>,
        profiles: Arc<ScrambledProfiles>,
        layout: OperandLayout,
    ) -> OperandRecord {
        let mut reader = PrimitiveReader::new(Cursor::new(bytes), profiles);
        OperandRecord::read(&mut reader, layout).unwrap()
    }

    #[test]
    fn test_method_record_both_layouts() {
        let record = OperandRecord::Method(MethodRecord {
            declaring: 10,
            name: "Invoke".to_string(),
            flags: MethodRecordFlags::VIRTUAL,
            return_type: 20,
            params: vec![30, 40],
            generic_args: vec![],
            token: Some(Token(0x0A00_0003)),
        });
        for layout in [OperandLayout::TokenFirst, OperandLayout::DescriptionFirst] {
            let profiles = profiles();
            let mut writer = RecordWriter::new(ScrambledWriter::new(profiles.clone()), layout);
            writer.write(&record);
            let decoded = read_back(writer.into_bytes(), profiles, layout);
            assert_eq!(decoded, record);
            assert_eq!(decoded.token_hint(), Some(Token(0x0A00_0003)));
        }
    }

    #[test]
    fn test_layout_mismatch_changes_fields() {
        let record = OperandRecord::Field(FieldRecord {
            declaring: 4,
            name: "x".to_string(),
            token: Some(Token(0x0400_0001)),
        });
        let profiles = profiles();
        let mut writer =
            RecordWriter::new(ScrambledWriter::new(profiles.clone()), OperandLayout::TokenFirst);
        writer.write(&record);
        let mut reader = PrimitiveReader::new(Cursor::new(writer.into_bytes()), profiles);
        let decoded = OperandRecord::read(&mut reader, OperandLayout::DescriptionFirst);
        assert_ne!(decoded.ok(), Some(record));
    }

    #[test]
    fn test_eazcall_packing() {
        let call = EazCallRecord {
            method: 0x1234,
            generic_args: vec![7],
            virtual_call: true,
        };
        assert_eq!(call.packed(), 0xC000_1234);

        let profiles = profiles();
        let mut writer =
            RecordWriter::new(ScrambledWriter::new(profiles.clone()), OperandLayout::TokenFirst);
        writer.write(&OperandRecord::EazCall(call.clone()));
        let decoded = read_back(writer.into_bytes(), profiles, OperandLayout::TokenFirst);
        assert_eq!(decoded, OperandRecord::EazCall(call));
    }

    #[test]
    fn test_generic_parameter_record() {
        let record = OperandRecord::Type(TypeRecord {
            name: "T".to_string(),
            generic_args: vec![],
            generic_param: Some(GenericParamRef {
                index: 1,
                on_method: true,
            }),
            token: None,
        });
        let profiles = profiles();
        let mut writer = RecordWriter::new(
            ScrambledWriter::new(profiles.clone()),
            OperandLayout::DescriptionFirst,
        );
        writer.write(&record);
        let decoded = read_back(writer.into_bytes(), profiles, OperandLayout::DescriptionFirst);
        assert_eq!(decoded, record);

    }

    #[test]
    fn test_unknown_discriminator() {
        let mut reader = PrimitiveReader::new(Cursor::new(vec![9u8, 0, 0, 0, 0]), profiles());
        assert!(matches!(
            OperandRecord::read(&mut reader, OperandLayout::TokenFirst),
            Err(crate::Error::Malformed { .. })
        ));
        assert_eq!(RecordKind::from_code(4).unwrap(), RecordKind::EazCall);
        assert_eq!(RecordKind::UserString.code(), 5);
    }
}
