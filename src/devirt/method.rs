//! Virtualized methods and the records read from the method stream.

use std::{
    fmt,
    io::{Read, Seek},
};

use crate::{
    assembly::{ExceptionHandlerFlags, Instruction},
    decoder::PrimitiveReader,
    metadata::{Token, TypeSig},
    utils::{base64_decode, base64_encode},
    vm::{HeaderField, HeaderLayout},
    Error, Result,
};

/// Decrypted position key of a virtualized method.
///
/// The stub of a virtualized method passes a base64 string to the interpreter.
/// Its 8 bytes are the method's stream offset and XOR counter seed, each masked
/// with the position mask found at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey {
    /// Offset of the method record in the method stream
    pub offset: u32,
    /// XOR counter seed of the method body
    pub seed: u32,
}

impl PositionKey {
    /// Decodes a key string.
    ///
    /// # Errors
    /// Returns [`Error::Crypto`] if the string is not base64 of exactly 8 bytes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use eazdevirt::devirt::PositionKey;
    ///
    /// let key = PositionKey { offset: 0x120, seed: 0xDEAD_BEEF };
    /// let text = key.encode(0x5555_AAAA);
    /// assert_eq!(PositionKey::decode(&text, 0x5555_AAAA)?, key);
    /// # Ok::<(), eazdevirt::Error>(())
    /// ```
    pub fn decode(text: &str, mask: u32) -> Result<Self> {
        let bytes = base64_decode(text)
            .ok_or_else(|| Error::Crypto(format!("Position key '{text}' is not base64")))?;
        let Ok(raw) = <[u8; 8]>::try_from(bytes.as_slice()) else {
            return Err(Error::Crypto(format!(
                "Position key '{}' decodes to {} bytes",
                text,
                bytes.len()
            )));
        };
        let offset = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) ^ mask;
        let seed = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) ^ mask;
        Ok(PositionKey { offset, seed })
    }

    /// Encodes the key with `mask`.
    #[must_use]
    pub fn encode(&self, mask: u32) -> String {
        let mut raw = Vec::with_capacity(8);
        raw.extend_from_slice(&(self.offset ^ mask).to_le_bytes());
        raw.extend_from_slice(&(self.seed ^ mask).to_le_bytes());
        base64_encode(&raw)
    }
}

/// A parameter as recorded in the method header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderParameter {
    /// Position of the parameter type
    pub type_position: i32,
    /// `out` or `ref` parameter
    pub by_ref: bool,
}

/// The method header, in record positions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodHeader {
    /// Positions of the local variable types
    pub locals: Vec<i32>,
    /// Parameters
    pub parameters: Vec<HeaderParameter>,
    /// Method name
    pub name: String,
    /// Position of the return type
    pub return_type: i32,
    /// Position of the declaring type
    pub declaring_type: i32,
    /// Reflection binding flags used to look the method up
    pub binding_flags: u8,
}

impl MethodHeader {
    /// Reads the header fields in the order of `layout`.
    ///
    /// # Errors
    /// Returns an error for truncated or malformed fields.
    pub fn read<R: Read + Seek>(
        reader: &mut PrimitiveReader<R>,
        layout: &HeaderLayout,
    ) -> Result<Self> {
        let mut header = MethodHeader::default();
        for field in layout.order() {
            match field {
                HeaderField::Locals => header.locals = reader.read_i32_list()?,
                HeaderField::Parameters => {
                    let count = reader.read_count()?;
                    header.parameters = (0..count)
                        .map(|_| {
                            Ok(HeaderParameter {
                                type_position: reader.read_i32()?,
                                by_ref: reader.read_bool()?,
                            })
                        })
                        .collect::<Result<_>>()?;
                }
                HeaderField::Name => header.name = reader.read_string()?,
                HeaderField::ReturnType => header.return_type = reader.read_i32()?,
                HeaderField::DeclaringType => header.declaring_type = reader.read_i32()?,
                HeaderField::BindingFlags => header.binding_flags = reader.read_u8()?,
            }
        }
        Ok(header)
    }

    /// Returns `true` if the binding flags select static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        // BindingFlags.Static
        self.binding_flags & 0x08 != 0
    }
}

/// An exception handler record in virtual offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawExceptionHandler {
    /// Handler kind, the values of [`ExceptionHandlerFlags`]
    pub kind: u8,
    /// Position of the caught type, negative for none
    pub catch_type: i32,
    /// Start of the protected range
    pub try_start: u32,
    /// Length of the protected range
    pub try_length: u32,
    /// Start of the handler
    pub handler_start: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Start of the filter, for filter handlers
    pub filter_start: u32,
}

impl RawExceptionHandler {
    /// Reads one record.
    ///
    /// # Errors
    /// Returns an error if the stream ends inside the record.
    pub fn read<R: Read + Seek>(reader: &mut PrimitiveReader<R>) -> Result<Self> {
        Ok(RawExceptionHandler {
            kind: reader.read_u8()?,
            catch_type: reader.read_i32()?,
            try_start: reader.read_u32()?,
            try_length: reader.read_u32()?,
            handler_start: reader.read_u32()?,
            handler_length: reader.read_u32()?,
            filter_start: reader.read_u32()?,
        })
    }

    /// Reads a counted table of records.
    ///
    /// # Errors
    /// Returns an error for an invalid count or a truncated record.
    pub fn read_table<R: Read + Seek>(reader: &mut PrimitiveReader<R>) -> Result<Vec<Self>> {
        let count = reader.read_count()?;
        (0..count).map(|_| Self::read(reader)).collect()
    }

    /// Returns the handler kind.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for an unknown kind.
    pub fn flags(&self) -> Result<ExceptionHandlerFlags> {
        ExceptionHandlerFlags::from_kind(self.kind)
            .ok_or_else(|| malformed_error!("Unknown exception handler kind {}", self.kind))
    }

    /// End of the protected range.
    #[must_use]
    pub fn try_end(&self) -> u32 {
        self.try_start.saturating_add(self.try_length)
    }

    /// End of the handler.
    #[must_use]
    pub fn handler_end(&self) -> u32 {
        self.handler_start.saturating_add(self.handler_length)
    }
}

/// How much of a method was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
pub enum RecoveryStatus {
    /// Every instruction, target and handler recovered
    #[default]
    Full,
    /// Decoding stopped at an unrecovered instruction; the body holds a
    /// placeholder
    Degraded,
    /// Nothing usable was recovered
    Unrecoverable,
}

/// A virtualized method and its decoded state.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualMethod {
    /// Stub method in the destination module
    pub token: Token,
    /// Position key string passed by the stub
    pub key: String,
    /// Decrypted position key
    pub position: Option<PositionKey>,
    /// Header as read from the stream
    pub header: Option<MethodHeader>,
    /// Resolved declaring type
    pub declaring: Option<TypeSig>,
    /// Resolved return type
    pub return_type: Option<TypeSig>,
    /// Resolved local variable types
    pub locals: Vec<TypeSig>,
    /// Resolved parameter types, by-ref parameters wrapped in [`TypeSig::ByRef`]
    pub parameters: Vec<TypeSig>,
    /// Exception handler records
    pub raw_handlers: Vec<RawExceptionHandler>,
    /// Decoded instructions
    pub instructions: Vec<Instruction>,
    /// Length of the virtual instruction bytes
    pub code_length: u32,
    /// Recovery status
    pub status: RecoveryStatus,
}

impl VirtualMethod {
    /// Creates a method that has not been read yet.
    pub fn new(token: Token, key: impl Into<String>) -> Self {
        VirtualMethod {
            token,
            key: key.into(),
            position: None,
            header: None,
            declaring: None,
            return_type: None,
            locals: Vec::new(),
            parameters: Vec::new(),
            raw_handlers: Vec::new(),
            instructions: Vec::new(),
            code_length: 0,
            status: RecoveryStatus::Full,
        }
    }

    /// Name from the header, if read.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.name.as_str())
    }
}

impl fmt::Display for VirtualMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.declaring, self.name()) {
            (Some(declaring), Some(name)) => write!(f, "{declaring}::{name} ({})", self.token),
            (None, Some(name)) => write!(f, "{name} ({})", self.token),
            _ => write!(f, "{}", self.token),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, sync::Arc};

    use super::*;
    use crate::{
        decoder::{PermutationProfile, ScrambledProfiles},
        test::streams::ScrambledWriter,
    };

    #[test]
    fn test_position_key_errors() {
        assert!(matches!(PositionKey::decode("!!", 0), Err(Error::Crypto(_))));
        assert!(matches!(
            PositionKey::decode(&base64_encode(&[1, 2, 3]), 0),
            Err(Error::Crypto(_))
        ));
        let key = PositionKey { offset: 4, seed: 9 };
        assert_ne!(PositionKey::decode(&key.encode(1), 2).unwrap(), key);
    }

    #[test]
    fn test_header_follows_layout() {
        let profiles = Arc::new(ScrambledProfiles::new(
            PermutationProfile::from_orders(&[1, 0], &[3, 2, 1, 0], &[0, 1, 2, 3, 4, 5, 6, 7])
                .unwrap(),

            PermutationProfile::identity(),
        ));
        let layout = HeaderLayout::new(vec![
            HeaderField::Name,
            HeaderField::BindingFlags,
            HeaderField::DeclaringType,
            HeaderField::Parameters,
            HeaderField::ReturnType,
            HeaderField::Locals,
        ])
        .unwrap();

        let mut writer = ScrambledWriter::new(profiles.clone());
        writer.write_string("Compute");
        writer.write_u8(0x18);
        writer.write_i32(40);
        writer.write_i32(1);
        writer.write_i32(50);
        writer.write_bool(true);
        writer.write_i32(60);
        writer.write_i32_list(&[70, 80]);

        let mut reader = PrimitiveReader::new(Cursor::new(writer.into_bytes()), profiles);
        let header = MethodHeader::read(&mut reader, &layout).unwrap();
        assert_eq!(header.name, "Compute");
        assert!(header.is_static());
        assert_eq!(header.declaring_type, 40);
        assert_eq!(
            header.parameters,
            vec![HeaderParameter {
                type_position: 50,
                by_ref: true
            }]
        );
        assert_eq!(header.return_type, 60);
        assert_eq!(header.locals, vec![70, 80]);
    }

    #[test]
    fn test_exception_handler_record() {
        let handler = RawExceptionHandler {
            kind: 2,
            catch_type: -1,
            try_start: 0,
            try_length: 10,
            handler_start: 10,
            handler_length: 4,
            filter_start: 0,
        };
        assert_eq!(handler.flags().unwrap(), ExceptionHandlerFlags::FINALLY);
        assert_eq!(handler.try_end(), 10);
        assert_eq!(handler.handler_end(), 14);
        assert!(RawExceptionHandler { kind: 3, ..handler }.flags().is_err());
    }
}
