//! Decoding of virtual instruction streams.
//!
//! The decoder walks one method's instruction bytes, looks every virtual code up
//! in the [`OpcodeCatalog`] and reads the operand its declared type dictates.
//! Branch operands are absolute virtual offsets and stay raw until
//! [`crate::devirt::fix_branches`] has the complete offset map.
//!
//! Decoding stops at the first code it cannot turn into CIL. An unknown code
//! stops right after the code itself, since its operand width is unknown. An
//! unidentified code still has a declared operand type, so its operand is
//! consumed before stopping. Either way a placeholder instruction marks the spot
//! and nothing past it is emitted.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    io::{Cursor, Read, Seek},
};

use log::{debug, trace};

use crate::{
    assembly::{Immediate, Instruction, Label, OpCode, Operand},
    crypto::ChainKey,
    decoder::{PrimitiveReader, ProfileKind},
    devirt::password::PasswordStore,
    metadata::{Resolved, Token},
    resolver::Resolver,
    vm::{operand_form, OpcodeCatalog, OpcodeKind, Special, VirtualOperandType},
    Error, Result,
};

/// Why decoding stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StopReason {
    /// The code is not in the handler table
    UnknownCode,
    /// The code's handler was not identified
    Unidentified,
}

/// Where and why decoding of a method stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStop {
    /// Reason
    pub reason: StopReason,
    /// Virtual offset of the offending instruction
    pub offset: u32,
    /// The offending virtual code
    pub code: u32,
    /// Virtual offset right after the bytes consumed for it
    pub end: u32,
}

impl DecodeStop {
    /// Returns the error reported for this stop, if it is one.
    ///
    /// Only unknown codes desynchronize the stream; an unidentified opcode is a
    /// known gap in the catalog.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        match self.reason {
            StopReason::UnknownCode => Some(Error::StreamDesync {
                offset: self.offset,
                code: self.code,
            }),
            StopReason::Unidentified => None,
        }
    }
}

/// A branch whose targets are still virtual offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBranch {
    /// Index of the branch instruction
    pub index: usize,
    /// Absolute virtual target offsets
    pub targets: Vec<u32>,
    /// `true` for `switch` tables
    pub switch: bool,
}

/// Result of decoding one method's instructions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedBody {
    /// Emitted instructions; branch operands are unresolved until fixup
    pub instructions: Vec<Instruction>,
    /// Branches awaiting fixup
    pub branches: Vec<RawBranch>,
    /// Virtual offset to emitted instruction index
    pub offsets: BTreeMap<u32, usize>,
    /// Early stop, for degraded methods
    pub stop: Option<DecodeStop>,
    /// Declared length of the virtual instruction bytes
    pub length: u32,
    pub(crate) pending: Vec<u32>,
}

impl DecodedBody {
    /// Returns `true` if decoding stopped at a placeholder.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.stop.is_some()
    }

    /// Index of the placeholder emitted for the stop.
    #[must_use]
    pub fn placeholder_index(&self) -> Option<usize> {
        self.stop?;
        self.instructions.len().checked_sub(1)
    }

    /// Returns the emitted index of the instruction at virtual `offset`.
    #[must_use]
    pub fn index_of(&self, offset: u32) -> Option<usize> {
        self.offsets.get(&offset).copied()
    }

    fn emit(&mut self, mut instruction: Instruction, offset: u32) -> usize {
        let index = self.instructions.len();
        instruction.virtual_offset = Some(offset);
        for skipped in self.pending.drain(..) {
            self.offsets.insert(skipped, index);
        }
        self.offsets.insert(offset, index);
        self.instructions.push(instruction);
        index
    }

    fn finish(&mut self) {
        let end = self.instructions.len();
        for skipped in self.pending.drain(..) {
            self.offsets.insert(skipped, end);
        }
    }
}

enum DecodedOperand {
    Ready(Operand),
    Target(u32),
    Switch(Vec<u32>),
}

/// Decodes the instruction bytes of one method.
pub struct InstructionDecoder<'a> {
    catalog: &'a OpcodeCatalog,
    resolver: &'a Resolver<'a>,
    passwords: Option<&'a PasswordStore>,
    token: Token,
    next_ordinal: u32,
}

impl<'a> InstructionDecoder<'a> {
    /// Creates a decoder for the method `token`, with the chain-cipher layer
    /// disabled.
    #[must_use]
    pub fn new(catalog: &'a OpcodeCatalog, resolver: &'a Resolver<'a>, token: Token) -> Self {
        InstructionDecoder {
            catalog,
            resolver,
            passwords: None,
            token,
            next_ordinal: 0,
        }
    }

    /// Enables decryption of guarded ranges with `passwords`.
    #[must_use]
    pub fn with_passwords(mut self, passwords: &'a PasswordStore) -> Self {
        self.passwords = Some(passwords);
        self
    }

    /// Decodes `length` bytes of instructions at the reader's position.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] for operands that do not resolve,
    /// [`Error::Crypto`] for guarded ranges without password,
    /// [`Error::NotSupported`] for signature operands and format errors for
    /// truncated streams.
    pub fn decode<R: Read + Seek>(
        &mut self,
        reader: &mut PrimitiveReader<R>,
        length: u32,
    ) -> Result<DecodedBody> {
        reader.set_profile(ProfileKind::Instruction);
        let mut body = DecodedBody {
            length,
            ..DecodedBody::default()
        };
        let stopped = self.decode_range(reader, 0, length, &mut body)?;
        body.finish();
        if stopped {
            debug!(
                "Method {} stopped after {} instructions",
                self.token,
                body.instructions.len()
            );
        }
        Ok(body)
    }

    /// Decodes `length` bytes whose first byte has virtual offset `base`.
    /// Returns `true` if decoding stopped early.
    fn decode_range<R: Read + Seek>(
        &mut self,
        reader: &mut PrimitiveReader<R>,
        base: u32,
        length: u32,
        body: &mut DecodedBody,
    ) -> Result<bool> {
        let start = reader.position()?;
        let offset_of = |reader: &mut PrimitiveReader<R>| -> Result<u32> {
            let consumed = reader.position()? - start;
            u32::try_from(consumed)
                .ok()
                .and_then(|c| base.checked_add(c))
                .ok_or_else(|| malformed_error!("Virtual offset overflow at {}", consumed))
        };

        let check_end = |offset: u32| -> Result<bool> {
            match (offset - base).cmp(&length) {
                Ordering::Less => Ok(false),
                Ordering::Equal => Ok(true),
                Ordering::Greater => Err(malformed_error!(
                    "Instruction at 0x{:x} runs past the body end 0x{:x}",
                    offset,
                    base.saturating_add(length)
                )),
            }
        };

        loop {
            let offset = offset_of(reader)?;
            if check_end(offset)? {
                return Ok(false);
            }

            let code = u32::from(reader.read_u16()?);
            let Some(opcode) = self.catalog.get(code).copied() else {
                body.emit(Instruction::placeholder(code, offset), offset);
                body.stop = Some(DecodeStop {
                    reason: StopReason::UnknownCode,
                    offset,
                    code,
                    end: offset_of(reader)?,
                });
                return Ok(true);
            };

            match opcode.kind {
                OpcodeKind::Unidentified => {
                    skip_operand(reader, opcode.operand_type)?;
                    let end = offset_of(reader)?;
                    check_end(end)?;
                    body.emit(Instruction::placeholder(code, offset), offset);
                    body.stop = Some(DecodeStop {
                        reason: StopReason::Unidentified,
                        offset,
                        code,
                        end,
                    });
                    return Ok(true);
                }
                OpcodeKind::Special(Special::NoEffect) => {
                    skip_operand(reader, opcode.operand_type)?;
                    body.pending.push(offset);
                }
                OpcodeKind::Special(Special::EazCall) => {
                    expect_word(opcode.operand_type, code)?;
                    let position = reader.read_u32()?;
                    let (method, virtual_call) =
                        self.resolver.resolve_call(position)?.ok_or_else(|| {
                            Error::Resolution(format!(
                                "Call record at 0x{position:x} did not resolve"
                            ))
                        })?;
                    let cil = if virtual_call { OpCode::Callvirt } else { OpCode::Call };
                    let instruction = Instruction::with_operand(cil, Operand::Method(method));
                    trace!("{} 0x{:04x}: {}", self.token, offset, instruction);
                    body.emit(instruction, offset);
                }
                OpcodeKind::Special(Special::ChainBoundary) => {
                    expect_word(opcode.operand_type, code)?;
                    let size = reader.read_i32()?;
                    let size = u32::try_from(size)
                        .map_err(|_| malformed_error!("Negative guarded range length {}", size))?;
                    let data_offset = offset_of(reader)?;
                    let remaining = base.saturating_add(length).saturating_sub(data_offset);
                    if size > remaining {
                        return Err(malformed_error!(
                            "Guarded range of {} bytes at 0x{:x} exceeds the {} bytes left",
                            size,
                            data_offset,
                            remaining
                        ));
                    }
                    let plain = self.open_range(reader, size)?;

                    let mut nested =
                        PrimitiveReader::new(Cursor::new(plain), reader.profiles().clone());
                    nested.set_profile(ProfileKind::Instruction);
                    body.pending.push(offset);
                    if self.decode_range(&mut nested, data_offset, size, body)? {
                        return Ok(true);
                    }
                }
                OpcodeKind::Cil(cil) => {
                    let cil = operand_form(cil, opcode.operand_type);
                    let instruction = match self.read_operand(reader, cil, opcode.operand_type)? {
                        DecodedOperand::Ready(operand) => Instruction::with_operand(cil, operand),
                        DecodedOperand::Target(target) => {
                            body.branches.push(RawBranch {
                                index: body.instructions.len(),
                                targets: vec![target],
                                switch: false,
                            });
                            Instruction::with_operand(cil, Operand::Target(Label(0)))
                        }
                        DecodedOperand::Switch(targets) => {
                            body.branches.push(RawBranch {
                                index: body.instructions.len(),
                                targets,
                                switch: true,
                            });
                            Instruction::with_operand(cil, Operand::Switch(Vec::new()))
                        }
                    };
                    trace!("{} 0x{:04x}: {}", self.token, offset, instruction);
                    body.emit(instruction, offset);
                }
            }
        }
    }

    /// Reads and decrypts the next guarded range.
    fn open_range<R: Read + Seek>(
        &mut self,
        reader: &mut PrimitiveReader<R>,
        size: u32,
    ) -> Result<Vec<u8>> {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;

        let passwords = self.passwords.ok_or_else(|| {
            Error::Crypto(format!(
                "Method {} has a guarded range but the chain cipher is disabled",
                self.token
            ))
        })?;
        let password = passwords.get(self.token, ordinal).ok_or_else(|| {
            Error::Crypto(format!(
                "No password for guarded range {} of method {}",
                ordinal, self.token
            ))
        })?;

        let cipher = reader.read_bytes(size as usize)?;
        debug!("Decrypting guarded range {} of {} ({} bytes)", ordinal, self.token, size);
        Ok(ChainKey::for_range(password, self.token, ordinal).decrypt(&cipher))
    }

    fn read_operand<R: Read + Seek>(
        &self,
        reader: &mut PrimitiveReader<R>,
        opcode: OpCode,
        operand_type: VirtualOperandType,
    ) -> Result<DecodedOperand> {
        let slot = |index: u16| {
            if opcode.indexes_arguments() {
                Operand::Argument(index)
            } else {
                Operand::Local(index)
            }
        };

        Ok(DecodedOperand::Ready(match operand_type {
            VirtualOperandType::InlineNone => Operand::None,
            VirtualOperandType::InlineBrTarget | VirtualOperandType::ShortInlineBrTarget => {
                return Ok(DecodedOperand::Target(reader.read_u32()?));
            }
            VirtualOperandType::InlineSwitch => {
                let count = reader.read_u32()?;
                let targets = (0..count).map(|_| reader.read_u32()).collect::<Result<Vec<_>>>()?;
                return Ok(DecodedOperand::Switch(targets));
            }
            VirtualOperandType::InlineI => Operand::Immediate(Immediate::Int32(reader.read_i32()?)),
            VirtualOperandType::ShortInlineI if opcode == OpCode::LdcI4S => {
                Operand::Immediate(Immediate::Int8(reader.read_i8()?))
            }
            VirtualOperandType::ShortInlineI => {
                Operand::Immediate(Immediate::UInt8(reader.read_u8()?))
            }
            VirtualOperandType::InlineI8 => {
                Operand::Immediate(Immediate::Int64(reader.read_i64()?))
            }
            VirtualOperandType::InlineR => {
                Operand::Immediate(Immediate::Float64(reader.read_f64()?))
            }
            VirtualOperandType::ShortInlineR => {
                Operand::Immediate(Immediate::Float32(reader.read_f32()?))
            }
            VirtualOperandType::InlineVar => slot(reader.read_u16()?),
            VirtualOperandType::ShortInlineVar => slot(u16::from(reader.read_u8()?)),
            VirtualOperandType::InlineSig => {
                let position = reader.read_u32()?;
                return Err(Error::NotSupported(format!(
                    "Signature operand at 0x{position:x} of {opcode}"
                )));
            }
            VirtualOperandType::InlineString => {
                let position = reader.read_u32()?;
                match self.resolver.resolve(position)? {
                    Some(Resolved::String(value)) => Operand::String(value),
                    other => return Err(unresolved("string", position, other.as_ref())),
                }
            }
            VirtualOperandType::InlineType => {
                let position = reader.read_u32()?;
                match self.resolver.resolve_type(position as i32)? {
                    Some(sig) => Operand::Type(sig),
                    None => return Err(unresolved("type", position, None)),
                }
            }
            VirtualOperandType::InlineField => {
                let position = reader.read_u32()?;
                match self.resolver.resolve_field(position)? {
                    Some(field) => Operand::Field(field),
                    None => return Err(unresolved("field", position, None)),
                }
            }
            VirtualOperandType::InlineMethod => {
                let position = reader.read_u32()?;
                match self.resolver.resolve_method(position)? {
                    Some(method) => Operand::Method(method),
                    None => return Err(unresolved("method", position, None)),
                }
            }
            VirtualOperandType::InlineTok => {
                let position = reader.read_u32()?;
                match self.resolver.resolve(position)? {
                    Some(Resolved::String(_)) | None => {
                        return Err(unresolved("member", position, None))
                    }
                    Some(resolved) => Operand::Token(resolved),
                }
            }
        }))
    }
}

fn unresolved(what: &str, position: u32, found: Option<&Resolved>) -> Error {
    match found {
        Some(other) => Error::Resolution(format!(
            "Expected a {} at 0x{:x}, found a {}",
            what,
            position,
            other.kind_name()
        )),
        None => Error::Resolution(format!("No {what} resolves at 0x{position:x}")),
    }
}

/// Special opcodes carry a 32-bit operand.
fn expect_word(operand_type: VirtualOperandType, code: u32) -> Result<()> {
    if operand_type.width() == Some(4) {
        Ok(())
    } else {
        Err(malformed_error!(
            "Special opcode 0x{:x} declares operand {}",
            code,
            operand_type
        ))
    }
}

/// Consumes an operand of `operand_type` without interpreting it.
fn skip_operand<R: Read + Seek>(
    reader: &mut PrimitiveReader<R>,
    operand_type: VirtualOperandType,
) -> Result<()> {
    match operand_type.width() {
        Some(width) => reader.skip(width as u64),
        None => {
            let count = reader.read_u32()?;
            reader.skip(u64::from(count) * 4)
        }
    }
}
