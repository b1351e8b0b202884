//! Per-build record layouts and their discovery.
//!
//! Obfuscator builds reorder the fields of the virtual method header and move the
//! token hint of operand records to the front or the back. Neither carries tags,
//! so the order is read off the interpreter's own reader methods before any
//! stream is parsed:
//!
//! - The header reader is a sequence of `call <reader>; stfld <field>` pairs. The
//!   return type of each reader gives the field's role, except that the two `Int32`
//!   fields (declaring type and return type) look alike.
//! - The header consumer loads the declaring type field right before the name
//!   field when it looks the method up with `GetMethod`, which tells the two apart.
//! - The type-record reader reads either the token hint (`Int32`) or the name
//!   (`String`) first.

use crate::{
    assembly::{Instruction, OpCode},
    metadata::{FieldRef, MetadataHost, MethodRef, Token, TypeSig},
    Result,
};

/// A field of the virtual method header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum HeaderField {
    /// Local variable types
    Locals,
    /// Parameter types with their out flags
    Parameters,
    /// Method name
    Name,
    /// Return type position
    ReturnType,
    /// Declaring type position
    DeclaringType,
    /// Reflection binding flags
    BindingFlags,
}

/// Order of the header fields in the method stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLayout {
    order: Vec<HeaderField>,
}

impl HeaderLayout {
    /// Creates a layout, which must list every field exactly once.
    ///
    /// # Errors
    /// Returns [`crate::Error::Bootstrap`] if a field is missing or repeated.
    pub fn new(order: Vec<HeaderField>) -> Result<Self> {
        use strum::IntoEnumIterator;

        for field in HeaderField::iter() {
            let count = order.iter().filter(|f| **f == field).count();
            if count != 1 {
                return Err(bootstrap_error!(
                    "Header layout lists {} {} times",
                    field,
                    count
                ));
            }
        }
        if order.len() != HeaderField::iter().count() {
            return Err(bootstrap_error!("Header layout has {} fields", order.len()));
        }
        Ok(HeaderLayout { order })
    }

    /// Fields in stream order.
    #[must_use]
    pub fn order(&self) -> &[HeaderField] {
        &self.order
    }
}

impl Default for HeaderLayout {
    fn default() -> Self {
        HeaderLayout {
            order: vec![
                HeaderField::Locals,
                HeaderField::Parameters,
                HeaderField::Name,
                HeaderField::ReturnType,
                HeaderField::DeclaringType,
                HeaderField::BindingFlags,
            ],
        }
    }
}

/// Where operand records carry their token hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum OperandLayout {
    /// Right after the discriminator
    #[default]
    TokenFirst,
    /// After the description
    DescriptionFirst,
}

/// Everything that varies between builds in the record formats.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordLayout {
    /// Method header field order
    pub header: HeaderLayout,
    /// Operand record token hint placement
    pub operand: OperandLayout,
}

/// How to obtain the [`RecordLayout`] of a target.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutSource {
    /// The layout is known in advance
    Known(RecordLayout),
    /// Discover it from the interpreter's reader methods
    Discover {
        /// Method filling the header object
        header_reader: Token,
        /// Method turning the header object into a method lookup
        header_consumer: Token,
        /// Method reading the body of a type operand record
        type_record_reader: Token,
    },
}

impl LayoutSource {
    /// Produces the layout.
    ///
    /// # Errors
    /// Returns [`crate::Error::Bootstrap`] if a reader method is missing or does
    /// not have a recognisable shape.
    pub fn resolve(&self, host: &dyn MetadataHost) -> Result<RecordLayout> {
        match self {
            LayoutSource::Known(layout) => Ok(layout.clone()),
            LayoutSource::Discover {
                header_reader,
                header_consumer,
                type_record_reader,
            } => {
                let body = |token: Token| {
                    host.method_body(token)
                        .ok_or_else(|| bootstrap_error!("Reader method {} has no body", token))
                };
                let header = discover_header_layout(
                    host,
                    &body(*header_reader)?,
                    &body(*header_consumer)?,
                )?;
                let operand = discover_operand_layout(&body(*type_record_reader)?)?;
                log::debug!(
                    "Discovered header order {:?}, operand layout {}",
                    header.order(),
                    operand
                );
                Ok(RecordLayout { header, operand })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Known(HeaderField),
    TypePosition,
}

fn same_field(a: &FieldRef, b: &FieldRef) -> bool {
    a.name == b.name && a.declaring == b.declaring
}

fn role_of(host: &dyn MetadataHost, reader: &MethodRef) -> Result<Role> {
    Ok(match &reader.sig.ret {
        TypeSig::String => Role::Known(HeaderField::Name),
        TypeSig::U1 => Role::Known(HeaderField::BindingFlags),
        TypeSig::I4 => Role::TypePosition,
        TypeSig::SzArray(_) => {
            // parameters are read together with their out flag
            let body = host.callee_body(reader).ok_or_else(|| {
                bootstrap_error!("Header array reader {} has no body", reader.name)
            })?;
            let reads_flag = body
                .iter()
                .filter_map(Instruction::method)
                .any(|callee| callee.sig.ret == TypeSig::Boolean);
            Role::Known(if reads_flag {
                HeaderField::Parameters
            } else {
                HeaderField::Locals
            })
        }
        other => {
            return Err(bootstrap_error!(
                "Header reader {} returns unexpected {}",
                reader.name,
                other
            ))
        }
    })
}

/// Recovers the header field order.
///
/// # Errors
/// Returns [`crate::Error::Bootstrap`] if the reader does not store six fields
/// with the expected reader return types, or the consumer does not reveal which
/// `Int32` field is the declaring type.
pub fn discover_header_layout(
    host: &dyn MetadataHost,
    reader_body: &[Instruction],
    consumer_body: &[Instruction],
) -> Result<HeaderLayout> {
    let mut stores: Vec<(FieldRef, Role)> = Vec::new();
    for window in reader_body.windows(2) {
        if let (Some(reader), OpCode::Stfld, Some(field)) =
            (window[0].method(), window[1].opcode, window[1].field())
        {
            if window[0].opcode.is_call() {
                stores.push((field.clone(), role_of(host, reader)?));
            }
        }
    }

    let positions: Vec<&FieldRef> = stores
        .iter()
        .filter(|(_, role)| *role == Role::TypePosition)
        .map(|(field, _)| field)
        .collect();
    if positions.len() != 2 {
        return Err(bootstrap_error!(
            "Header reader stores {} type positions, expected 2",
            positions.len()
        ));
    }
    let name_field = stores
        .iter()
        .find(|(_, role)| *role == Role::Known(HeaderField::Name))
        .map(|(field, _)| field)
        .ok_or_else(|| bootstrap_error!("Header reader stores no name"))?;

    let name_index = consumer_body
        .iter()
        .position(|i| {
            i.opcode == OpCode::Ldfld && i.field().is_some_and(|f| same_field(f, name_field))
        })

        .ok_or_else(|| bootstrap_error!("Header consumer does not load the name"))?;
    let looks_up = consumer_body[name_index..]
        .iter()
        .filter_map(Instruction::method)
        .any(|m| m.name == "GetMethod");
    if !looks_up {
        return Err(bootstrap_error!("Header consumer does not call GetMethod"));
    }
    let declaring = consumer_body[..name_index]
        .iter()
        .rev()
        .filter(|i| i.opcode == OpCode::Ldfld)
        .filter_map(Instruction::field)
        .find(|f| positions.iter().any(|p| same_field(p, f)))
        .ok_or_else(|| bootstrap_error!("Header consumer loads no type position before the name"))?;

    let order = stores
        .iter()
        .map(|(field, role)| match role {
            Role::Known(known) => *known,
            Role::TypePosition if same_field(field, declaring) => HeaderField::DeclaringType,
            Role::TypePosition => HeaderField::ReturnType,
        })
        .collect();
    HeaderLayout::new(order)
}

/// Recovers the operand record layout from the type-record reader.
///
/// # Errors
/// Returns [`crate::Error::Bootstrap`] if the reader reads neither an `Int32`
/// nor a `String`.
pub fn discover_operand_layout(body: &[Instruction]) -> Result<OperandLayout> {
    body.iter()
        .filter(|i| i.opcode.is_call())
        .filter_map(Instruction::method)
        .find_map(|m| match m.sig.ret {
            TypeSig::I4 => Some(OperandLayout::TokenFirst),
            TypeSig::String => Some(OperandLayout::DescriptionFirst),
            _ => None,
        })
        .ok_or_else(|| bootstrap_error!("Type record reader reads no token or name"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::interpreter::LayoutFixture;

    #[test]
    fn test_default_layout_is_valid() {
        let layout = HeaderLayout::default();
        assert_eq!(HeaderLayout::new(layout.order().to_vec()).unwrap(), layout);
        assert!(HeaderLayout::new(vec![HeaderField::Name]).is_err());
        let mut repeated = layout.order().to_vec();
        repeated[0] = HeaderField::Name;
        assert!(HeaderLayout::new(repeated).is_err());
    }

    #[test]
    fn test_discovers_shuffled_header() {
        let order = vec![
            HeaderField::DeclaringType,
            HeaderField::Name,
            HeaderField::BindingFlags,
            HeaderField::Parameters,
            HeaderField::ReturnType,
            HeaderField::Locals,
        ];
        let fixture = LayoutFixture::new(&order, OperandLayout::DescriptionFirst);
        let layout = fixture.source().resolve(&fixture.module).unwrap();
        assert_eq!(layout.header.order(), order.as_slice());
        assert_eq!(layout.operand, OperandLayout::DescriptionFirst);
    }

    #[test]
    fn test_discovers_default_header() {
        let order = HeaderLayout::default().order().to_vec();
        let fixture = LayoutFixture::new(&order, OperandLayout::TokenFirst);
        let layout = fixture.source().resolve(&fixture.module).unwrap();
        assert_eq!(layout, RecordLayout::default());
    }

    #[test]
    fn test_missing_reader_fails() {
        let module = crate::metadata::ModuleModel::new("m");
        let source = LayoutSource::Discover {
            header_reader: Token(0x0600_0001),
            header_consumer: Token(0x0600_0002),
            type_record_reader: Token(0x0600_0003),
        };
        assert!(matches!(source.resolve(&module), Err(crate::Error::Bootstrap(_))));
    }
}
