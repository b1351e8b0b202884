//! The virtual opcode catalog.
//!
//! Built once per target from the interpreter's handler table: every entry pairs a
//! numeric virtual code with its declared operand type and the handler method that
//! implements it. Each handler body is classified against the signature table in
//! priority order; handlers that match nothing stay in the catalog as
//! [`OpcodeKind::Unidentified`] so their operand width remains known.
//!
//! Classification only reads the host, so it runs on the rayon thread pool when
//! requested. Lookups afterwards are plain `HashMap` reads.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::{
    metadata::{MetadataHost, Token},
    pattern::{InterpreterAnchors, MatchContext},
    vm::{
        opcode::{operand_form, OpcodeKind, VirtualOpcode, VirtualOperandType},
        signatures::{catalog_entries, CatalogEntry},
    },
    Result,
};

/// One row of the interpreter's handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerEntry {
    /// Virtual opcode code
    pub code: u32,
    /// Raw virtual operand type code (`0..=16`)
    pub operand_type: u8,
    /// Handler method
    pub handler: Token,
}

/// Mapping from virtual code to [`VirtualOpcode`].
#[derive(Debug, Clone, Default)]
pub struct OpcodeCatalog {
    opcodes: HashMap<u32, VirtualOpcode>,
}

impl OpcodeCatalog {
    /// Classifies every handler against the built-in signature table.
    ///
    /// # Errors
    /// Returns [`crate::Error::Bootstrap`] on duplicate codes or unknown operand
    /// type codes.
    pub fn build(
        host: &dyn MetadataHost,
        anchors: &InterpreterAnchors,
        handlers: &[HandlerEntry],
        parallel: bool,
    ) -> Result<Self> {
        Self::build_with(host, anchors, handlers, &catalog_entries(), parallel)
    }

    /// Classifies every handler against `entries`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Bootstrap`] on duplicate codes or unknown operand
    /// type codes.
    pub fn build_with(
        host: &dyn MetadataHost,
        anchors: &InterpreterAnchors,
        handlers: &[HandlerEntry],
        entries: &[CatalogEntry],
        parallel: bool,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(handlers.len());
        for entry in handlers {
            if !seen.insert(entry.code) {
                return Err(bootstrap_error!(
                    "Virtual opcode 0x{:x} appears twice in the handler table",
                    entry.code
                ));
            }
        }

        let context = MatchContext::new(host, anchors);
        let classify_entry = |entry: &HandlerEntry| -> Result<VirtualOpcode> {
            let operand_type = VirtualOperandType::from_code(entry.operand_type)?;
            let kind = match host.method_body(entry.handler) {
                Some(body) => classify(&context, entries, &body, operand_type),
                None => {
                    log::warn!(
                        "Handler {} of opcode 0x{:x} has no body",
                        entry.handler,
                        entry.code
                    );

                    OpcodeKind::Unidentified
                }
            };
            Ok(VirtualOpcode {
                code: entry.code,
                operand_type,
                kind,
                handler: entry.handler,
            })
        };

        let opcodes: Vec<VirtualOpcode> = if parallel {
            handlers.par_iter().map(classify_entry).collect::<Result<_>>()?
        } else {
            handlers.iter().map(classify_entry).collect::<Result<_>>()?
        };

        let catalog = Self::from_opcodes(opcodes)?;
        log::info!(
            "Identified {} of {} virtual opcodes",
            catalog.identified_count(),
            catalog.len()
        );
        for opcode in catalog.unidentified() {
            log::warn!(
                "Virtual opcode 0x{:x} ({}) handled by {} is unidentified",
                opcode.code,
                opcode.operand_type,
                opcode.handler
            );
        }
        Ok(catalog)
    }

    /// Creates a catalog from already classified opcodes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Bootstrap`] on duplicate codes.
    pub fn from_opcodes(opcodes: impl IntoIterator<Item = VirtualOpcode>) -> Result<Self> {
        let mut map = HashMap::new();
        for opcode in opcodes {
            if map.insert(opcode.code, opcode).is_some() {
                return Err(bootstrap_error!(
                    "Virtual opcode 0x{:x} appears twice in the handler table",
                    opcode.code
                ));
            }
        }
        Ok(OpcodeCatalog { opcodes: map })
    }

    /// Looks up a virtual code.
    #[must_use]
    pub fn get(&self, code: u32) -> Option<&VirtualOpcode> {
        self.opcodes.get(&code)
    }

    /// Number of virtual opcodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    /// Returns `true` for an empty catalog.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    /// Number of identified opcodes.
    #[must_use]
    pub fn identified_count(&self) -> usize {
        self.opcodes.values().filter(|o| o.is_identified()).count()
    }

    /// Unidentified opcodes, sorted by code.
    #[must_use]
    pub fn unidentified(&self) -> Vec<&VirtualOpcode> {
        let mut list: Vec<_> = self.opcodes.values().filter(|o| !o.is_identified()).collect();
        list.sort_by_key(|o| o.code);
        list
    }

    /// Iterates over all opcodes in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &VirtualOpcode> {
        self.opcodes.values()
    }
}

/// Classifies one handler body.
///
/// The first entry that accepts the declared operand type and matches the body
/// wins. A CIL match is rejected when the declared operand type does not fit any
/// encoding of that opcode; the handler then stays unidentified.
#[must_use]
pub fn classify(
    context: &MatchContext<'_>,
    entries: &[CatalogEntry],
    body: &[crate::assembly::Instruction],
    operand_type: VirtualOperandType,
) -> OpcodeKind {
    for entry in entries.iter().filter(|e| e.accepts(operand_type)) {
        if !context.matches(&entry.signature, body) {
            continue;
        }
        return match entry.kind {
            OpcodeKind::Cil(opcode) => {
                let form = operand_form(opcode, operand_type);
                if form.operand_type() == operand_type.cil() {
                    OpcodeKind::Cil(form)
                } else {
                    log::warn!(
                        "Handler matches {} but declares operand type {}",
                        entry.signature.name(),
                        operand_type
                    );
                    OpcodeKind::Unidentified
                }
            }
            kind => kind,
        };
    }
    OpcodeKind::Unidentified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        test::interpreter::{handler_body, Interpreter},
        vm::Special,
    };

    #[test]
    fn test_classifies_fixture_handlers() {
        let mut interpreter = Interpreter::new();
        let cases = [
            (OpCode::Add, VirtualOperandType::InlineNone),
            (OpCode::BneUn, VirtualOperandType::InlineBrTarget),
            (OpCode::Beq, VirtualOperandType::ShortInlineBrTarget),
            (OpCode::Ldloc, VirtualOperandType::ShortInlineVar),
            (OpCode::Starg, VirtualOperandType::InlineVar),
            (OpCode::LdcI4, VirtualOperandType::InlineI),
            (OpCode::Ldstr, VirtualOperandType::InlineString),
            (OpCode::Callvirt, VirtualOperandType::InlineMethod),
            (OpCode::Ret, VirtualOperandType::InlineNone),
            (OpCode::ConvI8, VirtualOperandType::InlineNone),
            (OpCode::StelemI4, VirtualOperandType::InlineNone),
        ];
        let handlers: Vec<HandlerEntry> = cases
            .iter()
            .enumerate()
            .map(|(i, (opcode, operand_type))| {
                let body = handler_body(&mut interpreter, *opcode);
                interpreter.handler(i as u32 + 1, *operand_type, body)
            })
            .collect();

        let (module, anchors) = interpreter.finish();
        let catalog = OpcodeCatalog::build(&module, &anchors, &handlers, false).unwrap();

        let kind = |code| catalog.get(code).unwrap().kind;
        assert_eq!(kind(1), OpcodeKind::Cil(OpCode::Add));
        assert_eq!(kind(2), OpcodeKind::Cil(OpCode::BneUn));
        assert_eq!(kind(3), OpcodeKind::Cil(OpCode::BeqS));
        assert_eq!(kind(4), OpcodeKind::Cil(OpCode::LdlocS));
        assert_eq!(kind(5), OpcodeKind::Cil(OpCode::Starg));
        assert_eq!(kind(6), OpcodeKind::Cil(OpCode::LdcI4));
        assert_eq!(kind(7), OpcodeKind::Cil(OpCode::Ldstr));
        assert_eq!(kind(8), OpcodeKind::Cil(OpCode::Callvirt));
        assert_eq!(kind(9), OpcodeKind::Cil(OpCode::Ret));
        assert_eq!(kind(10), OpcodeKind::Cil(OpCode::ConvI8));
        assert_eq!(kind(11), OpcodeKind::Cil(OpCode::StelemI4));
        assert_eq!(catalog.identified_count(), cases.len());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut interpreter = Interpreter::new();
        let handlers: Vec<HandlerEntry> = [OpCode::Sub, OpCode::Br, OpCode::Pop, OpCode::Dup]
            .iter()
            .enumerate()
            .map(|(i, opcode)| {
                let operand_type = if *opcode == OpCode::Br {
                    VirtualOperandType::InlineBrTarget
                } else {
                    VirtualOperandType::InlineNone
                };
                let body = handler_body(&mut interpreter, *opcode);
                interpreter.handler(0x100 + i as u32, operand_type, body)
            })
            .collect();
        let (module, anchors) = interpreter.finish();

        let sequential = OpcodeCatalog::build(&module, &anchors, &handlers, false).unwrap();
        let parallel = OpcodeCatalog::build(&module, &anchors, &handlers, true).unwrap();
        for opcode in sequential.iter() {
            assert_eq!(parallel.get(opcode.code), Some(opcode));
        }
        assert_eq!(parallel.identified_count(), 4);
    }

    #[test]
    fn test_specials_and_unidentified() {
        let mut interpreter = Interpreter::new();
        let eazcall = interpreter.eazcall_handler();
        let boundary = interpreter.chain_boundary_handler();
        let no_effect = vec![crate::test::cil::op(OpCode::Ret)];
        let unknown = vec![crate::test::cil::op(OpCode::Nop), crate::test::cil::op(OpCode::Ret)];
        let handlers = vec![
            interpreter.handler(1, VirtualOperandType::InlineMethod, eazcall),
            interpreter.handler(2, VirtualOperandType::InlineI, boundary),
            interpreter.handler(3, VirtualOperandType::InlineI8, no_effect),
            interpreter.handler(4, VirtualOperandType::InlineTok, unknown),
        ];
        let (module, anchors) = interpreter.finish();
        let catalog = OpcodeCatalog::build(&module, &anchors, &handlers, false).unwrap();

        assert_eq!(catalog.get(1).unwrap().special(), Some(Special::EazCall));
        assert_eq!(catalog.get(2).unwrap().special(), Some(Special::ChainBoundary));
        assert_eq!(catalog.get(3).unwrap().special(), Some(Special::NoEffect));
        let unidentified = catalog.unidentified();
        assert_eq!(unidentified.len(), 1);
        assert_eq!(unidentified[0].code, 4);
        assert_eq!(unidentified[0].operand_type.width(), Some(4));
    }

    #[test]
    fn test_mismatched_operand_type_stays_unidentified() {
        let mut interpreter = Interpreter::new();
        let body = handler_body(&mut interpreter, OpCode::Add);
        let handlers = vec![interpreter.handler(7, VirtualOperandType::InlineI, body)];
        let (module, anchors) = interpreter.finish();
        let catalog = OpcodeCatalog::build(&module, &anchors, &handlers, false).unwrap();
        assert!(!catalog.get(7).unwrap().is_identified());
    }

    #[test]
    fn test_duplicate_codes_fail() {
        let interpreter = Interpreter::new();
        let (module, anchors) = interpreter.finish();
        let entry = HandlerEntry {
            code: 1,
            operand_type: 5,
            handler: Token(0x0600_0001),
        };
        let result = OpcodeCatalog::build(&module, &anchors, &[entry, entry], false);
        assert!(matches!(result, Err(crate::Error::Bootstrap(_))));

        let bad_operand = HandlerEntry {
            operand_type: 40,
            ..entry
        };
        let result = OpcodeCatalog::build(&module, &anchors, &[bad_operand], false);
        assert!(matches!(result, Err(crate::Error::Bootstrap(_))));
    }
}
