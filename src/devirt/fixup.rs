//! Rewriting virtual offsets into instruction labels.

use log::debug;

use crate::{
    assembly::{ExceptionHandler, ExceptionHandlerFlags, Label, Operand},
    devirt::{decode::DecodedBody, method::RawExceptionHandler},
    resolver::Resolver,
    Error, Result,
};

/// Rewrites every raw branch of `body` to labels.
///
/// A target that matches no emitted instruction is an error for a fully decoded
/// body. In a degraded body such targets most likely point past the stop, and
/// are sent to the placeholder instead.
///
/// # Errors
/// Returns [`Error::Malformed`] for a dangling target in a fully decoded body.
pub fn fix_branches(body: &mut DecodedBody) -> Result<()> {
    let count = body.instructions.len();
    let fallback = body.placeholder_index();

    let mut rewritten = Vec::with_capacity(body.branches.len());
    for branch in &body.branches {
        let labels = branch
            .targets
            .iter()
            .map(|&target| match body.index_of(target).filter(|&index| index < count) {
                Some(index) => Ok(Label(index)),
                None => match fallback {
                    Some(placeholder) => {
                        debug!(
                            "Branch at {} targets 0x{:x} past the stop, using placeholder",
                            branch.index, target
                        );
                        Ok(Label(placeholder))
                    }
                    None => Err(malformed_error!(
                        "Branch at {} targets virtual offset 0x{:x} outside any instruction",
                        branch.index,
                        target
                    )),
                },
            })
            .collect::<Result<Vec<_>>>()?;

        let operand = if branch.switch {
            Operand::Switch(labels)
        } else {
            match labels.first() {
                Some(label) => Operand::Target(*label),
                None => return Err(malformed_error!("Branch at {} has no target", branch.index)),
            }
        };
        rewritten.push((branch.index, operand));
    }

    for (index, operand) in rewritten {
        let instruction = body
            .instructions
            .get_mut(index)
            .ok_or_else(|| malformed_error!("Branch index {} out of range", index))?;
        instruction.operand = operand;
    }
    Ok(())
}

/// Maps raw exception handler records onto the instructions of `body`.
///
/// Offsets equal to the code length map to the end label. Typed clauses resolve
/// their caught type through `resolver`.
///
/// # Errors
/// Returns [`Error::Malformed`] for offsets that fall between instructions or
/// unknown handler kinds, and [`Error::Resolution`] for caught types that do not
/// resolve.
pub fn fix_exception_handlers(
    raw: &[RawExceptionHandler],
    body: &DecodedBody,
    resolver: &Resolver<'_>,
) -> Result<Vec<ExceptionHandler>> {
    let count = body.instructions.len();
    let label = |offset: u32| -> Result<Label> {
        if offset == body.length {
            return Ok(Label(count));
        }
        body.index_of(offset)
            .map(Label)
            .ok_or_else(|| {
                malformed_error!("Handler boundary 0x{:x} is not an instruction start", offset)
            })

    };

    raw.iter()
        .map(|record| {
            let flags = record.flags()?;
            let catch_type = if flags == ExceptionHandlerFlags::EXCEPTION {
                let sig = resolver.resolve_type(record.catch_type)?.ok_or_else(|| {
                    Error::Resolution(format!(
                        "Caught type at 0x{:x} did not resolve",
                        record.catch_type
                    ))
                })?;
                Some(sig)
            } else {
                None
            };
            let filter_start = if flags == ExceptionHandlerFlags::FILTER {
                Some(label(record.filter_start)?)
            } else {
                None
            };

            Ok(ExceptionHandler {
                flags,
                try_start: label(record.try_start)?,
                try_end: label(record.try_end())?,
                handler_start: label(record.handler_start)?,
                handler_end: label(record.handler_end())?,
                filter_start,
                catch_type,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, OpCode},
        devirt::decode::{DecodeStop, RawBranch, StopReason},
        metadata::{ModuleModel, TypeRef, TypeSig},
        resolver::{OperandRecord, TypeRecord},
        test::protected::ResolverStreamBuilder,
        vm::OperandLayout,
    };

    /// Five one-byte-spaced instructions at offsets 0, 2, 4, 6, 8.
    fn body() -> DecodedBody {
        let mut body = DecodedBody {
            length: 10,
            ..DecodedBody::default()
        };
        for (index, opcode) in [OpCode::Nop, OpCode::BrS, OpCode::Switch, OpCode::Nop, OpCode::Ret]
            .into_iter()
            .enumerate()
        {
            let offset = index as u32 * 2;
            let mut instruction = Instruction::new(opcode);
            instruction.virtual_offset = Some(offset);
            body.instructions.push(instruction);
            body.offsets.insert(offset, index);
        }
        body.branches = vec![
            RawBranch { index: 1, targets: vec![8], switch: false },
            RawBranch { index: 2, targets: vec![0, 6], switch: true },
        ];
        body
    }

    #[test]
    fn test_branch_targets_become_labels() {
        let mut body = body();
        fix_branches(&mut body).unwrap();
        assert_eq!(body.instructions[1].operand, Operand::Target(Label(4)));
        assert_eq!(
            body.instructions[2].operand,
            Operand::Switch(vec![Label(0), Label(3)])
        );
        for instruction in &body.instructions {
            assert!(instruction.targets().iter().all(|l| l.0 < body.instructions.len()));
        }
    }

    #[test]
    fn test_dangling_target() {
        let mut full = body();
        full.branches[0].targets = vec![5];
        assert!(fix_branches(&mut full).is_err());

        let mut degraded = body();
        degraded.branches[0].targets = vec![40];
        degraded.instructions[4] = Instruction::placeholder(0x99, 8);
        degraded.stop = Some(DecodeStop {
            reason: StopReason::Unidentified,
            offset: 8,
            code: 0x99,
            end: 10,
        });
        fix_branches(&mut degraded).unwrap();
        assert_eq!(degraded.instructions[1].operand, Operand::Target(Label(4)));
    }

    #[test]
    fn test_exception_handler_mapping() {
        let module = ModuleModel::new("m");
        let mut builder = ResolverStreamBuilder::new(OperandLayout::TokenFirst);
        let caught = builder.push(&OperandRecord::Type(TypeRecord {
            name: "App.MyException".to_string(),
            generic_args: vec![],
            generic_param: None,
            token: None,
        }));
        let resolver = builder.resolver(&module);

        let raw = [
            RawExceptionHandler {
                kind: 0,
                catch_type: caught as i32,
                try_start: 0,
                try_length: 4,
                handler_start: 4,
                handler_length: 6,
                filter_start: 0,
            },
            RawExceptionHandler {
                kind: 1,
                catch_type: -1,
                try_start: 0,
                try_length: 2,
                handler_start: 6,
                handler_length: 2,
                filter_start: 4,
            },
        ];
        let handlers = fix_exception_handlers(&raw, &body(), &resolver).unwrap();
        assert_eq!(handlers[0].try_start, Label(0));
        assert_eq!(handlers[0].try_end, Label(2));
        assert_eq!(handlers[0].handler_start, Label(2));
        assert_eq!(handlers[0].handler_end, Label(5));
        assert_eq!(
            handlers[0].catch_type,
            Some(TypeSig::Class(TypeRef::new("App", "MyException")))
        );
        assert_eq!(handlers[1].flags, ExceptionHandlerFlags::FILTER);
        assert_eq!(handlers[1].filter_start, Some(Label(2)));
        assert_eq!(handlers[1].catch_type, None);

        let misaligned = [RawExceptionHandler { try_start: 1, ..raw[1] }];
        assert!(fix_exception_handlers(&misaligned, &body(), &resolver).is_err());

        let uncaught = [RawExceptionHandler { catch_type: -1, ..raw[0] }];
        assert!(matches!(
            fix_exception_handlers(&uncaught, &body(), &resolver),
            Err(Error::Resolution(_))
        ));
    }
}
