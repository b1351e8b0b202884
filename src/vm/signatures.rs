//! The handler signature table.
//!
//! Handlers are short, template-generated methods on the interpreter type. Each
//! entry below describes one template as a [`Template`]: the instruction shape
//! plus, in order of appearance, what every call targets, which type or field
//! operands appear, and the `ldc.i4` constants used. Shapes shared by several
//! templates are told apart by those operands alone.
//!
//! Entries are listed in priority order. The window-mode chain-cipher entry comes
//! first because its handler embeds arbitrary other code; compare-and-branch
//! entries whose helpers negate a comparison come before the plain compares they
//! contain.

use crate::{
    assembly::{Instruction, OpCode},
    metadata::{FieldRef, MethodRef, TypeSig},
    pattern::{MatchContext, OpClass, Signature, Symbol},
    vm::opcode::{OpcodeKind, Special, VirtualOperandType},
};

/// One identification rule of the catalog.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// What a matching handler implements
    pub kind: OpcodeKind,
    /// The handler signature
    pub signature: Signature,
    /// Declared operand types the entry applies to; empty accepts any
    pub operand_types: Vec<VirtualOperandType>,
}

impl CatalogEntry {
    /// Creates an entry without an operand-type restriction.
    #[must_use]
    pub fn new(kind: OpcodeKind, signature: Signature) -> Self {
        CatalogEntry {
            kind,
            signature,
            operand_types: Vec::new(),
        }
    }

    /// Restricts the entry to the given declared operand types.
    #[must_use]
    pub fn for_operands(
        mut self,
        operand_types: impl IntoIterator<Item = VirtualOperandType>,
    ) -> Self {
        self.operand_types = operand_types.into_iter().collect();
        self
    }

    /// Returns `true` if the entry may classify a handler declared with `operand_type`.
    #[must_use]
    pub fn accepts(&self, operand_type: VirtualOperandType) -> bool {
        self.operand_types.is_empty() || self.operand_types.contains(&operand_type)
    }
}

/// Expected target of a `call`, `callvirt` or `newobj`.
#[derive(Debug, Clone)]
pub enum Callee {
    /// The evaluation stack push helper
    Push,
    /// The evaluation stack pop helper
    Pop,
    /// The instruction pointer setter
    Jump,
    /// A framework member, by declaring type full name and member name
    Member(&'static str, &'static str),
    /// A method of the module whose body matches the signature
    Body(Box<Signature>),
    /// Anything
    Any,
}

impl Callee {
    fn check(&self, context: &MatchContext<'_>, method: &MethodRef) -> bool {
        match self {
            Callee::Push => *method == context.anchors.push,
            Callee::Pop => *method == context.anchors.pop,
            Callee::Jump => *method == context.anchors.jump,
            Callee::Member(declaring, name) => {
                method.name == *name && declaring_name(method) == *declaring
            }
            Callee::Body(signature) => context.callee_matches(method, signature),
            Callee::Any => true,
        }
    }
}

/// Expected type operand of `castclass`, `unbox.any`, `box` and the like.
#[derive(Debug, Clone)]
pub enum TypeCheck {
    /// Exactly this signature
    Is(TypeSig),
    /// A named type, by full name
    Named(&'static str),
    /// `System.UInt16` or `System.Byte`, the two slot index widths
    SlotIndex,
}

impl TypeCheck {
    fn check(&self, sig: &TypeSig) -> bool {
        match self {
            TypeCheck::Is(expected) => sig == expected,
            TypeCheck::Named(name) => sig.full_name() == *name,
            TypeCheck::SlotIndex => matches!(sig, TypeSig::U2 | TypeSig::U1),
        }
    }
}

/// Expected field operand.
#[derive(Debug, Clone)]
pub enum FieldCheck {
    /// The local slot array
    Locals,
    /// The argument slot array
    Arguments,
    /// Any field of this type
    OfType(TypeSig),
    /// Any field
    Any,
}

impl FieldCheck {
    fn check(&self, context: &MatchContext<'_>, field: &FieldRef) -> bool {
        match self {
            FieldCheck::Locals => same_field(field, &context.anchors.locals_field),
            FieldCheck::Arguments => same_field(field, &context.anchors.arguments_field),
            FieldCheck::OfType(expected) => field.field_type.as_ref() == Some(expected),
            FieldCheck::Any => true,
        }
    }
}

/// A handler template: a whole-body shape and its operand expectations.
#[derive(Debug, Clone, Default)]
pub struct Template {
    symbols: Vec<Symbol>,
    calls: Vec<Callee>,
    types: Vec<TypeCheck>,
    fields: Vec<FieldCheck>,
    constants: Vec<i32>,
}

impl Template {
    /// Starts a template with the given shape.
    pub fn shape(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Template {
            symbols: symbols.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Expected call targets, in order.
    #[must_use]
    pub fn calls(mut self, calls: impl IntoIterator<Item = Callee>) -> Self {
        self.calls = calls.into_iter().collect();
        self
    }

    /// Expected type operands, in order.
    #[must_use]
    pub fn types(mut self, types: impl IntoIterator<Item = TypeCheck>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    /// Expected field operands, in order.
    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldCheck>) -> Self {
        self.fields = fields.into_iter().collect();
        self
    }

    /// Expected `ldc.i4` values, in order.
    #[must_use]
    pub fn constants(mut self, constants: impl IntoIterator<Item = i32>) -> Self {
        self.constants = constants.into_iter().collect();
        self
    }

    fn verify(&self, context: &MatchContext<'_>, body: &[Instruction]) -> bool {
        let mut calls = self.calls.iter();
        let mut types = self.types.iter();
        let mut fields = self.fields.iter();
        let mut constants = self.constants.iter();

        for instruction in body {
            let ok = if let Some(method) = instruction.method() {
                calls.next().is_some_and(|c| c.check(context, method))
            } else if let Some(sig) = instruction.type_sig() {
                types.next().is_some_and(|t| t.check(sig))
            } else if let Some(field) = instruction.field() {
                fields.next().is_some_and(|f| f.check(context, field))
            } else if let Some(value) = instruction.i4_constant() {
                constants.next() == Some(&value)
            } else {
                true
            };
            if !ok {
                return false;
            }
        }

        calls.next().is_none()
            && types.next().is_none()
            && fields.next().is_none()
            && constants.next().is_none()
    }

    /// Builds a whole-body signature.
    #[must_use]
    pub fn into_signature(self, name: impl Into<String>) -> Signature {
        let symbols = self.symbols.clone();
        Signature::contiguous(name, symbols)
            .with_verifier(move |context, body| self.verify(context, body))
    }
}

fn declaring_name(method: &MethodRef) -> String {
    method
        .declaring
        .type_ref()
        .map_or_else(|| method.declaring.full_name(), |r| r.full_name())
}

fn same_field(a: &FieldRef, b: &FieldRef) -> bool {
    a.name == b.name && a.declaring == b.declaring
}

use OpClass::{BranchFalse, BranchTrue, LoadArg, LoadConstI4, LoadLocal, StoreLocal};

const LA: Symbol = Symbol::Class(LoadArg);
const LL: Symbol = Symbol::Class(LoadLocal);
const SL: Symbol = Symbol::Class(StoreLocal);
const LC: Symbol = Symbol::Class(LoadConstI4);
const CALL: Symbol = Symbol::Class(OpClass::Call);
const RET: Symbol = Symbol::Op(OpCode::Ret);

const FIELD_INFO: &str = "System.Reflection.FieldInfo";
const METHOD_BASE: &str = "System.Reflection.MethodBase";
const SYSTEM_TYPE: &str = "System.Type";

fn op(opcode: OpCode) -> Symbol {
    Symbol::Op(opcode)
}

/// Signature of a helper whose body contains `opcodes` contiguously.
#[must_use]
pub fn helper_containing(opcodes: &[OpCode]) -> Signature {
    let name: Vec<String> = opcodes.iter().map(ToString::to_string).collect();
    Signature::window(name.join(" "), opcodes.iter().map(|&o| Symbol::Op(o)))
}

/// Signature of a helper that sets the instruction pointer.
#[must_use]
pub fn calls_jump() -> Signature {
    Signature::window("calls-jump", [CALL]).with_verifier(|context, window| {
        window[0]
            .method()
            .is_some_and(|method| *method == context.anchors.jump)
    })
}

/// Signature of the compact call operand decoder (`value & 0x3FFFFFFF`).
#[must_use]
pub fn masks_call_position() -> Signature {
    Signature::window("eazcall-mask", [LC, op(OpCode::And)])
        .with_verifier(|_, window| window[0].i4_constant() == Some(0x3FFF_FFFF))
}

/// Handler that pops `pops` values, passes them to a helper computing the
/// operation and optionally pushes the result.
#[must_use]
pub fn stack_helper(pops: usize, push: bool, helper_ops: &[OpCode]) -> Template {
    let mut symbols = Vec::new();
    let mut calls = Vec::new();
    for _ in 0..pops {
        symbols.extend([LA, CALL, SL]);
        calls.push(Callee::Pop);
    }
    if push {
        symbols.push(LA);
    }
    symbols.extend(std::iter::repeat(LL).take(pops));
    symbols.push(CALL);
    calls.push(Callee::Body(Box::new(helper_containing(helper_ops))));
    if push {
        symbols.push(CALL);
        calls.push(Callee::Push);
    }
    symbols.push(RET);
    Template::shape(symbols).calls(calls)
}

/// Handler that pops two values and jumps when the helper comparison holds.
#[must_use]
pub fn compare_branch(helper_ops: &[OpCode]) -> Template {
    Template::shape([
        LA, CALL, SL, LA, CALL, SL, LL, LL, CALL,
        Symbol::Class(BranchFalse),
        LA, LA, op(OpCode::UnboxAny), CALL, RET,
    ])
    .calls([
        Callee::Pop,
        Callee::Pop,
        Callee::Body(Box::new(helper_containing(helper_ops))),
        Callee::Jump,
    ])
    .types([TypeCheck::Is(TypeSig::U4)])
}

/// Handler that pops one value and jumps on its truth value.
#[must_use]
pub fn truth_branch(jump_when_true: bool) -> Template {
    // the handler skips the jump when the condition does not hold
    let skip = if jump_when_true { BranchFalse } else { BranchTrue };
    Template::shape([
        LA, CALL, CALL,
        Symbol::Class(skip),
        LA, LA, op(OpCode::UnboxAny), CALL, RET,
    ])
    .calls([Callee::Pop, Callee::Any, Callee::Jump])
    .types([TypeCheck::Is(TypeSig::U4)])
}

/// Handler that forwards its `u32`/`i32` operand to a single call.
fn operand_call(operand: TypeSig, callee: Callee) -> Template {
    Template::shape([LA, LA, op(OpCode::UnboxAny), CALL, RET])
        .calls([callee])
        .types([TypeCheck::Is(operand)])
}

/// Handler that pushes its own operand.
#[must_use]
pub fn push_constant(sig: TypeSig) -> Template {
    Template::shape([LA, LA, op(OpCode::UnboxAny), op(OpCode::Box), CALL, RET])
        .calls([Callee::Push])
        .types([TypeCheck::Is(sig.clone()), TypeCheck::Is(sig)])
}

/// Handler that pushes its operand after a cast to the named type.
fn push_cast(type_name: &'static str) -> Template {
    Template::shape([LA, LA, op(OpCode::Castclass), CALL, RET])
        .calls([Callee::Push])
        .types([TypeCheck::Named(type_name)])
}

/// Handler that pushes a slot of the locals or arguments array.
#[must_use]
pub fn load_slot(slots: FieldCheck) -> Template {
    Template::shape([
        LA, LA, op(OpCode::Ldfld), LA, op(OpCode::UnboxAny),
        op(OpCode::LdelemRef), CALL, RET,
    ])
    .fields([slots])
    .types([TypeCheck::SlotIndex])
    .calls([Callee::Push])
}

/// Handler that pops into a slot of the locals or arguments array.
#[must_use]
pub fn store_slot(slots: FieldCheck) -> Template {
    Template::shape([
        LA, op(OpCode::Ldfld), LA, op(OpCode::UnboxAny), LA, CALL,
        op(OpCode::StelemRef), RET,
    ])
    .fields([slots])
    .types([TypeCheck::SlotIndex])
    .calls([Callee::Pop])
}

/// Handler that pushes a reference to a slot of the locals or arguments array.
#[must_use]
pub fn slot_address(slots: FieldCheck) -> Template {
    Template::shape([
        LA, LA, op(OpCode::Ldfld), LA, op(OpCode::UnboxAny),
        op(OpCode::Newobj), CALL, RET,
    ])
    .fields([slots])
    .types([TypeCheck::SlotIndex])
    .calls([Callee::Any, Callee::Push])
}

/// Handler calling the method named by its operand; `flag` is 0 for `call` and
/// 1 for `callvirt`.
#[must_use]
pub fn invoke(flag: i32) -> Template {
    Template::shape([LA, LA, op(OpCode::Castclass), LC, CALL, RET])
        .types([TypeCheck::Named(METHOD_BASE)])
        .constants([flag])
        .calls([Callee::Any])
}

const BINARY: &[OpCode] = &[
    OpCode::Add, OpCode::AddOvf, OpCode::AddOvfUn,
    OpCode::Sub, OpCode::SubOvf, OpCode::SubOvfUn,
    OpCode::Mul, OpCode::MulOvf, OpCode::MulOvfUn,
    OpCode::Div, OpCode::DivUn, OpCode::Rem, OpCode::RemUn,
    OpCode::And, OpCode::Or, OpCode::Xor,
    OpCode::Shl, OpCode::Shr, OpCode::ShrUn,
    OpCode::Ceq, OpCode::Cgt, OpCode::CgtUn, OpCode::Clt, OpCode::CltUn,
    OpCode::LdelemI1, OpCode::LdelemU1, OpCode::LdelemI2, OpCode::LdelemU2,
    OpCode::LdelemI4, OpCode::LdelemU4, OpCode::LdelemI8, OpCode::LdelemI,
    OpCode::LdelemR4, OpCode::LdelemR8, OpCode::LdelemRef,
];

const UNARY: &[OpCode] = &[
    OpCode::Neg, OpCode::Not, OpCode::Ckfinite, OpCode::Ldlen, OpCode::Localloc,
    OpCode::LdindI1, OpCode::LdindU1, OpCode::LdindI2, OpCode::LdindU2,
    OpCode::LdindI4, OpCode::LdindU4, OpCode::LdindI8, OpCode::LdindI,
    OpCode::LdindR4, OpCode::LdindR8, OpCode::LdindRef,
];

const STORE_TWO: &[OpCode] = &[
    OpCode::StindRef, OpCode::StindI1, OpCode::StindI2, OpCode::StindI4,
    OpCode::StindI8, OpCode::StindR4, OpCode::StindR8, OpCode::StindI,
];

const STORE_THREE: &[OpCode] = &[
    OpCode::StelemI, OpCode::StelemI1, OpCode::StelemI2, OpCode::StelemI4,
    OpCode::StelemI8, OpCode::StelemR4, OpCode::StelemR8, OpCode::StelemRef,
    OpCode::Cpblk, OpCode::Initblk,
];

/// Compare-and-branch opcodes and the helper sequences computing their condition,
/// negated forms first.
pub const COMPARE_BRANCHES: &[(OpCode, &[OpCode])] = &[
    (OpCode::BneUn, &[OpCode::Ceq, OpCode::LdcI40, OpCode::Ceq]),
    (OpCode::Bge, &[OpCode::Clt, OpCode::LdcI40, OpCode::Ceq]),
    (OpCode::BgeUn, &[OpCode::CltUn, OpCode::LdcI40, OpCode::Ceq]),
    (OpCode::Ble, &[OpCode::Cgt, OpCode::LdcI40, OpCode::Ceq]),
    (OpCode::BleUn, &[OpCode::CgtUn, OpCode::LdcI40, OpCode::Ceq]),
    (OpCode::Beq, &[OpCode::Ceq]),
    (OpCode::Bgt, &[OpCode::Cgt]),
    (OpCode::BgtUn, &[OpCode::CgtUn]),
    (OpCode::Blt, &[OpCode::Clt]),
    (OpCode::BltUn, &[OpCode::CltUn]),
];

/// Constant-pushing opcodes and their operand type.
pub const CONSTANTS: &[(OpCode, TypeSig)] = &[
    (OpCode::LdcI4, TypeSig::I4),
    (OpCode::LdcI4S, TypeSig::I1),
    (OpCode::LdcI8, TypeSig::I8),
    (OpCode::LdcR4, TypeSig::R4),
    (OpCode::LdcR8, TypeSig::R8),
];

fn cil(opcode: OpCode, template: Template) -> CatalogEntry {
    CatalogEntry::new(OpcodeKind::Cil(opcode), template.into_signature(opcode.mnemonic()))
}

/// Returns the full identification table in priority order.
#[must_use]
pub fn catalog_entries() -> Vec<CatalogEntry> {
    let mut entries = vec![
        CatalogEntry::new(
            OpcodeKind::Special(Special::ChainBoundary),
            Signature::window("chain-boundary", [op(OpCode::Newobj)]).with_verifier(
                |context, window| {
                    window[0].method().is_some_and(|ctor| {
                        Callee::Member("System.Security.Cryptography.Rfc2898DeriveBytes", ".ctor")
                            .check(context, ctor)
                    })
                },
            ),
        )
        .for_operands([VirtualOperandType::InlineI]),
        CatalogEntry::new(
            OpcodeKind::Special(Special::NoEffect),
            Signature::contiguous("no-effect", [RET]),
        ),
        CatalogEntry::new(
            OpcodeKind::Special(Special::EazCall),
            operand_call(TypeSig::I4, Callee::Body(Box::new(masks_call_position())))
                .into_signature("eazcall"),
        )
        .for_operands([VirtualOperandType::InlineI, VirtualOperandType::InlineMethod]),
    ];

    // control flow
    entries.push(cil(OpCode::Br, operand_call(TypeSig::U4, Callee::Jump)));
    entries.push(cil(
        OpCode::Leave,
        operand_call(TypeSig::U4, Callee::Body(Box::new(calls_jump()))),
    ));
    entries.push(cil(OpCode::Brtrue, truth_branch(true)));
    entries.push(cil(OpCode::Brfalse, truth_branch(false)));
    entries.extend(
        COMPARE_BRANCHES
            .iter()
            .map(|(opcode, helper)| cil(*opcode, compare_branch(helper))),
    );
    entries.push(cil(
        OpCode::Switch,
        Template::shape([LA, LA, CALL, op(OpCode::UnboxAny), LA, op(OpCode::Castclass), CALL, RET])
            .calls([Callee::Pop, Callee::Any])
            .types([
                TypeCheck::Is(TypeSig::U4),
                TypeCheck::Is(TypeSig::SzArray(Box::new(TypeSig::U4))),
            ]),
    ));
    entries.push(cil(
        OpCode::Ret,
        Template::shape([LA, LC, op(OpCode::Stfld), RET])
            .constants([1])
            .fields([FieldCheck::OfType(TypeSig::Boolean)]),
    ));
    entries.push(cil(
        OpCode::Endfinally,
        Template::shape([LA, LA, op(OpCode::Ldfld), CALL, CALL, RET])
            .fields([FieldCheck::Any])
            .calls([
                Callee::Member("System.Collections.Generic.Stack`1", "Pop"),
                Callee::Jump,
            ]),
    ));
    entries.push(cil(
        OpCode::Throw,
        Template::shape([LA, CALL, op(OpCode::Castclass), op(OpCode::Throw)])
            .calls([Callee::Pop])
            .types([TypeCheck::Named("System.Exception")]),
    ));
    entries.push(cil(
        OpCode::Rethrow,
        Template::shape([LA, op(OpCode::Ldfld), CALL, CALL, RET])
            .fields([FieldCheck::Any])
            .calls([
                Callee::Member("System.Runtime.ExceptionServices.ExceptionDispatchInfo", "Capture"),
                Callee::Member("System.Runtime.ExceptionServices.ExceptionDispatchInfo", "Throw"),
            ]),
    ));

    // constants and stack
    entries.extend(
        CONSTANTS
            .iter()
            .map(|(opcode, sig)| cil(*opcode, push_constant(sig.clone()))),
    );
    entries.push(cil(
        OpCode::Ldnull,
        Template::shape([LA, op(OpCode::Ldnull), CALL, RET]).calls([Callee::Push]),
    ));
    entries.push(cil(OpCode::Ldstr, push_cast("System.String")));
    entries.push(cil(OpCode::Ldtoken, push_cast("System.Reflection.MemberInfo")));
    entries.push(cil(
        OpCode::Dup,
        Template::shape([LA, CALL, SL, LA, LL, CALL, LA, LL, CALL, RET])
            .calls([Callee::Pop, Callee::Push, Callee::Push]),
    ));
    entries.push(cil(
        OpCode::Pop,
        Template::shape([LA, CALL, op(OpCode::Pop), RET]).calls([Callee::Pop]),
    ));

    // locals and arguments
    entries.push(cil(OpCode::Ldloc, load_slot(FieldCheck::Locals)));
    entries.push(cil(OpCode::Ldarg, load_slot(FieldCheck::Arguments)));
    entries.push(cil(OpCode::Stloc, store_slot(FieldCheck::Locals)));
    entries.push(cil(OpCode::Starg, store_slot(FieldCheck::Arguments)));
    entries.push(cil(OpCode::Ldloca, slot_address(FieldCheck::Locals)));
    entries.push(cil(OpCode::Ldarga, slot_address(FieldCheck::Arguments)));

    // fields
    entries.push(cil(
        OpCode::Ldfld,
        Template::shape([LA, LA, op(OpCode::Castclass), LA, CALL, CALL, CALL, RET])
            .types([TypeCheck::Named(FIELD_INFO)])
            .calls([Callee::Pop, Callee::Member(FIELD_INFO, "GetValue"), Callee::Push]),
    ));
    entries.push(cil(
        OpCode::Ldsfld,
        Template::shape([LA, LA, op(OpCode::Castclass), op(OpCode::Ldnull), CALL, CALL, RET])
            .types([TypeCheck::Named(FIELD_INFO)])
            .calls([Callee::Member(FIELD_INFO, "GetValue"), Callee::Push]),
    ));
    entries.push(cil(
        OpCode::Stfld,
        Template::shape([LA, CALL, SL, LA, op(OpCode::Castclass), LA, CALL, LL, CALL, RET])
            .types([TypeCheck::Named(FIELD_INFO)])
            .calls([Callee::Pop, Callee::Pop, Callee::Member(FIELD_INFO, "SetValue")]),
    ));
    entries.push(cil(
        OpCode::Stsfld,
        Template::shape([LA, op(OpCode::Castclass), op(OpCode::Ldnull), LA, CALL, CALL, RET])
            .types([TypeCheck::Named(FIELD_INFO)])
            .calls([Callee::Pop, Callee::Member(FIELD_INFO, "SetValue")]),
    ));

    // calls
    entries.push(cil(OpCode::Call, invoke(0)));
    entries.push(cil(OpCode::Callvirt, invoke(1)));
    entries.push(cil(
        OpCode::Newobj,
        Template::shape([LA, LA, op(OpCode::Castclass), CALL, RET])
            .types([TypeCheck::Named("System.Reflection.ConstructorInfo")])
            .calls([Callee::Any]),
    ));
    entries.push(cil(
        OpCode::Ldftn,
        Template::shape([LA, LA, op(OpCode::Castclass), CALL, op(OpCode::Box), CALL, RET])
            .types([
                TypeCheck::Named(METHOD_BASE),
                TypeCheck::Named("System.RuntimeMethodHandle"),
            ])
            .calls([Callee::Member(METHOD_BASE, "get_MethodHandle"), Callee::Push]),
    ));

    // types
    entries.push(cil(
        OpCode::Newarr,
        Template::shape([
            LA,
            LA,
            op(OpCode::Castclass),
            LA,
            CALL,
            op(OpCode::UnboxAny),
            CALL,
            CALL,
            RET,
        ])
        .types([TypeCheck::Named(SYSTEM_TYPE), TypeCheck::Is(TypeSig::I4)])
        .calls([
            Callee::Pop,
            Callee::Member("System.Array", "CreateInstance"),
            Callee::Push,
        ]),
    ));
    entries.push(cil(
        OpCode::Castclass,
        Template::shape([
            LA, CALL, SL, LA, op(OpCode::Castclass), LL, CALL, Symbol::Class(BranchTrue),
            op(OpCode::Newobj), op(OpCode::Throw), LA, LL, CALL, RET,
        ])
        .types([TypeCheck::Named(SYSTEM_TYPE)])
        .calls([
            Callee::Pop,
            Callee::Member(SYSTEM_TYPE, "IsInstanceOfType"),
            Callee::Member("System.InvalidCastException", ".ctor"),
            Callee::Push,
        ]),
    ));
    entries.push(cil(
        OpCode::Isinst,
        Template::shape([
            LA, CALL, SL, LA, op(OpCode::Castclass), LL, CALL, Symbol::Class(BranchTrue),
            op(OpCode::Ldnull), SL, LA, LL, CALL, RET,
        ])
        .types([TypeCheck::Named(SYSTEM_TYPE)])
        .calls([Callee::Pop, Callee::Member(SYSTEM_TYPE, "IsInstanceOfType"), Callee::Push]),
    ));
    entries.push(cil(
        OpCode::Box,
        Template::shape([LA, LA, op(OpCode::Castclass), LA, CALL, CALL, CALL, RET])
            .types([TypeCheck::Named(SYSTEM_TYPE)])
            .calls([Callee::Pop, Callee::Member("System.Convert", "ChangeType"), Callee::Push]),
    ));
    entries.push(cil(
        OpCode::UnboxAny,
        Template::shape([LA, LA, op(OpCode::Castclass), LA, CALL, CALL, CALL, CALL, RET])
            .types([TypeCheck::Named(SYSTEM_TYPE)])
            .calls([
                Callee::Pop,
                Callee::Member("System.Convert", "ChangeType"),
                Callee::Member("System.Runtime.CompilerServices.RuntimeHelpers", "GetObjectValue"),
                Callee::Push,
            ]),
    ));
    entries.push(cil(
        OpCode::Initobj,
        Template::shape([LA, CALL, LA, op(OpCode::Castclass), CALL, CALL, RET])
            .types([TypeCheck::Named(SYSTEM_TYPE)])
            .calls([
                Callee::Pop,
                Callee::Member("System.Activator", "CreateInstance"),
                Callee::Any,
            ]),

    ));
    entries.push(cil(
        OpCode::Sizeof,
        Template::shape([LA, LA, op(OpCode::Castclass), CALL, op(OpCode::Box), CALL, RET])
            .types([TypeCheck::Named(SYSTEM_TYPE), TypeCheck::Is(TypeSig::I4)])
            .calls([
                Callee::Member("System.Runtime.InteropServices.Marshal", "SizeOf"),
                Callee::Push,
            ]),
    ));

    // arithmetic, conversions, indirect and array access
    entries.extend(BINARY.iter().map(|&o| cil(o, stack_helper(2, true, &[o]))));
    entries.extend(
        UNARY
            .iter()
            .copied()
            .chain(OpCode::all().filter(|o| o.is_conversion()))
            .map(|o| cil(o, stack_helper(1, true, &[o]))),
    );
    entries.extend(STORE_TWO.iter().map(|&o| cil(o, stack_helper(2, false, &[o]))));
    entries.extend(STORE_THREE.iter().map(|&o| cil(o, stack_helper(3, false, &[o]))));

    entries
}
