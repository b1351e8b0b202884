//! A synthetic interpreter type: stack helpers, slot arrays, opcode handlers and
//! the reader methods used for layout discovery.

use crate::{
    assembly::{Instruction, Label, OpCode, Operand},
    metadata::{FieldRef, MethodRef, ModuleModel, Token, TypeDefInfo, TypeRef, TypeSig},
    pattern::InterpreterAnchors,
    test::cil::{
        call, callvirt, instance_method, ldc_i4, op, static_method, with_field, with_method,
        with_type,
    },
    vm::{
        operand_form, HandlerEntry, HeaderField, LayoutSource, OperandLayout, VirtualOperandType,
        COMPARE_BRANCHES, CONSTANTS,
    },
};

fn vm_type() -> TypeRef {
    TypeRef::new("Eaz", "VirtualMachine")
}

fn vm_sig() -> TypeSig {
    TypeSig::Class(vm_type())
}

fn named(namespace: &str, name: &str) -> TypeSig {
    TypeSig::Class(TypeRef::new(namespace, name))
}

fn object_array() -> TypeSig {
    TypeSig::SzArray(Box::new(TypeSig::Object))
}

/// Anchors of the interpreter built by [`Interpreter::new`].
pub fn test_anchors() -> InterpreterAnchors {
    InterpreterAnchors {
        push: instance_method(vm_sig(), "Push", TypeSig::Void, vec![TypeSig::Object]),
        pop: instance_method(vm_sig(), "Pop", TypeSig::Object, vec![]),
        jump: instance_method(vm_sig(), "Jump", TypeSig::Void, vec![TypeSig::U4]),
        locals_field: FieldRef::new(vm_sig(), "locals").with_type(object_array()),
        arguments_field: FieldRef::new(vm_sig(), "arguments").with_type(object_array()),
    }
}

/// Builder for a module containing the interpreter type.
pub struct Interpreter {
    pub module: ModuleModel,
    pub anchors: InterpreterAnchors,
    finished: FieldRef,
    exception: FieldRef,
    finally_stack: FieldRef,
    helpers: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut module = ModuleModel::new("Protected.dll");
        let anchors = test_anchors();
        module.add_type(TypeDefInfo::new(vm_type()));

        module.define_field(&vm_type(), "locals", object_array(), false);
        module.define_field(&vm_type(), "arguments", object_array(), false);
        let ip = module.define_field(&vm_type(), "ip", TypeSig::U4, false);
        let finished = module.define_field(&vm_type(), "finished", TypeSig::Boolean, false);
        let exception =
            module.define_field(&vm_type(), "exception", named("System", "Exception"), false);
        let stack = TypeSig::GenericInst {
            generic: Box::new(named("System.Collections.Generic", "Stack`1")),
            args: vec![TypeSig::U4],
        };
        let finally_stack = module.define_field(&vm_type(), "finallyTargets", stack, false);

        module.define_method(
            anchors.push.clone(),
            vec![
                op(OpCode::Ldarg0),
                op(OpCode::Ldarg1),
                op(OpCode::Pop),
                op(OpCode::Pop),
                op(OpCode::Ret),
            ],
        );
        module.define_method(anchors.pop.clone(), vec![op(OpCode::Ldnull), op(OpCode::Ret)]);
        module.define_method(
            anchors.jump.clone(),
            vec![
                op(OpCode::Ldarg0),
                op(OpCode::Ldarg1),
                with_field(OpCode::Stfld, ip),
                op(OpCode::Ret),
            ],
        );

        Interpreter {
            module,
            anchors,
            finished,
            exception,
            finally_stack,
            helpers: 0,
        }
    }

    /// Defines a method on the interpreter type.
    pub fn helper(
        &mut self,
        has_this: bool,
        ret: TypeSig,
        params: Vec<TypeSig>,
        body: Vec<Instruction>,
    ) -> MethodRef {
        self.helpers += 1;
        let name = format!("Helper{}", self.helpers);
        let method = if has_this {
            instance_method(vm_sig(), &name, ret, params)
        } else {
            static_method(vm_sig(), &name, ret, params)
        };
        self.module.define_method(method.clone(), body);
        method
    }

    /// Defines a handler method and returns its handler table row.
    pub fn handler(
        &mut self,
        code: u32,
        operand_type: VirtualOperandType,
        body: Vec<Instruction>,
    ) -> HandlerEntry {
        let name = format!("Handle{code:04X}");
        let method = instance_method(vm_sig(), &name, TypeSig::Void, vec![TypeSig::Object]);
        let handler = self.module.define_method(method, body);
        HandlerEntry {
            code,
            operand_type: operand_type.code(),
            handler,
        }
    }

    fn pop(&self) -> Instruction {
        call(self.anchors.pop.clone())
    }

    fn push(&self) -> Instruction {
        call(self.anchors.push.clone())
    }

    fn jump(&self) -> Instruction {
        call(self.anchors.jump.clone())
    }

    /// Static helper whose body loads `arity` arguments and applies `opcodes`.
    fn op_helper(&mut self, arity: usize, push: bool, opcodes: &[OpCode]) -> MethodRef {
        let loads = [OpCode::Ldarg0, OpCode::Ldarg1, OpCode::Ldarg2, OpCode::Ldarg3];
        let mut body: Vec<Instruction> = loads[..arity].iter().map(|&o| op(o)).collect();
        body.extend(opcodes.iter().map(|&o| op(o)));
        body.push(op(OpCode::Ret));
        let ret = if push { TypeSig::Object } else { TypeSig::Void };
        self.helper(false, ret, vec![TypeSig::Object; arity], body)
    }

    pub fn stack_helper_body(
        &mut self,
        pops: usize,
        push: bool,
        opcodes: &[OpCode],
    ) -> Vec<Instruction> {
        let helper = self.op_helper(pops, push, opcodes);
        let stores = [OpCode::Stloc0, OpCode::Stloc1, OpCode::Stloc2];
        let loads = [OpCode::Ldloc0, OpCode::Ldloc1, OpCode::Ldloc2];
        let mut body = Vec::new();
        for store in &stores[..pops] {
            body.extend([op(OpCode::Ldarg0), self.pop(), op(*store)]);
        }
        if push {
            body.push(op(OpCode::Ldarg0));
        }
        body.extend(loads[..pops].iter().rev().map(|&o| op(o)));
        body.push(call(helper));
        if push {
            body.push(self.push());
        }
        body.push(op(OpCode::Ret));
        body
    }

    #[rustfmt::skip]
    pub fn compare_branch_body(&mut self, opcodes: &[OpCode]) -> Vec<Instruction> {
        let helper = self.op_helper(2, true, opcodes);
        vec![
            op(OpCode::Ldarg0), self.pop(), op(OpCode::Stloc0),
            op(OpCode::Ldarg0), self.pop(), op(OpCode::Stloc1),
            op(OpCode::Ldloc1), op(OpCode::Ldloc0), call(helper),
            Instruction::with_operand(OpCode::BrfalseS, Operand::Target(Label(14))),
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), with_type(OpCode::UnboxAny, TypeSig::U4),
            self.jump(), op(OpCode::Ret),
        ]
    }

    #[rustfmt::skip]
    pub fn truth_branch_body(&mut self, jump_when_true: bool) -> Vec<Instruction> {
        let identity = vec![op(OpCode::Ldarg0), op(OpCode::Ret)];
        let is_true = self.helper(false, TypeSig::Boolean, vec![TypeSig::Object], identity);
        let skip = if jump_when_true { OpCode::BrfalseS } else { OpCode::BrtrueS };
        vec![
            op(OpCode::Ldarg0), self.pop(), call(is_true),
            Instruction::with_operand(skip, Operand::Target(Label(8))),
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), with_type(OpCode::UnboxAny, TypeSig::U4),
            self.jump(), op(OpCode::Ret),
        ]
    }

    #[rustfmt::skip]
    pub fn leave_body(&mut self) -> Vec<Instruction> {
        let body = vec![op(OpCode::Ldarg0), op(OpCode::Ldarg1), self.jump(), op(OpCode::Ret)];
        let leave = self.helper(true, TypeSig::Void, vec![TypeSig::U4], body);
        vec![
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), with_type(OpCode::UnboxAny, TypeSig::U4),
            call(leave), op(OpCode::Ret),
        ]
    }

    #[rustfmt::skip]
    pub fn eazcall_handler(&mut self) -> Vec<Instruction> {
        let body = vec![
            op(OpCode::Ldarg1), ldc_i4(0x3FFF_FFFF), op(OpCode::And), op(OpCode::Pop),
            op(OpCode::Ret),
        ];
        let decode = self.helper(true, TypeSig::Void, vec![TypeSig::I4], body);
        vec![
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), with_type(OpCode::UnboxAny, TypeSig::I4),
            call(decode), op(OpCode::Ret),
        ]
    }

    #[rustfmt::skip]
    pub fn chain_boundary_handler(&mut self) -> Vec<Instruction> {
        let derive =
            TypeSig::Class(TypeRef::new("System.Security.Cryptography", "Rfc2898DeriveBytes"));
        let ctor = instance_method(
            derive,
            ".ctor",
            TypeSig::Void,
            vec![TypeSig::String, TypeSig::SzArray(Box::new(TypeSig::U1)), TypeSig::I4],
        );
        vec![
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), with_type(OpCode::UnboxAny, TypeSig::I4),
            op(OpCode::Pop), op(OpCode::Pop), op(OpCode::Ldnull), op(OpCode::Ldnull), ldc_i4(1000),
            with_method(OpCode::Newobj, ctor), op(OpCode::Pop), op(OpCode::Ret),
        ]
    }

    #[rustfmt::skip]
    fn slot_body(&mut self, opcode: OpCode) -> Vec<Instruction> {
        let short = operand_form(opcode, VirtualOperandType::ShortInlineVar) == opcode;
        let index = with_type(OpCode::UnboxAny, if short { TypeSig::U1 } else { TypeSig::U2 });
        let long = operand_form(opcode, VirtualOperandType::InlineVar);
        let slots = match long {
            OpCode::Ldloc | OpCode::Stloc | OpCode::Ldloca => self.anchors.locals_field.clone(),
            _ => self.anchors.arguments_field.clone(),
        };
        let ldfld = with_field(OpCode::Ldfld, slots);
        match long {
            OpCode::Ldloc | OpCode::Ldarg => vec![
                op(OpCode::Ldarg0), op(OpCode::Ldarg0), ldfld, op(OpCode::Ldarg1), index,
                op(OpCode::LdelemRef), self.push(), op(OpCode::Ret),
            ],
            OpCode::Stloc | OpCode::Starg => vec![
                op(OpCode::Ldarg0), ldfld, op(OpCode::Ldarg1), index, op(OpCode::Ldarg0),
                self.pop(), op(OpCode::StelemRef), op(OpCode::Ret),
            ],
            _ => {
                let reference = instance_method(
                    named("Eaz", "SlotReference"),
                    ".ctor",
                    TypeSig::Void,
                    vec![object_array(), TypeSig::I4],
                );
                vec![
                    op(OpCode::Ldarg0), op(OpCode::Ldarg0), ldfld, op(OpCode::Ldarg1), index,
                    with_method(OpCode::Newobj, reference), self.push(), op(OpCode::Ret),
                ]
            }
        }
    }

    pub fn finish(self) -> (ModuleModel, InterpreterAnchors) {
        (self.module, self.anchors)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn bcl(
    namespace: &str,
    type_name: &str,
    name: &str,
    ret: TypeSig,
    params: Vec<TypeSig>,
    has_this: bool,
) -> MethodRef {

    let declaring = named(namespace, type_name);
    if has_this {
        instance_method(declaring, name, ret, params)
    } else {
        static_method(declaring, name, ret, params)
    }
}

fn castclass(namespace: &str, name: &str) -> Instruction {
    with_type(OpCode::Castclass, named(namespace, name))
}

#[rustfmt::skip]
const BINARY_OPS: &[OpCode] = &[
    OpCode::Add, OpCode::AddOvf, OpCode::AddOvfUn, OpCode::Sub, OpCode::SubOvf, OpCode::SubOvfUn,
    OpCode::Mul, OpCode::MulOvf, OpCode::MulOvfUn, OpCode::Div, OpCode::DivUn, OpCode::Rem,
    OpCode::RemUn, OpCode::And, OpCode::Or, OpCode::Xor, OpCode::Shl, OpCode::Shr, OpCode::ShrUn,
    OpCode::Ceq, OpCode::Cgt, OpCode::CgtUn, OpCode::Clt, OpCode::CltUn, OpCode::LdelemI4,
    OpCode::LdelemRef, OpCode::LdelemU1,
];

/// Builds a handler body implementing `opcode` in the interpreter's template.
///
/// # Panics
/// Panics for opcodes the fixture has no template for.
#[rustfmt::skip]
pub fn handler_body(
interpreter: &mut Interpreter, opcode: OpCode) -> Vec<Instruction> {
    let i = &mut *interpreter;
    if BINARY_OPS.contains(&opcode) {
        return i.stack_helper_body(2, true, &[opcode]);
    }
    let unary = matches!(opcode, OpCode::Neg | OpCode::Not | OpCode::Ldlen | OpCode::LdindI4);
    if opcode.is_conversion() || unary {
        return i.stack_helper_body(1, true, &[opcode]);
    }
    if matches!(opcode, OpCode::StindI4 | OpCode::StindRef) {
        return i.stack_helper_body(2, false, &[opcode]);
    }
    if matches!(opcode, OpCode::StelemI4 | OpCode::StelemRef) {
        return i.stack_helper_body(3, false, &[opcode]);
    }
    let long = operand_form(opcode, VirtualOperandType::InlineBrTarget);
    if let Some((_, helper)) = COMPARE_BRANCHES.iter().find(|(o, _)| *o == long) {
        return i.compare_branch_body(helper);
    }
    if let Some((_, sig)) = CONSTANTS.iter().find(|(o, _)| *o == opcode) {
        return vec![
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), with_type(OpCode::UnboxAny, sig.clone()),
            with_type(OpCode::Box, sig.clone()), i.push(), op(OpCode::Ret),
        ];
    }

    let field_info = ("System.Reflection", "FieldInfo");
    let (fi_ns, fi_name) = field_info;
    let object = || vec![TypeSig::Object];
    let get_value = || bcl(fi_ns, fi_name, "GetValue", TypeSig::Object, object(), true);
    let set_value = || {
        let params = vec![TypeSig::Object, TypeSig::Object];
        bcl(fi_ns, fi_name, "SetValue", TypeSig::Void, params, true)
    };
    let system_type = || castclass("System", "Type");
    let is_instance =
        || bcl("System", "Type", "IsInstanceOfType", TypeSig::Boolean, object(), true);
    let change_type = || {
        let params = vec![TypeSig::Object, named("System", "Type")];
        bcl("System", "Convert", "ChangeType", TypeSig::Object, params, false)
    };
    let unbox_u4 = || with_type(OpCode::UnboxAny, TypeSig::U4);

    match long {
        OpCode::Br => vec![
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), unbox_u4(), i.jump(), op(OpCode::Ret),
        ],
        OpCode::Leave => i.leave_body(),
        OpCode::Brtrue => i.truth_branch_body(true),
        OpCode::Brfalse => i.truth_branch_body(false),
        OpCode::Ldloc
        | OpCode::Ldarg
        | OpCode::Stloc
        | OpCode::Starg
        | OpCode::Ldloca
        | OpCode::Ldarga => i.slot_body(opcode),
        OpCode::Switch => {
            let targets = TypeSig::SzArray(Box::new(TypeSig::U4));
            let params = vec![TypeSig::U4, targets.clone()];
            let helper = i.helper(true, TypeSig::Void, params, vec![op(OpCode::Ret)]);
            vec![
                op(OpCode::Ldarg0), op(OpCode::Ldarg0), i.pop(), unbox_u4(),
                op(OpCode::Ldarg1), with_type(OpCode::Castclass, targets),
                call(helper), op(OpCode::Ret),
            ]
        }
        OpCode::Ret => vec![
            op(OpCode::Ldarg0), ldc_i4(1), with_field(OpCode::Stfld, i.finished.clone()),
            op(OpCode::Ret),
        ],
        OpCode::Endfinally => {
            let stack = i.finally_stack.clone();
            let stack_type = stack.field_type.clone().unwrap_or(TypeSig::Object);
            let pop = instance_method(stack_type, "Pop", TypeSig::Var(0), vec![]);
            vec![
                op(OpCode::Ldarg0), op(OpCode::Ldarg0), with_field(OpCode::Ldfld, stack),
                callvirt(pop), i.jump(), op(OpCode::Ret),
            ]
        }
        OpCode::Throw => vec![
            op(OpCode::Ldarg0), i.pop(), castclass("System", "Exception"), op(OpCode::Throw),
        ],
        OpCode::Rethrow => {
            let edi = "System.Runtime.ExceptionServices";
            let info = named(edi, "ExceptionDispatchInfo");
            let exception = vec![named("System", "Exception")];
            let capture = bcl(edi, "ExceptionDispatchInfo", "Capture", info, exception, false);
            let throw = bcl(edi, "ExceptionDispatchInfo", "Throw", TypeSig::Void, vec![], true);
            vec![
                op(OpCode::Ldarg0), with_field(OpCode::Ldfld, i.exception.clone()), call(capture),
                callvirt(throw), op(OpCode::Ret),
            ]
        }
        OpCode::Ldnull => vec![op(OpCode::Ldarg0), op(OpCode::Ldnull), i.push(), op(OpCode::Ret)],
        OpCode::Ldstr => vec![
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), with_type(OpCode::Castclass, TypeSig::String),
            i.push(), op(OpCode::Ret),
        ],
        OpCode::Ldtoken => vec![
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), castclass("System.Reflection", "MemberInfo"),
            i.push(), op(OpCode::Ret),
        ],
        OpCode::Dup => vec![
            op(OpCode::Ldarg0), i.pop(), op(OpCode::Stloc0),
            op(OpCode::Ldarg0), op(OpCode::Ldloc0), i.push(),
            op(OpCode::Ldarg0), op(OpCode::Ldloc0), i.push(), op(OpCode::Ret),
        ],
        OpCode::Pop => vec![op(OpCode::Ldarg0), i.pop(), op(OpCode::Pop), op(OpCode::Ret)],
        OpCode::Ldfld => vec![
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), castclass(fi_ns, fi_name),
            op(OpCode::Ldarg0), i.pop(), callvirt(get_value()), i.push(), op(OpCode::Ret),
        ],
        OpCode::Ldsfld => vec![
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), castclass(fi_ns, fi_name), op(OpCode::Ldnull),
            callvirt(get_value()), i.push(), op(OpCode::Ret),
        ],
        OpCode::Stfld => vec![
            op(OpCode::Ldarg0), i.pop(), op(OpCode::Stloc0),
            op(OpCode::Ldarg1), castclass(fi_ns, fi_name),
            op(OpCode::Ldarg0), i.pop(), op(OpCode::Ldloc0), callvirt(set_value()), op(OpCode::Ret),
        ],
        OpCode::Stsfld => vec![
            op(OpCode::Ldarg1), castclass(fi_ns, fi_name), op(OpCode::Ldnull),
            op(OpCode::Ldarg0), i.pop(), callvirt(set_value()), op(OpCode::Ret),
        ],
        OpCode::Call | OpCode::Callvirt => {
            let params = vec![named("System.Reflection", "MethodBase"), TypeSig::Boolean];
            let invoke = i.helper(true, TypeSig::Void, params, vec![op(OpCode::Ret)]);
            vec![
                op(OpCode::Ldarg0), op(OpCode::Ldarg1),
                castclass("System.Reflection", "MethodBase"),
                ldc_i4(i32::from(opcode == OpCode::Callvirt)), call(invoke), op(OpCode::Ret),
            ]
        }
        OpCode::Newobj => {
            let params = vec![named("System.Reflection", "ConstructorInfo")];
            let construct = i.helper(true, TypeSig::Void, params, vec![op(OpCode::Ret)]);
            vec![
                op(OpCode::Ldarg0), op(OpCode::Ldarg1),
                castclass("System.Reflection", "ConstructorInfo"), call(construct),
                op(OpCode::Ret),
            ]
        }
        OpCode::Ldftn => {
            let handle = TypeSig::ValueType(TypeRef::new("System", "RuntimeMethodHandle"));
            let get_handle = bcl(
                "System.Reflection", "MethodBase", "get_MethodHandle", handle.clone(), vec![], true,
            );
            vec![
                op(OpCode::Ldarg0), op(OpCode::Ldarg1),
                castclass("System.Reflection", "MethodBase"), callvirt(get_handle),
                with_type(OpCode::Box, handle), i.push(), op(OpCode::Ret),
            ]
        }
        OpCode::Newarr => {
            let params = vec![named("System", "Type"), TypeSig::I4];
            let array = named("System", "Array");
            let create = bcl("System", "Array", "CreateInstance", array, params, false);

            vec![
                op(OpCode::Ldarg0), op(OpCode::Ldarg1), system_type(), op(OpCode::Ldarg0), i.pop(),
                with_type(OpCode::UnboxAny, TypeSig::I4), call(create), i.push(), op(OpCode::Ret),
            ]
        }
        OpCode::Castclass | OpCode::Isinst => {
            let mut body = vec![
                op(OpCode::Ldarg0), i.pop(), op(OpCode::Stloc0),
                op(OpCode::Ldarg1), system_type(), op(OpCode::Ldloc0), callvirt(is_instance()),
                Instruction::with_operand(OpCode::BrtrueS, Operand::Target(Label(10))),
            ];
            if opcode == OpCode::Castclass {
                let error = named("System", "InvalidCastException");
                let ctor = instance_method(error, ".ctor", TypeSig::Void, vec![]);
                body.extend([with_method(OpCode::Newobj, ctor), op(OpCode::Throw)]);
            } else {
                body.extend([op(OpCode::Ldnull), op(OpCode::Stloc0)]);
            }
            body.extend([op(OpCode::Ldarg0), op(OpCode::Ldloc0), i.push(), op(OpCode::Ret)]);
            body
        }
        OpCode::Box => vec![
            op(OpCode::Ldarg0), op(OpCode::Ldarg1), system_type(),
            op(OpCode::Ldarg0), i.pop(), call(change_type()), i.push(), op(OpCode::Ret),
        ],
        OpCode::UnboxAny => {
            let get_value = bcl(
                "System.Runtime.CompilerServices", "RuntimeHelpers", "GetObjectValue",
                TypeSig::Object, object(), false,
            );
            vec![
                op(OpCode::Ldarg0), op(OpCode::Ldarg1), system_type(),
                op(OpCode::Ldarg0), i.pop(), call(change_type()),
                call(get_value), i.push(), op(OpCode::Ret),
            ]
        }
        OpCode::Initobj => {
            let type_param = vec![named("System", "Type")];
            let create =
                bcl("System", "Activator", "CreateInstance", TypeSig::Object, type_param, false);
            let params = vec![TypeSig::Object, TypeSig::Object];
            let assign = i.helper(false, TypeSig::Void, params, vec![op(OpCode::Ret)]);
            vec![
                op(OpCode::Ldarg0), i.pop(), op(OpCode::Ldarg1), system_type(),
                call(create), call(assign), op(OpCode::Ret),
            ]
        }
        OpCode::Sizeof => {
            let size_of = bcl(
                "System.Runtime.InteropServices", "Marshal", "SizeOf",
                TypeSig::I4, vec![named("System", "Type")], false,
            );
            vec![
                op(OpCode::Ldarg0), op(OpCode::Ldarg1), system_type(), call(size_of),
                with_type(OpCode::Box, TypeSig::I4), i.push(), op(OpCode::Ret),
            ]
        }
        other => panic!("no handler template for {other}"),
    }
}

/// Reader methods of a build with a given header order and operand layout.
pub struct LayoutFixture {
    pub module: ModuleModel,
    header_reader: Token,
    header_consumer: Token,
    type_record_reader: Token,
}

impl LayoutFixture {
    pub fn new(order: &[HeaderField], operand: OperandLayout) -> Self {
        let mut module = ModuleModel::new("Protected.dll");
        let reader_type = TypeRef::new("Eaz", "StreamReader");
        let header_type = TypeRef::new("Eaz", "MethodHeader");
        module.add_type(TypeDefInfo::new(reader_type.clone()));
        module.add_type(TypeDefInfo::new(header_type.clone()));
        let reader_sig = TypeSig::Class(reader_type);

        let read =
            |name: &str, ret: TypeSig| instance_method(reader_sig.clone(), name, ret, vec![]);
        let read_i32 = read("ReadInt32", TypeSig::I4);
        let read_string = read("ReadString", TypeSig::String);
        let read_byte = read("ReadByte", TypeSig::U1);
        let read_bool = read("ReadBoolean", TypeSig::Boolean);
        let type_array = TypeSig::SzArray(Box::new(TypeSig::I4));
        let read_locals = read("ReadLocals", type_array.clone());
        let param_records = TypeSig::SzArray(Box::new(named("Eaz", "ParameterRecord")));
        let read_params = read("ReadParameters", param_records);

        module.define_method(read_i32.clone(), vec![ldc_i4(0), op(OpCode::Ret)]);
        module.define_method(read_string.clone(), vec![op(OpCode::Ldnull), op(OpCode::Ret)]);
        module.define_method(read_byte.clone(), vec![ldc_i4(0), op(OpCode::Ret)]);
        module.define_method(read_bool.clone(), vec![ldc_i4(0), op(OpCode::Ret)]);
        module.define_method(
            read_locals.clone(),
            vec![
                op(OpCode::Ldarg0),
                callvirt(read_i32.clone()),
                with_type(OpCode::Newarr, TypeSig::I4),
                op(OpCode::Ret),
            ],
        );
        module.define_method(
            read_params.clone(),
            vec![
                op(OpCode::Ldarg0), callvirt(read_i32.clone()), op(OpCode::Pop), op(OpCode::Ldarg0),
                callvirt(read_bool.clone()), op(OpCode::Pop), op(OpCode::Ldnull), op(OpCode::Ret),
            ],
        );

        let mut fields = Vec::new();
        let mut reader_body = Vec::new();
        for (index, role) in order.iter().enumerate() {
            let (field_type, reader) = match role {
                HeaderField::Locals => (type_array.clone(), read_locals.clone()),
                HeaderField::Parameters => (read_params.sig.ret.clone(), read_params.clone()),
                HeaderField::Name => (TypeSig::String, read_string.clone()),
                HeaderField::ReturnType | HeaderField::DeclaringType => {
                    (TypeSig::I4, read_i32.clone())
                }
                HeaderField::BindingFlags => (TypeSig::U1, read_byte.clone()),
            };
            let field = module.define_field(&header_type, format!("f{index}"), field_type, false);
            reader_body.extend([
                op(OpCode::Ldarg0),
                op(OpCode::Ldarg1),
                callvirt(reader),
                with_field(OpCode::Stfld, field.clone()),
            ]);
            fields.push((*role, field));
        }
        reader_body.push(op(OpCode::Ret));
        let header_sig = TypeSig::Class(header_type);
        let header_reader = module.define_method(
            instance_method(header_sig.clone(), "Read", TypeSig::Void, vec![reader_sig.clone()]),
            reader_body,
        );

        let field_of = |role| {
            fields
                .iter()
                .find(|(r, _)| *r == role)
                .map(|(_, f)| with_field(OpCode::Ldfld, f.clone()))
                .unwrap()
        };
        let system_type = named("System", "Type");
        let resolve_type = static_method(
            named("Eaz", "Resolver"),
            "ResolveType",
            system_type.clone(),
            vec![TypeSig::I4],
        );
        let get_method = instance_method(
            system_type,
            "GetMethod",
            named("System.Reflection", "MethodInfo"),
            vec![TypeSig::String, named("System.Reflection", "BindingFlags")],
        );
        #[rustfmt::skip]
        let consumer_body = vec![

            op(OpCode::Ldarg0), field_of(HeaderField::DeclaringType), call(resolve_type.clone()),
            op(OpCode::Ldarg0), field_of(HeaderField::Name),
            op(OpCode::Ldarg0), field_of(HeaderField::BindingFlags),
            callvirt(get_method), op(OpCode::Pop),
            op(OpCode::Ldarg0), field_of(HeaderField::ReturnType), call(resolve_type),
            op(OpCode::Pop),

            op(OpCode::Ret),
        ];
        let header_consumer = module.define_method(
            instance_method(header_sig.clone(), "Resolve", TypeSig::Void, vec![]),
            consumer_body,
        );

        let mut record_body = vec![op(OpCode::Ldarg1), callvirt(read_byte), op(OpCode::Pop)];
        let token_read = [op(OpCode::Ldarg1), callvirt(read_i32), op(OpCode::Stloc0)];
        let name_read = [op(OpCode::Ldarg1), callvirt(read_string), op(OpCode::Stloc1)];
        match operand {
            OperandLayout::TokenFirst => {
                record_body.extend(token_read);
                record_body.extend(name_read);
            }
            OperandLayout::DescriptionFirst => {
                record_body.extend(name_read);
                record_body.extend(token_read);
            }
        }
        record_body.push(op(OpCode::Ret));
        let type_record_reader = module.define_method(
            static_method(header_sig, "ReadTypeRecord", TypeSig::Void, vec![reader_sig]),
            record_body,
        );

        LayoutFixture {
            module,
            header_reader,
            header_consumer,
            type_record_reader,
        }
    }

    pub fn source(&self) -> LayoutSource {
        LayoutSource::Discover {
            header_reader: self.header_reader,
            header_consumer: self.header_consumer,
            type_record_reader: self.type_record_reader,
        }
    }
}
