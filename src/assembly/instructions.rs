//! Static opcode tables.
//!
//! [`INSTRUCTIONS`] is indexed by the single opcode byte (`0x00..=0xE0`), [`INSTRUCTIONS_FE`] by
//! the second byte of `0xFE`-prefixed opcodes (`0x00..=0x1E`). Reserved slots carry an empty
//! mnemonic.
//!
//! Stack counts are fixed per opcode. `call`, `callvirt`, `calli`, `newobj` and `ret` depend on
//! the signature of their operand and list `0/0` here; callers supply the real effect (see
//! [`crate::assembly::InstructionEncoder::emit_call`]).

use crate::assembly::instruction::{FlowType, InstructionCategory, OperandType};

/// Static description of one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CilInstruction<'a> {
    /// Operand shape following the opcode
    pub op_type: OperandType,
    /// Mnemonic, empty for reserved opcodes
    pub instr: &'a str,
    /// Functional group
    pub category: InstructionCategory,
    /// Control flow behavior
    pub flow: FlowType,
    /// Values popped from the evaluation stack
    pub stack_pops: u8,
    /// Values pushed onto the evaluation stack
    pub stack_pushes: u8,
}

impl CilInstruction<'_> {
    /// Returns true for branch opcodes carrying a relative offset
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
        ) && matches!(self.op_type, OperandType::Int8 | OperandType::Int32)
    }

    /// Returns true if the stack effect depends on the operand's signature
    #[must_use]
    pub fn has_variable_stack(&self) -> bool {
        matches!(self.instr, "call" | "callvirt" | "calli" | "newobj" | "ret")
    }
}

use FlowType as F;
use InstructionCategory as C;
use OperandType as O;

const fn op(
    instr: &'static str,
    op_type: OperandType,
    category: InstructionCategory,
    flow: FlowType,
    stack_pops: u8,
    stack_pushes: u8,
) -> CilInstruction<'static> {
    CilInstruction {
        op_type,
        instr,
        category,
        flow,
        stack_pops,
        stack_pushes,
    }
}

const RESERVED: CilInstruction<'static> = op("", O::None, C::Misc, F::Sequential, 0, 0);

/// Single-byte opcodes, indexed by opcode
pub const INSTRUCTIONS: &[CilInstruction<'static>] = &[
    /* 0x00 */ op("nop", O::None, C::Misc, F::Sequential, 0, 0),
    /* 0x01 */ op("break", O::None, C::Misc, F::Sequential, 0, 0),
    /* 0x02 */ op("ldarg.0", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x03 */ op("ldarg.1", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x04 */ op("ldarg.2", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x05 */ op("ldarg.3", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x06 */ op("ldloc.0", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x07 */ op("ldloc.1", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x08 */ op("ldloc.2", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x09 */ op("ldloc.3", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x0A */ op("stloc.0", O::None, C::LoadStore, F::Sequential, 1, 0),
    /* 0x0B */ op("stloc.1", O::None, C::LoadStore, F::Sequential, 1, 0),
    /* 0x0C */ op("stloc.2", O::None, C::LoadStore, F::Sequential, 1, 0),
    /* 0x0D */ op("stloc.3", O::None, C::LoadStore, F::Sequential, 1, 0),
    /* 0x0E */ op("ldarg.s", O::ShortVariable, C::LoadStore, F::Sequential, 0, 1),
    /* 0x0F */ op("ldarga.s", O::ShortVariable, C::LoadStore, F::Sequential, 0, 1),
    /* 0x10 */ op("starg.s", O::ShortVariable, C::LoadStore, F::Sequential, 1, 0),
    /* 0x11 */ op("ldloc.s", O::ShortVariable, C::LoadStore, F::Sequential, 0, 1),
    /* 0x12 */ op("ldloca.s", O::ShortVariable, C::LoadStore, F::Sequential, 0, 1),
    /* 0x13 */ op("stloc.s", O::ShortVariable, C::LoadStore, F::Sequential, 1, 0),
    /* 0x14 */ op("ldnull", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x15 */ op("ldc.i4.m1", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x16 */ op("ldc.i4.0", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x17 */ op("ldc.i4.1", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x18 */ op("ldc.i4.2", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x19 */ op("ldc.i4.3", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x1A */ op("ldc.i4.4", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x1B */ op("ldc.i4.5", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x1C */ op("ldc.i4.6", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x1D */ op("ldc.i4.7", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x1E */ op("ldc.i4.8", O::None, C::LoadStore, F::Sequential, 0, 1),
    /* 0x1F */ op("ldc.i4.s", O::Int8, C::LoadStore, F::Sequential, 0, 1),
    /* 0x20 */ op("ldc.i4", O::Int32, C::LoadStore, F::Sequential, 0, 1),
    /* 0x21 */ op("ldc.i8", O::Int64, C::LoadStore, F::Sequential, 0, 1),
    /* 0x22 */ op("ldc.r4", O::Float32, C::LoadStore, F::Sequential, 0, 1),
    /* 0x23 */ op("ldc.r8", O::Float64, C::LoadStore, F::Sequential, 0, 1),
    /* 0x24 */ RESERVED,
    /* 0x25 */ op("dup", O::None, C::Misc, F::Sequential, 1, 2),
    /* 0x26 */ op("pop", O::None, C::Misc, F::Sequential, 1, 0),
    /* 0x27 */ op("jmp", O::Method, C::ControlFlow, F::Call, 0, 0),
    /* 0x28 */ op("call", O::Method, C::ControlFlow, F::Call, 0, 0),
    /* 0x29 */ op("calli", O::Signature, C::ControlFlow, F::Call, 0, 0),
    /* 0x2A */ op("ret", O::None, C::ControlFlow, F::Return, 0, 0),
    /* 0x2B */ op("br.s", O::Int8, C::ControlFlow, F::UnconditionalBranch, 0, 0),
    /* 0x2C */ op("brfalse.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 1, 0),
    /* 0x2D */ op("brtrue.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 1, 0),
    /* 0x2E */ op("beq.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x2F */ op("bge.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x30 */ op("bgt.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x31 */ op("ble.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x32 */ op("blt.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x33 */ op("bne.un.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x34 */ op("bge.un.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x35 */ op("bgt.un.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x36 */ op("ble.un.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x37 */ op("blt.un.s", O::Int8, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x38 */ op("br", O::Int32, C::ControlFlow, F::UnconditionalBranch, 0, 0),
    /* 0x39 */ op("brfalse", O::Int32, C::ControlFlow, F::ConditionalBranch, 1, 0),
    /* 0x3A */ op("brtrue", O::Int32, C::ControlFlow, F::ConditionalBranch, 1, 0),
    /* 0x3B */ op("beq", O::Int32, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x3C */ op("bge", O::Int32, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x3D */ op("bgt", O::Int32, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x3E */ op("ble", O::Int32, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x3F */ op("blt", O::Int32, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x40 */ op("bne.un", O::Int32, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x41 */ op("bge.un", O::Int32, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x42 */ op("bgt.un", O::Int32, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x43 */ op("ble.un", O::Int32, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x44 */ op("blt.un", O::Int32, C::ControlFlow, F::ConditionalBranch, 2, 0),
    /* 0x45 */ op("switch", O::Switch, C::ControlFlow, F::Switch, 1, 0),
    /* 0x46 */ op("ldind.i1", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x47 */ op("ldind.u1", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x48 */ op("ldind.i2", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x49 */ op("ldind.u2", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x4A */ op("ldind.i4", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x4B */ op("ldind.u4", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x4C */ op("ldind.i8", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x4D */ op("ldind.i", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x4E */ op("ldind.r4", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x4F */ op("ldind.r8", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x50 */ op("ldind.ref", O::None, C::LoadStore, F::Sequential, 1, 1),
    /* 0x51 */ op("stind.ref", O::None, C::LoadStore, F::Sequential, 2, 0),
    /* 0x52 */ op("stind.i1", O::None, C::LoadStore, F::Sequential, 2, 0),
    /* 0x53 */ op("stind.i2", O::None, C::LoadStore, F::Sequential, 2, 0),
    /* 0x54 */ op("stind.i4", O::None, C::LoadStore, F::Sequential, 2, 0),
    /* 0x55 */ op("stind.i8", O::None, C::LoadStore, F::Sequential, 2, 0),
    /* 0x56 */ op("stind.r4", O::None, C::LoadStore, F::Sequential, 2, 0),
    /* 0x57 */ op("stind.r8", O::None, C::LoadStore, F::Sequential, 2, 0),
    /* 0x58 */ op("add", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0x59 */ op("sub", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0x5A */ op("mul", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0x5B */ op("div", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0x5C */ op("div.un", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0x5D */ op("rem", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0x5E */ op("rem.un", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0x5F */ op("and", O::None, C::BitwiseLogical, F::Sequential, 2, 1),
    /* 0x60 */ op("or", O::None, C::BitwiseLogical, F::Sequential, 2, 1),
    /* 0x61 */ op("xor", O::None, C::BitwiseLogical, F::Sequential, 2, 1),
    /* 0x62 */ op("shl", O::None, C::BitwiseLogical, F::Sequential, 2, 1),
    /* 0x63 */ op("shr", O::None, C::BitwiseLogical, F::Sequential, 2, 1),
    /* 0x64 */ op("shr.un", O::None, C::BitwiseLogical, F::Sequential, 2, 1),
    /* 0x65 */ op("neg", O::None, C::Arithmetic, F::Sequential, 1, 1),
    /* 0x66 */ op("not", O::None, C::BitwiseLogical, F::Sequential, 1, 1),
    /* 0x67 */ op("conv.i1", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x68 */ op("conv.i2", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x69 */ op("conv.i4", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x6A */ op("conv.i8", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x6B */ op("conv.r4", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x6C */ op("conv.r8", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x6D */ op("conv.u4", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x6E */ op("conv.u8", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x6F */ op("callvirt", O::Method, C::ControlFlow, F::Call, 0, 0),
    /* 0x70 */ op("cpobj", O::Type, C::ObjectModel, F::Sequential, 2, 0),
    /* 0x71 */ op("ldobj", O::Type, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x72 */ op("ldstr", O::String, C::ObjectModel, F::Sequential, 0, 1),
    /* 0x73 */ op("newobj", O::Method, C::ObjectModel, F::Call, 0, 0),
    /* 0x74 */ op("castclass", O::Type, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x75 */ op("isinst", O::Type, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x76 */ op("conv.r.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x77 */ RESERVED,
    /* 0x78 */ RESERVED,
    /* 0x79 */ op("unbox", O::Type, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x7A */ op("throw", O::None, C::ControlFlow, F::Throw, 1, 0),
    /* 0x7B */ op("ldfld", O::Field, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x7C */ op("ldflda", O::Field, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x7D */ op("stfld", O::Field, C::ObjectModel, F::Sequential, 2, 0),
    /* 0x7E */ op("ldsfld", O::Field, C::ObjectModel, F::Sequential, 0, 1),
    /* 0x7F */ op("ldsflda", O::Field, C::ObjectModel, F::Sequential, 0, 1),
    /* 0x80 */ op("stsfld", O::Field, C::ObjectModel, F::Sequential, 1, 0),
    /* 0x81 */ op("stobj", O::Type, C::ObjectModel, F::Sequential, 2, 0),
    /* 0x82 */ op("conv.ovf.i1.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x83 */ op("conv.ovf.i2.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x84 */ op("conv.ovf.i4.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x85 */ op("conv.ovf.i8.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x86 */ op("conv.ovf.u1.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x87 */ op("conv.ovf.u2.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x88 */ op("conv.ovf.u4.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x89 */ op("conv.ovf.u8.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x8A */ op("conv.ovf.i.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x8B */ op("conv.ovf.u.un", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0x8C */ op("box", O::Type, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x8D */ op("newarr", O::Type, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x8E */ op("ldlen", O::None, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x8F */ op("ldelema", O::Type, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x90 */ op("ldelem.i1", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x91 */ op("ldelem.u1", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x92 */ op("ldelem.i2", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x93 */ op("ldelem.u2", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x94 */ op("ldelem.i4", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x95 */ op("ldelem.u4", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x96 */ op("ldelem.i8", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x97 */ op("ldelem.i", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x98 */ op("ldelem.r4", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x99 */ op("ldelem.r8", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x9A */ op("ldelem.ref", O::None, C::ObjectModel, F::Sequential, 2, 1),
    /* 0x9B */ op("stelem.i", O::None, C::ObjectModel, F::Sequential, 3, 0),
    /* 0x9C */ op("stelem.i1", O::None, C::ObjectModel, F::Sequential, 3, 0),
    /* 0x9D */ op("stelem.i2", O::None, C::ObjectModel, F::Sequential, 3, 0),
    /* 0x9E */ op("stelem.i4", O::None, C::ObjectModel, F::Sequential, 3, 0),
    /* 0x9F */ op("stelem.i8", O::None, C::ObjectModel, F::Sequential, 3, 0),
    /* 0xA0 */ op("stelem.r4", O::None, C::ObjectModel, F::Sequential, 3, 0),
    /* 0xA1 */ op("stelem.r8", O::None, C::ObjectModel, F::Sequential, 3, 0),
    /* 0xA2 */ op("stelem.ref", O::None, C::ObjectModel, F::Sequential, 3, 0),
    /* 0xA3 */ op("ldelem", O::Type, C::ObjectModel, F::Sequential, 2, 1),
    /* 0xA4 */ op("stelem", O::Type, C::ObjectModel, F::Sequential, 3, 0),
    /* 0xA5 */ op("unbox.any", O::Type, C::ObjectModel, F::Sequential, 1, 1),
    /* 0xA6 */ RESERVED,
    /* 0xA7 */ RESERVED,
    /* 0xA8 */ RESERVED,
    /* 0xA9 */ RESERVED,
    /* 0xAA */ RESERVED,
    /* 0xAB */ RESERVED,
    /* 0xAC */ RESERVED,
    /* 0xAD */ RESERVED,
    /* 0xAE */ RESERVED,
    /* 0xAF */ RESERVED,
    /* 0xB0 */ RESERVED,
    /* 0xB1 */ RESERVED,
    /* 0xB2 */ RESERVED,
    /* 0xB3 */ op("conv.ovf.i1", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xB4 */ op("conv.ovf.u1", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xB5 */ op("conv.ovf.i2", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xB6 */ op("conv.ovf.u2", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xB7 */ op("conv.ovf.i4", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xB8 */ op("conv.ovf.u4", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xB9 */ op("conv.ovf.i8", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xBA */ op("conv.ovf.u8", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xBB */ RESERVED,
    /* 0xBC */ RESERVED,
    /* 0xBD */ RESERVED,
    /* 0xBE */ RESERVED,
    /* 0xBF */ RESERVED,
    /* 0xC0 */ RESERVED,
    /* 0xC1 */ RESERVED,
    /* 0xC2 */ op("refanyval", O::Type, C::ObjectModel, F::Sequential, 1, 1),
    /* 0xC3 */ op("ckfinite", O::None, C::Arithmetic, F::Sequential, 1, 1),
    /* 0xC4 */ RESERVED,
    /* 0xC5 */ RESERVED,
    /* 0xC6 */ op("mkrefany", O::Type, C::ObjectModel, F::Sequential, 1, 1),
    /* 0xC7 */ RESERVED,
    /* 0xC8 */ RESERVED,
    /* 0xC9 */ RESERVED,
    /* 0xCA */ RESERVED,
    /* 0xCB */ RESERVED,
    /* 0xCC */ RESERVED,
    /* 0xCD */ RESERVED,
    /* 0xCE */ RESERVED,
    /* 0xCF */ RESERVED,
    /* 0xD0 */ op("ldtoken", O::Token, C::LoadStore, F::Sequential, 0, 1),
    /* 0xD1 */ op("conv.u2", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xD2 */ op("conv.u1", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xD3 */ op("conv.i", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xD4 */ op("conv.ovf.i", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xD5 */ op("conv.ovf.u", O::None, C::Conversion, F::Sequential, 1, 1),
    /* 0xD6 */ op("add.ovf", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0xD7 */ op("add.ovf.un", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0xD8 */ op("mul.ovf", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0xD9 */ op("mul.ovf.un", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0xDA */ op("sub.ovf", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0xDB */ op("sub.ovf.un", O::None, C::Arithmetic, F::Sequential, 2, 1),
    /* 0xDC */ op("endfinally", O::None, C::ControlFlow, F::EndFinally, 0, 0),
    /* 0xDD */ op("leave", O::Int32, C::ControlFlow, F::Leave, 0, 0),
    /* 0xDE */ op("leave.s", O::Int8, C::ControlFlow, F::Leave, 0, 0),
    /* 0xDF */ op("stind.i", O::None, C::LoadStore, F::Sequential, 2, 0),
    /* 0xE0 */ op("conv.u", O::None, C::Conversion, F::Sequential, 1, 1),
];

/// Two-byte opcodes, indexed by the byte following `0xFE`
pub const INSTRUCTIONS_FE: &[CilInstruction<'static>] = &[
    /* 0x00 */ op("arglist", O::None, C::Misc, F::Sequential, 0, 1),
    /* 0x01 */ op("ceq", O::None, C::Comparison, F::Sequential, 2, 1),
    /* 0x02 */ op("cgt", O::None, C::Comparison, F::Sequential, 2, 1),
    /* 0x03 */ op("cgt.un", O::None, C::Comparison, F::Sequential, 2, 1),
    /* 0x04 */ op("clt", O::None, C::Comparison, F::Sequential, 2, 1),
    /* 0x05 */ op("clt.un", O::None, C::Comparison, F::Sequential, 2, 1),
    /* 0x06 */ op("ldftn", O::Method, C::ObjectModel, F::Sequential, 0, 1),
    /* 0x07 */ op("ldvirtftn", O::Method, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x08 */ RESERVED,
    /* 0x09 */ op("ldarg", O::Variable, C::LoadStore, F::Sequential, 0, 1),
    /* 0x0A */ op("ldarga", O::Variable, C::LoadStore, F::Sequential, 0, 1),
    /* 0x0B */ op("starg", O::Variable, C::LoadStore, F::Sequential, 1, 0),
    /* 0x0C */ op("ldloc", O::Variable, C::LoadStore, F::Sequential, 0, 1),
    /* 0x0D */ op("ldloca", O::Variable, C::LoadStore, F::Sequential, 0, 1),
    /* 0x0E */ op("stloc", O::Variable, C::LoadStore, F::Sequential, 1, 0),
    /* 0x0F */ op("localloc", O::None, C::Misc, F::Sequential, 1, 1),
    /* 0x10 */ RESERVED,
    /* 0x11 */ op("endfilter", O::None, C::ControlFlow, F::EndFinally, 1, 0),
    /* 0x12 */ op("unaligned.", O::UInt8, C::Prefix, F::Sequential, 0, 0),
    /* 0x13 */ op("volatile.", O::None, C::Prefix, F::Sequential, 0, 0),
    /* 0x14 */ op("tail.", O::None, C::Prefix, F::Sequential, 0, 0),
    /* 0x15 */ op("initobj", O::Type, C::ObjectModel, F::Sequential, 1, 0),
    /* 0x16 */ op("constrained.", O::Type, C::Prefix, F::Sequential, 0, 0),
    /* 0x17 */ op("cpblk", O::None, C::Misc, F::Sequential, 3, 0),
    /* 0x18 */ op("initblk", O::None, C::Misc, F::Sequential, 3, 0),
    /* 0x19 */ op("no.", O::UInt8, C::Prefix, F::Sequential, 0, 0),
    /* 0x1A */ op("rethrow", O::None, C::ControlFlow, F::Throw, 0, 0),
    /* 0x1B */ RESERVED,
    /* 0x1C */ op("sizeof", O::Type, C::ObjectModel, F::Sequential, 0, 1),
    /* 0x1D */ op("refanytype", O::None, C::ObjectModel, F::Sequential, 1, 1),
    /* 0x1E */ op("readonly.", O::None, C::Prefix, F::Sequential, 0, 0),
];
