//! Decoded CIL instructions and their operands.
//!
//! An [`Instruction`] carries its byte offset, the static opcode metadata (mnemonic, category,
//! flow, stack effect), a resolved [`Operand`] and the exception region markers that start or
//! end at it. Instructions are owned by a [`crate::assembly::InstructionList`], which provides
//! the previous/next adjacency.
//!
//! # Branch operands
//!
//! Branches go through two stages. A freshly decoded instruction holds [`Operand::Target`] (or
//! [`Operand::Switch`]) with absolute byte offsets. Once the whole body is decoded these are
//! replaced by [`Operand::Branch`] (or [`Operand::BranchTable`]) holding indices into the list,
//! which is the form the hook compiler works with.
//!
//! # Examples
//!
//! ```rust
//! use dothook::assembly::{decode_instruction, FlowType, Operand};
//! use dothook::Parser;
//!
//! let mut parser = Parser::new(&[0x2B, 0x02, 0x00, 0x00, 0x2A]);
//! let branch = decode_instruction(&mut parser)?;
//!
//! assert_eq!(branch.mnemonic, "br.s");
//! assert_eq!(branch.flow_type, FlowType::UnconditionalBranch);
//! assert_eq!(branch.operand, Operand::Target(4));
//! # Ok::<(), dothook::Error>(())
//! ```

use std::fmt::{self, UpperHex};

use crate::metadata::{
    members::MemberRef, signatures::SignatureMethod, token::Token, typesystem::TypeShape,
};

/// Operand encodings following an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer, also short branch offsets
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Signed 32-bit integer, also long branch offsets
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// 8-bit local or argument index
    ShortVariable,
    /// 16-bit local or argument index
    Variable,
    /// Field token
    Field,
    /// Method token
    Method,
    /// Type token
    Type,
    /// User string token
    String,
    /// Stand-alone signature token
    Signature,
    /// Token of any member kind (`ldtoken`)
    Token,
    /// Switch table operand
    Switch,
}

impl OperandType {
    /// Returns the size in bytes of this operand type.
    ///
    /// Returns `None` for `Switch`, whose size depends on the target count.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dothook::assembly::OperandType;
    ///
    /// assert_eq!(OperandType::None.size(), Some(0));
    /// assert_eq!(OperandType::ShortVariable.size(), Some(1));
    /// assert_eq!(OperandType::Method.size(), Some(4));
    /// assert_eq!(OperandType::Switch.size(), None);
    /// ```
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 | OperandType::ShortVariable => Some(1),
            OperandType::Variable => Some(2),
            OperandType::Int32
            | OperandType::Float32
            | OperandType::Field
            | OperandType::Method
            | OperandType::Type
            | OperandType::String
            | OperandType::Signature
            | OperandType::Token => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }

    /// Returns true for operands encoded as a metadata token
    #[must_use]
    pub const fn is_token(&self) -> bool {
        matches!(
            self,
            OperandType::Field
                | OperandType::Method
                | OperandType::Type
                | OperandType::String
                | OperandType::Signature
                | OperandType::Token
        )
    }
}

/// An immediate value embedded in the instruction stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value (`ldc.i4.s`)
    Int8(i8),
    /// Unsigned 8-bit immediate value (`unaligned.`, `no.`)
    UInt8(u8),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl UpperHex for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value:02X}"),
            Immediate::UInt8(value) => write!(f, "{value:02X}"),
            Immediate::Int32(value) => write!(f, "{value:08X}"),
            Immediate::Int64(value) => write!(f, "{value:016X}"),
            Immediate::Float32(value) => write!(f, "{:08X}", value.to_bits()),
            Immediate::Float64(value) => write!(f, "{:016X}", value.to_bits()),
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::UInt8(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value}"),
            Immediate::Float64(value) => write!(f, "{value}"),
        }
    }
}

impl From<Immediate> for u64 {
    fn from(val: Immediate) -> Self {
        match val {
            // Signed values keep their bit pattern
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int8(value) => value as u64,
            Immediate::UInt8(value) => u64::from(value),
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int32(value) => value as u64,
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int64(value) => value as u64,
            Immediate::Float32(value) => u64::from(value.to_bits()),
            Immediate::Float64(value) => value.to_bits(),
        }
    }
}

/// A decoded operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value
    Immediate(Immediate),
    /// Branch target as an absolute byte offset (first decode pass)
    Target(u32),
    /// Switch targets as absolute byte offsets (first decode pass)
    Switch(Vec<u32>),
    /// Branch target as an index into the instruction list
    Branch(usize),
    /// Switch targets as indices into the instruction list
    BranchTable(Vec<usize>),
    /// Local variable index
    Local(u16),
    /// Argument index, `this` is argument 0 on instance routines
    Argument(u16),
    /// Resolved field, method or type
    Member(MemberRef),
    /// `ldstr` literal
    String(String),
    /// `calli` call-site signature
    Signature(SignatureMethod),
    /// Unresolved metadata token
    Token(Token),
}

impl Operand {
    /// The resolved member, if this operand is one
    #[must_use]
    pub fn as_member(&self) -> Option<&MemberRef> {
        match self {
            Operand::Member(member) => Some(member),
            _ => None,
        }
    }

    /// The immediate, if this operand is one
    #[must_use]
    pub fn as_immediate(&self) -> Option<Immediate> {
        match self {
            Operand::Immediate(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(value) => write!(f, "{value}"),
            Operand::Target(offset) => write!(f, "IL_{offset:04x}"),
            Operand::Switch(offsets) => {
                let targets: Vec<String> = offsets.iter().map(|o| format!("IL_{o:04x}")).collect();
                write!(f, "({})", targets.join(", "))
            }
            Operand::Branch(index) => write!(f, "#{index}"),
            Operand::BranchTable(indices) => {
                let targets: Vec<String> = indices.iter().map(|i| format!("#{i}")).collect();
                write!(f, "({})", targets.join(", "))
            }
            Operand::Local(index) => write!(f, "V_{index}"),
            Operand::Argument(index) => write!(f, "A_{index}"),
            Operand::Member(member) => write!(f, "{member}"),
            Operand::String(value) => write!(f, "{value:?}"),
            Operand::Signature(signature) => write!(f, "{signature}"),
            Operand::Token(token) => write!(f, "{token}"),
        }
    }
}

/// Control flow behavior of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Branches or falls through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Calls a method and continues
    Call,
    /// Returns from the method
    Return,
    /// Branches to one of several targets or falls through
    Switch,
    /// Raises an exception
    Throw,
    /// Ends a finally, fault or filter block
    EndFinally,
    /// Leaves a protected region
    Leave,
}

/// Stack effect of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Values popped
    pub pops: u8,
    /// Values pushed
    pub pushes: u8,
    /// `pushes - pops`
    pub net_effect: i8,
}

/// Functional group of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionCategory {
    /// Arithmetic operations
    Arithmetic,
    /// Bitwise and logical operations
    BitwiseLogical,
    /// Comparisons
    Comparison,
    /// Branches, calls, returns and exception flow
    ControlFlow,
    /// Numeric conversions
    Conversion,
    /// Loads and stores of locals, arguments, constants and indirections
    LoadStore,
    /// Object, field and array operations
    ObjectModel,
    /// Prefixes modifying the following instruction
    Prefix,
    /// Everything else
    Misc,
}

/// Exception region boundary attached to an instruction.
///
/// A region is a try range with one or more handlers. Its `BeginTry` sits on the first try
/// instruction, its `EndTry` on the instruction following the last handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionMarker {
    /// Start of a protected range
    BeginTry,
    /// End of a region, after its last handler
    EndTry,
    /// Start of a filter expression
    BeginFilter,
    /// Start of the handler guarded by the preceding filter
    BeginFilterHandler,
    /// Start of a finally handler
    BeginFinally,
    /// Start of a catch handler for the given type
    BeginCatch(TypeShape),
    /// Start of a fault handler
    BeginFault,
}

impl ExceptionMarker {
    /// Returns true for markers that start a handler block
    #[must_use]
    pub fn is_handler_begin(&self) -> bool {
        !matches!(self, ExceptionMarker::BeginTry | ExceptionMarker::EndTry)
    }
}

impl fmt::Display for ExceptionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionMarker::BeginTry => f.write_str(".try {"),
            ExceptionMarker::EndTry => f.write_str("} // end .try"),
            ExceptionMarker::BeginFilter => f.write_str("filter {"),
            ExceptionMarker::BeginFilterHandler => f.write_str("} {"),
            ExceptionMarker::BeginFinally => f.write_str("finally {"),
            ExceptionMarker::BeginCatch(shape) => write!(f, "catch {shape} {{"),
            ExceptionMarker::BeginFault => f.write_str("fault {"),
        }
    }
}

/// A decoded CIL instruction.
#[derive(Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset in the body
    pub offset: u32,
    /// Encoded size in bytes, opcode and operand included
    pub size: u32,
    /// Opcode byte (second byte for two-byte opcodes)
    pub opcode: u8,
    /// `0xFE` for two-byte opcodes, 0 otherwise
    pub prefix: u8,
    /// Mnemonic, e.g. `ldarg.0`
    pub mnemonic: &'static str,
    /// Functional group
    pub category: InstructionCategory,
    /// Control flow behavior
    pub flow_type: FlowType,
    /// Stack effect from the opcode table
    pub stack_behavior: StackBehavior,
    /// The operand
    pub operand: Operand,
    /// Exception region markers at this instruction, in emission order
    pub markers: Vec<ExceptionMarker>,
}

impl Instruction {
    /// Offset of the instruction following this one
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// Returns true for branches with a single target (conditional, unconditional, leave)
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
        )
    }

    /// Returns true for the one-byte-offset branch forms
    #[must_use]
    pub fn is_short_branch(&self) -> bool {
        self.is_branch() && self.mnemonic.ends_with(".s")
    }

    /// Returns true if control never falls through to the next instruction
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }

    /// Instruction indices this instruction may branch to (second decode pass only)
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.operand {
            Operand::Branch(index) => vec![*index],
            Operand::BranchTable(indices) => indices.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X} - ", self.offset)?;
        if self.prefix != 0 {
            write!(f, "{:02X}:", self.prefix)?;
        }
        write!(f, "{:02X} - {:<12}", self.opcode, self.mnemonic)?;

        if !matches!(self.operand, Operand::None) {
            write!(f, " {}", self.operand)?;
        }

        write!(f, " | {:?}", self.category)?;
        if self.flow_type != FlowType::Sequential {
            write!(f, " | {:?}", self.flow_type)?;
        }
        if self.stack_behavior.net_effect != 0 {
            write!(f, " | stack:{:+}", self.stack_behavior.net_effect)?;
        }
        if !self.markers.is_empty() {
            write!(f, " | markers:{:?}", self.markers)?;
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.mnemonic)?;
        if !matches!(self.operand, Operand::None) {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}
