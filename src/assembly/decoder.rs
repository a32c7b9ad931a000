//! CIL body decoding.
//!
//! Decoding runs in three steps:
//!
//! 1. [`decode_instruction`] walks the body linearly, one opcode and operand at a time. Branch
//!    offsets become absolute offsets, token operands stay raw.
//! 2. [`decode_body`] resolves token operands through a [`SymbolResolver`] and rewrites branch
//!    targets from offsets into instruction indices.
//! 3. The exception clauses are overlaid as [`ExceptionMarker`]s on the instructions where the
//!    regions begin and end.
//!
//! # Examples
//!
//! ```rust
//! use dothook::{assembly::decode_body, metadata::SymbolTable};
//!
//! // ldarg.0; ldarg.1; add; ret
//! let code = [0x02, 0x03, 0x58, 0x2A];
//! let list = decode_body(&code, &[], &SymbolTable::new(), &Default::default())?;
//!
//! assert_eq!(list.len(), 4);
//! assert_eq!(list.find_by_offset(2).map(|i| i.mnemonic), Some("add"));
//! # Ok::<(), dothook::Error>(())
//! ```

use log::{debug, trace};

use crate::{
    assembly::{
        instruction::{
            ExceptionMarker, Immediate, Instruction, Operand, OperandType, StackBehavior,
        },
        instructions::{CilInstruction, INSTRUCTIONS, INSTRUCTIONS_FE},
        list::InstructionList,
        opcodes,
    },
    file::parser::Parser,
    metadata::{
        members::MemberRef,
        method::ExceptionHandler,
        resolver::SymbolResolver,
        token::Token,
        typesystem::{GenericContext, TypeShape},
    },
    Error, Result,
};

/// Decode a single instruction at the parser's position.
///
/// Token operands are returned as [`Operand::Token`], branch operands as absolute
/// [`Operand::Target`] / [`Operand::Switch`] offsets, variable operands as
/// [`Operand::Local`] / [`Operand::Argument`]. No exception markers are attached.
///
/// # Arguments
/// * `parser` - Positioned at the first byte of an opcode
///
/// # Errors
/// Returns [`crate::Error::MalformedBody`] for reserved opcodes, truncated operands and branch
/// targets before the start of the body, [`crate::Error::UnsupportedOperand`] if the opcode's
/// operand shape has no decoding.
///
/// # Examples
///
/// ```rust
/// use dothook::{assembly::{decode_instruction, Operand}, Parser};
///
/// // ldloc.s 10
/// let mut parser = Parser::new(&[0x11, 0x0A]);
/// let instruction = decode_instruction(&mut parser)?;
///
/// assert_eq!(instruction.mnemonic, "ldloc.s");
/// assert_eq!(instruction.operand, Operand::Local(10));
/// # Ok::<(), dothook::Error>(())
/// ```
pub fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    decode_raw(parser).map(|(instruction, _)| instruction)
}

fn lookup_opcode(parser: &mut Parser) -> Result<(&'static CilInstruction<'static>, u8, u8)> {
    let offset = parser.pos();
    let first_byte = parser
        .read_le::<u8>()
        .map_err(|_| malformed_error!("Missing opcode at IL_{:04X}", offset))?;

    let (cil_instruction, prefix, opcode) = if first_byte == opcodes::FE_PREFIX {
        let second_byte = parser
            .read_le::<u8>()
            .map_err(|_| malformed_error!("Truncated two-byte opcode at IL_{:04X}", offset))?;

        match INSTRUCTIONS_FE.get(second_byte as usize) {
            Some(instr) => (instr, opcodes::FE_PREFIX, second_byte),
            None => return Err(malformed_error!("Invalid opcode: FE {:02X}", second_byte)),
        }
    } else {
        match INSTRUCTIONS.get(first_byte as usize) {
            Some(instr) => (instr, 0, first_byte),
            None => return Err(malformed_error!("Invalid opcode: {:02X}", first_byte)),
        }
    };

    if cil_instruction.instr.is_empty() {
        return Err(malformed_error!(
            "Reserved opcode {:02X}{:02X} at IL_{:04X}",
            prefix,
            opcode,
            offset
        ));
    }

    Ok((cil_instruction, prefix, opcode))
}

fn branch_destination(end: usize, relative: i32, offset: usize) -> Result<u32> {
    let end = i64::try_from(end).map_err(|_| malformed_error!("Body too large"))?;
    u32::try_from(end + i64::from(relative)).map_err(|_| {
        malformed_error!(
            "Branch at IL_{:04X} targets {} bytes before the body",
            offset,
            relative
        )
    })
}

fn variable_operand(mnemonic: &str, index: u16) -> Operand {
    if mnemonic.contains("arg") {
        Operand::Argument(index)
    } else {
        Operand::Local(index)
    }
}

fn decode_raw(parser: &mut Parser) -> Result<(Instruction, OperandType)> {
    let start = parser.pos();
    // Bodies are limited to 32-bit offsets by the header
    #[allow(clippy::cast_possible_truncation)]
    let offset = start as u32;
    let (cil_instruction, prefix, opcode) = lookup_opcode(parser)?;
    let mnemonic = cil_instruction.instr;

    let truncated = |_: Error| {
        malformed_error!(
            "Truncated operand for {} at IL_{:04X}",
            mnemonic,
            start
        )
    };

    let operand = match cil_instruction.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 if cil_instruction.is_branch() => {
            let relative = parser.read_le::<i8>().map_err(truncated)?;
            Operand::Target(branch_destination(
                parser.pos(),
                i32::from(relative),
                start,
            )?)
        }
        OperandType::Int32 if cil_instruction.is_branch() => {
            let relative = parser.read_le::<i32>().map_err(truncated)?;
            Operand::Target(branch_destination(parser.pos(), relative, start)?)
        }
        OperandType::Int8 if mnemonic == "ldc.i4.s" => {
            Operand::Immediate(Immediate::Int8(parser.read_le::<i8>().map_err(truncated)?))
        }
        OperandType::Int8 => {
            return Err(Error::UnsupportedOperand { mnemonic, offset })
        }
        OperandType::UInt8 => {
            Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>().map_err(truncated)?))
        }
        OperandType::Int32 => {
            Operand::Immediate(Immediate::Int32(parser.read_le::<i32>().map_err(truncated)?))
        }
        OperandType::Int64 => {
            Operand::Immediate(Immediate::Int64(parser.read_le::<i64>().map_err(truncated)?))
        }
        OperandType::Float32 => {
            Operand::Immediate(Immediate::Float32(parser.read_le::<f32>().map_err(truncated)?))
        }
        OperandType::Float64 => {
            Operand::Immediate(Immediate::Float64(parser.read_le::<f64>().map_err(truncated)?))
        }
        OperandType::ShortVariable => {
            let index = parser.read_le::<u8>().map_err(truncated)?;
            variable_operand(mnemonic, u16::from(index))
        }
        OperandType::Variable => {
            let index = parser.read_le::<u16>().map_err(truncated)?;
            variable_operand(mnemonic, index)
        }
        OperandType::Field
        | OperandType::Method
        | OperandType::Type
        | OperandType::String
        | OperandType::Signature
        | OperandType::Token => Operand::Token(Token::new(
            parser.read_le::<u32>().map_err(truncated)?,
        )),
        OperandType::Switch => {
            let case_count = parser.read_le::<u32>().map_err(truncated)? as usize;
            if case_count.saturating_mul(4) > parser.remaining() {
                return Err(truncated(Error::OutOfRange));
            }

            let table_end = parser.pos() + case_count * 4;
            let mut targets = Vec::with_capacity(case_count);
            for _ in 0..case_count {
                let relative = parser.read_le::<i32>().map_err(truncated)?;
                targets.push(branch_destination(table_end, relative, start)?);
            }
            Operand::Switch(targets)
        }
    };

    // Bodies are limited to 32-bit offsets by the header
    #[allow(clippy::cast_possible_truncation)]
    let size = (parser.pos() - start) as u32;

    let instruction = Instruction {
        offset,
        size,
        opcode,
        prefix,
        mnemonic,
        category: cil_instruction.category,
        flow_type: cil_instruction.flow,
        stack_behavior: StackBehavior {
            pops: cil_instruction.stack_pops,
            pushes: cil_instruction.stack_pushes,
            // Stack effects can legitimately be negative
            #[allow(clippy::cast_possible_wrap)]
            net_effect: cil_instruction.stack_pushes as i8 - cil_instruction.stack_pops as i8,
        },
        operand,
        markers: Vec::new(),
    };

    Ok((instruction, cil_instruction.op_type))
}

fn resolve_operand(
    op_type: OperandType,
    token: Token,
    resolver: &dyn SymbolResolver,
    context: &GenericContext,
) -> Result<Operand> {
    Ok(match op_type {
        OperandType::Field => Operand::Member(MemberRef::Field(
            resolver.resolve_field(token, context)?,
        )),
        OperandType::Method => Operand::Member(MemberRef::Method(
            resolver.resolve_method(token, context)?,
        )),
        OperandType::Type => Operand::Member(MemberRef::Type(resolver.resolve_type(token, context)?)),
        OperandType::String => Operand::String(resolver.resolve_string(token)?),
        OperandType::Signature => Operand::Signature(resolver.resolve_signature(token, context)?),
        _ => Operand::Member(resolver.resolve_member(token, context)?),
    })
}

/// Decode a complete method body into an [`InstructionList`].
///
/// # Arguments
/// * `code` - The code bytes, without the method header
/// * `clauses` - The exception clauses of the body
/// * `resolver` - Resolves the tokens referenced by the code and by catch clauses
/// * `context` - Generic instantiation applied to resolved members
///
/// # Errors
/// - [`crate::Error::MalformedBody`] for invalid opcodes, truncated operands, branch targets
///   that do not start an instruction, and exception clauses whose offsets do not fall on
///   instruction boundaries
/// - [`crate::Error::UnresolvedToken`] if the resolver does not know a token
pub fn decode_body(
    code: &[u8],
    clauses: &[ExceptionHandler],
    resolver: &dyn SymbolResolver,
    context: &GenericContext,
) -> Result<InstructionList> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();

    while parser.has_more_data() {
        let (mut instruction, op_type) = decode_raw(&mut parser)?;
        if let Operand::Token(token) = instruction.operand {
            instruction.operand = resolve_operand(op_type, token, resolver, context)?;
        }
        instructions.push(instruction);
    }

    let offsets: Vec<u32> = instructions.iter().map(|i| i.offset).collect();
    let index_of = |target: u32, from: u32| -> Result<usize> {
        offsets.binary_search(&target).map_err(|_| {
            malformed_error!(
                "Branch at IL_{:04X} targets IL_{:04X}, which is not an instruction",
                from,
                target
            )
        })
    };

    for instruction in &mut instructions {
        let from = instruction.offset;
        instruction.operand = match std::mem::replace(&mut instruction.operand, Operand::None) {
            Operand::Target(target) => Operand::Branch(index_of(target, from)?),
            Operand::Switch(targets) => Operand::BranchTable(
                targets
                    .into_iter()
                    .map(|target| index_of(target, from))
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => other,
        };
    }

    // Bodies are limited to 32-bit offsets by the header
    #[allow(clippy::cast_possible_truncation)]
    let code_size = code.len() as u32;
    let tail_markers =
        overlay_exception_markers(&mut instructions, code_size, clauses, resolver, context)?;

    debug!(
        "Decoded {} instructions from {} bytes, {} exception clauses",
        instructions.len(),
        code.len(),
        clauses.len()
    );

    Ok(InstructionList::new(instructions, tail_markers, code_size))
}

/// Clauses sharing one protected range
struct Region<'a> {
    try_offset: u32,
    try_length: u32,
    handlers: Vec<&'a ExceptionHandler>,
}

impl Region<'_> {
    fn end(&self) -> u32 {
        self.handlers
            .iter()
            .map(|handler| handler.handler_end())
            .max()
            .unwrap_or_else(|| self.try_offset.saturating_add(self.try_length))
    }
}

/// Ordering of markers placed on the same instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MarkerRank {
    EndTry,
    Handler,
    BeginTry,
}

fn overlay_exception_markers(
    instructions: &mut [Instruction],
    code_size: u32,
    clauses: &[ExceptionHandler],
    resolver: &dyn SymbolResolver,
    context: &GenericContext,
) -> Result<Vec<ExceptionMarker>> {
    if clauses.is_empty() {
        return Ok(Vec::new());
    }

    let mut regions: Vec<Region> = Vec::new();
    for clause in clauses {
        match regions
            .iter_mut()
            .find(|r| r.try_offset == clause.try_offset && r.try_length == clause.try_length)
        {
            Some(region) => region.handlers.push(clause),
            None => regions.push(Region {
                try_offset: clause.try_offset,
                try_length: clause.try_length,
                handlers: vec![clause],
            }),
        }
    }

    let tail = instructions.len();
    let slot_of = |offset: u32, allow_tail: bool, what: &str| -> Result<usize> {
        if allow_tail && offset == code_size {
            return Ok(tail);
        }
        instructions
            .binary_search_by_key(&offset, |i| i.offset)
            .map_err(|_| {
                malformed_error!(
                    "Exception clause {} at IL_{:04X} is not on an instruction boundary",
                    what,
                    offset
                )
            })
    };

    // (slot, rank, primary key, secondary key, marker)
    let mut placed: Vec<(usize, MarkerRank, i64, i64, ExceptionMarker)> = Vec::new();
    for region in &regions {
        let try_offset = i64::from(region.try_offset);
        let end = region.end();

        placed.push((
            slot_of(region.try_offset, false, "try start")?,
            MarkerRank::BeginTry,
            // outermost first
            -i64::from(end),
            try_offset,
            ExceptionMarker::BeginTry,
        ));
        placed.push((
            slot_of(end, true, "region end")?,
            MarkerRank::EndTry,
            // innermost first
            -try_offset,
            i64::from(region.try_length),
            ExceptionMarker::EndTry,
        ));

        for handler in &region.handlers {
            let begin = if handler.is_filter() {
                placed.push((
                    slot_of(handler.filter_offset, false, "filter start")?,
                    MarkerRank::Handler,
                    0,
                    0,
                    ExceptionMarker::BeginFilter,
                ));
                ExceptionMarker::BeginFilterHandler
            } else if handler.is_finally() {
                ExceptionMarker::BeginFinally
            } else if handler.is_fault() {
                ExceptionMarker::BeginFault
            } else {
                let class = handler
                    .class_token()
                    .ok_or_else(|| malformed_error!("Catch clause without class token"))?;
                let caught: TypeShape = resolver.resolve_type(class, context)?;
                ExceptionMarker::BeginCatch(caught)
            };

            placed.push((
                slot_of(handler.handler_offset, false, "handler start")?,
                MarkerRank::Handler,
                0,
                0,
                begin,
            ));
        }
    }

    placed.sort_by_key(|(slot, rank, primary, secondary, _)| (*slot, *rank, *primary, *secondary));

    let mut tail_markers = Vec::new();
    for (slot, _, _, _, marker) in placed {
        trace!("Exception marker {:?} at slot {}", marker, slot);
        match instructions.get_mut(slot) {
            Some(instruction) => instruction.markers.push(marker),
            None => tail_markers.push(marker),
        }
    }

    Ok(tail_markers)
}
