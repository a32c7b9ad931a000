//! CIL instruction encoding.
//!
//! [`InstructionEncoder`] is the reverse of the decoder. It emits instructions by mnemonic,
//! resolves branches through named labels, tracks the evaluation stack to compute `max_stack`,
//! and records exception regions as they are opened and closed.
//!
//! # Labels and branch forms
//!
//! Branches refer to labels that may be defined later. All fixups are resolved in
//! [`InstructionEncoder::finalize`]. Long branches that have a short form are shrunk when the
//! final offset fits into a signed byte, unless they were emitted through
//! [`InstructionEncoder::emit_branch_preserving`] in their long form.
//!
//! # Operands
//!
//! Resolved operands ([`Operand::Member`], [`Operand::String`], [`Operand::Signature`]) are
//! imported into the encoder's [`DynamicScope`], which hands out the tokens written into the
//! code. Raw [`Operand::Token`]s are written as is.
//!
//! # Examples
//!
//! ```rust
//! use dothook::assembly::InstructionEncoder;
//!
//! let mut encoder = InstructionEncoder::new();
//! encoder.emit_ldarg(0)?;
//! encoder.emit_branch("brtrue", "one")?;
//! encoder.emit_ldc_i4(0)?;
//! encoder.emit_ret(true)?;
//! encoder.define_label("one")?;
//! encoder.emit_ldc_i4(1)?;
//! encoder.emit_ret(true)?;
//!
//! let body = encoder.finalize()?;
//! // brtrue was shrunk to brtrue.s
//! assert_eq!(body.code, vec![0x02, 0x2D, 0x02, 0x16, 0x2A, 0x17, 0x2A]);
//! assert_eq!(body.max_stack, 1);
//! # Ok::<(), dothook::Error>(())
//! ```

use std::{
    collections::{HashMap, HashSet},
    sync::OnceLock,
};

use crate::{
    assembly::{
        instruction::{ExceptionMarker, FlowType, Immediate, Operand, OperandType},
        instructions::{CilInstruction, INSTRUCTIONS, INSTRUCTIONS_FE},
        opcodes,
    },
    metadata::{
        members::MemberRef,
        method::{ExceptionHandler, ExceptionHandlerFlags},
        scope::DynamicScope,
        token::Token,
        typesystem::TypeShape,
    },
    Error, Result,
};

type OpcodeEntry = (u8, u8, &'static CilInstruction<'static>);

static MNEMONIC_TO_OPCODE: OnceLock<HashMap<&'static str, OpcodeEntry>> = OnceLock::new();

fn get_mnemonic_lookup() -> &'static HashMap<&'static str, OpcodeEntry> {
    MNEMONIC_TO_OPCODE.get_or_init(|| {
        let mut map = HashMap::new();

        // Both tables hold at most 256 entries, the index always fits a byte
        #[allow(clippy::cast_possible_truncation)]
        for (opcode, instr) in INSTRUCTIONS.iter().enumerate() {
            if !instr.instr.is_empty() {
                map.insert(instr.instr, (opcode as u8, 0, instr));
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        for (opcode, instr) in INSTRUCTIONS_FE.iter().enumerate() {
            if !instr.instr.is_empty() {
                map.insert(instr.instr, (opcode as u8, opcodes::FE_PREFIX, instr));
            }
        }

        map
    })
}

fn lookup(mnemonic: &str) -> Result<OpcodeEntry> {
    get_mnemonic_lookup()
        .get(mnemonic)
        .copied()
        .ok_or_else(|| Error::InvalidMnemonic(mnemonic.to_string()))
}

/// Long and short forms of every branch
const BRANCH_FORMS: &[(&str, &str)] = &[
    ("br", "br.s"),
    ("brfalse", "brfalse.s"),
    ("brtrue", "brtrue.s"),
    ("beq", "beq.s"),
    ("bne.un", "bne.un.s"),
    ("bge", "bge.s"),
    ("bge.un", "bge.un.s"),
    ("bgt", "bgt.s"),
    ("bgt.un", "bgt.un.s"),
    ("ble", "ble.s"),
    ("ble.un", "ble.un.s"),
    ("blt", "blt.s"),
    ("blt.un", "blt.un.s"),
    ("leave", "leave.s"),
];

fn get_short_form_mnemonic(mnemonic: &str) -> Option<&'static str> {
    BRANCH_FORMS
        .iter()
        .find(|(long, _)| *long == mnemonic)
        .map(|(_, short)| *short)
}

fn get_long_form_mnemonic(mnemonic: &str) -> Option<&'static str> {
    BRANCH_FORMS
        .iter()
        .find(|(_, short)| *short == mnemonic)
        .map(|(long, _)| *long)
}

/// A branch operand waiting for its label.
#[derive(Debug, Clone)]
pub struct LabelFixup {
    /// Target label
    pub label: String,
    /// Position of the offset bytes
    pub fixup_position: usize,
    /// Size of the offset, 1 or 4 bytes
    pub offset_size: u8,
    /// Position of the branch opcode
    pub instruction_position: usize,
    /// Short form this branch may be shrunk to
    pub short_form_mnemonic: Option<&'static str>,
}

/// A switch table waiting for its labels.
#[derive(Debug, Clone)]
pub struct SwitchFixup {
    /// Target labels, in case order
    pub labels: Vec<String>,
    /// Position of the first offset
    pub fixup_position: usize,
    /// End of the switch instruction, offsets are relative to it
    pub instruction_end_position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClauseKind {
    Catch(Token),
    Filter,
    Finally,
    Fault,
}

/// One handler of an open or closed region, positions held as internal labels
#[derive(Debug, Clone)]
struct PendingClause {
    kind: ClauseKind,
    try_start: String,
    try_end: String,
    filter_start: Option<String>,
    handler_start: Option<String>,
    handler_end: Option<String>,
}

#[derive(Debug, Clone)]
struct OpenRegion {
    try_start: String,
    try_end: Option<String>,
    handlers: Vec<PendingClause>,
}

/// Output of [`InstructionEncoder::finalize`].
#[derive(Debug, Clone)]
pub struct EncodedBody {
    /// Code bytes, without header
    pub code: Vec<u8>,
    /// Maximum evaluation stack depth reached
    pub max_stack: u16,
    /// Final positions of all user labels
    pub labels: HashMap<String, u32>,
    /// Exception clauses, nested regions before the regions enclosing them
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Tokens referenced by the code
    pub scope: DynamicScope,
}

/// Label-based CIL emitter.
///
/// Tracks the evaluation stack as instructions are emitted. Underflow in reachable code and
/// mismatched depths at a label are reported as [`crate::Error::MalformedBody`].
pub struct InstructionEncoder {
    bytecode: Vec<u8>,
    labels: HashMap<String, u32>,
    fixups: Vec<LabelFixup>,
    switch_fixups: Vec<SwitchFixup>,
    current_stack_depth: i16,
    max_stack_depth: u16,
    label_stack_depths: HashMap<String, i16>,
    unreachable: bool,
    open_regions: Vec<OpenRegion>,
    clauses: Vec<PendingClause>,
    internal_labels: usize,
    scope: DynamicScope,
}

impl InstructionEncoder {
    /// Create an empty encoder with a fresh token scope
    #[must_use]
    pub fn new() -> Self {
        Self::with_scope(DynamicScope::new())
    }

    /// Create an empty encoder importing tokens into `scope`
    #[must_use]
    pub fn with_scope(scope: DynamicScope) -> Self {
        Self {
            bytecode: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            switch_fixups: Vec::new(),
            current_stack_depth: 0,
            max_stack_depth: 0,
            label_stack_depths: HashMap::new(),
            unreachable: false,
            open_regions: Vec::new(),
            clauses: Vec::new(),
            internal_labels: 0,
            scope,
        }
    }

    /// Emit an instruction by mnemonic.
    ///
    /// `call`, `callvirt`, `newobj` and `calli` take their stack effect from the resolved
    /// method or signature operand. With a raw token operand, use
    /// [`InstructionEncoder::emit_call`] instead.
    ///
    /// # Errors
    /// - [`crate::Error::InvalidMnemonic`] for unknown mnemonics
    /// - [`crate::Error::UnexpectedOperand`] / [`crate::Error::WrongOperandType`] if the
    ///   operand does not match the opcode
    /// - [`crate::Error::MalformedBody`] on stack underflow
    pub fn emit_instruction(&mut self, mnemonic: &str, operand: Option<Operand>) -> Result<()> {
        let (_, _, metadata) = lookup(mnemonic)?;

        let (pops, pushes) = if metadata.has_variable_stack() {
            call_effect(mnemonic, operand.as_ref())?
        } else {
            (
                u16::from(metadata.stack_pops),
                u16::from(metadata.stack_pushes),
            )
        };

        self.emit_with_effect(mnemonic, operand, pops, pushes)
    }

    /// Emit a call-like instruction with an explicit stack effect.
    ///
    /// # Arguments
    /// * `mnemonic` - The instruction to emit
    /// * `operand` - Its operand
    /// * `num_args` - Values popped, receiver and function pointer included
    /// * `has_result` - Whether a value is pushed
    ///
    /// # Errors
    /// Same as [`InstructionEncoder::emit_instruction`].
    pub fn emit_call(
        &mut self,
        mnemonic: &str,
        operand: Option<Operand>,
        num_args: u16,
        has_result: bool,
    ) -> Result<()> {
        self.emit_with_effect(mnemonic, operand, num_args, u16::from(has_result))
    }

    /// Emit `ret`, popping the return value if there is one
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedBody`] on stack underflow.
    pub fn emit_ret(&mut self, returns_value: bool) -> Result<()> {
        self.emit_with_effect("ret", None, u16::from(returns_value), 0)
    }

    fn emit_with_effect(
        &mut self,
        mnemonic: &str,
        operand: Option<Operand>,
        pops: u16,
        pushes: u16,
    ) -> Result<()> {
        let (opcode, prefix, metadata) = lookup(mnemonic)?;

        if metadata.is_branch() {
            return Err(Error::InvalidBranch(format!(
                "'{mnemonic}' must be emitted through emit_branch"
            )));
        }

        if prefix != 0 {
            self.bytecode.push(prefix);
        }
        self.bytecode.push(opcode);

        self.emit_operand(mnemonic, operand, metadata.op_type)?;

        self.update_stack_depth(pops, pushes)
            .map_err(|e| malformed_error!("Stack error at instruction '{}': {}", mnemonic, e))?;

        // No fall-through, code continues only at a label
        if matches!(
            metadata.flow,
            FlowType::Return | FlowType::Throw | FlowType::EndFinally
        ) {
            self.unreachable = true;
        }

        Ok(())
    }

    /// Emit a branch to `label`.
    ///
    /// Long forms with a short counterpart are shrunk during finalization if the offset fits.
    ///
    /// # Errors
    /// - [`crate::Error::InvalidMnemonic`] for unknown mnemonics
    /// - [`crate::Error::InvalidBranch`] if the mnemonic is not a branch
    /// - [`crate::Error::MalformedBody`] on stack underflow or a depth mismatch at `label`
    pub fn emit_branch(&mut self, mnemonic: &str, label: &str) -> Result<()> {
        let short_form = get_short_form_mnemonic(mnemonic);
        self.emit_branch_with(mnemonic, label, short_form)
    }

    /// Emit a branch that keeps its original form where possible.
    ///
    /// Short forms are emitted long and shrunk back if the offset still fits, long forms stay
    /// long. Re-encoding an unmodified body this way yields the original branch layout.
    ///
    /// # Errors
    /// Same as [`InstructionEncoder::emit_branch`].
    pub fn emit_branch_preserving(&mut self, mnemonic: &str, label: &str) -> Result<()> {
        match get_long_form_mnemonic(mnemonic) {
            Some(long) => self.emit_branch_with(long, label, Some(mnemonic_static(mnemonic)?)),
            None => self.emit_branch_with(mnemonic, label, None),
        }
    }

    fn emit_branch_with(
        &mut self,
        mnemonic: &str,
        label: &str,
        short_form_mnemonic: Option<&'static str>,
    ) -> Result<()> {
        let (opcode, prefix, metadata) = lookup(mnemonic)?;

        if !metadata.is_branch() {
            return Err(Error::InvalidBranch(format!(
                "instruction '{mnemonic}' is not a branch instruction"
            )));
        }

        let instruction_start = self.bytecode.len();
        if prefix != 0 {
            self.bytecode.push(prefix);
        }
        self.bytecode.push(opcode);

        let offset_size: u8 = match metadata.op_type {
            OperandType::Int8 => 1,
            _ => 4,
        };

        self.fixups.push(LabelFixup {
            label: label.to_string(),
            fixup_position: self.bytecode.len(),
            offset_size,
            instruction_position: instruction_start,
            short_form_mnemonic: if offset_size == 4 {
                short_form_mnemonic
            } else {
                None
            },
        });
        self.bytecode
            .extend(std::iter::repeat(0).take(offset_size as usize));

        self.update_stack_depth(
            u16::from(metadata.stack_pops),
            u16::from(metadata.stack_pushes),
        )
        .map_err(|e| {
            malformed_error!("Stack error at branch '{}' to '{}': {}", mnemonic, label, e)
        })?;

        // The target sees the depth after the condition was popped
        self.record_label_stack_depth(label)?;

        if matches!(
            metadata.flow,
            FlowType::UnconditionalBranch | FlowType::Leave
        ) {
            self.unreachable = true;
        }

        Ok(())
    }

    /// Emit a `switch` over `labels`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidBranch`] for an empty table, or
    /// [`crate::Error::MalformedBody`] on stack underflow or a depth mismatch at a target.
    pub fn emit_switch(&mut self, labels: &[&str]) -> Result<()> {
        if labels.is_empty() {
            return Err(Error::InvalidBranch(
                "switch must have at least one target".to_string(),
            ));
        }

        self.bytecode.push(opcodes::SWITCH);

        let num_targets =
            u32::try_from(labels.len()).map_err(|_| malformed_error!("Too many switch targets"))?;
        self.bytecode.extend_from_slice(&num_targets.to_le_bytes());

        let fixup_position = self.bytecode.len();
        self.bytecode
            .extend(std::iter::repeat(0).take(labels.len() * 4));

        self.switch_fixups.push(SwitchFixup {
            labels: labels.iter().map(|s| (*s).to_string()).collect(),
            fixup_position,
            instruction_end_position: self.bytecode.len(),
        });

        self.update_stack_depth(1, 0)
            .map_err(|e| malformed_error!("Stack error at 'switch': {}", e))?;

        for label in labels {
            self.record_label_stack_depth(label)?;
        }

        Ok(())
    }

    /// Emit the shortest `ldarg` form for `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedBody`] on stack errors.
    pub fn emit_ldarg(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("ldarg.0", None),
            1 => self.emit_instruction("ldarg.1", None),
            2 => self.emit_instruction("ldarg.2", None),
            3 => self.emit_instruction("ldarg.3", None),
            x if x <= 255 => self.emit_instruction("ldarg.s", Some(Operand::Argument(x))),
            x => self.emit_instruction("ldarg", Some(Operand::Argument(x))),
        }
    }

    /// Emit the shortest `ldloc` form for `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedBody`] on stack errors.
    pub fn emit_ldloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("ldloc.0", None),
            1 => self.emit_instruction("ldloc.1", None),
            2 => self.emit_instruction("ldloc.2", None),
            3 => self.emit_instruction("ldloc.3", None),
            x if x <= 255 => self.emit_instruction("ldloc.s", Some(Operand::Local(x))),
            x => self.emit_instruction("ldloc", Some(Operand::Local(x))),
        }
    }

    /// Emit the shortest `stloc` form for `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedBody`] on stack underflow.
    pub fn emit_stloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("stloc.0", None),
            1 => self.emit_instruction("stloc.1", None),
            2 => self.emit_instruction("stloc.2", None),
            3 => self.emit_instruction("stloc.3", None),
            x if x <= 255 => self.emit_instruction("stloc.s", Some(Operand::Local(x))),
            x => self.emit_instruction("stloc", Some(Operand::Local(x))),
        }
    }

    /// Emit the shortest `starg` form for `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedBody`] on stack underflow.
    pub fn emit_starg(&mut self, index: u16) -> Result<()> {
        if index <= 255 {
            self.emit_instruction("starg.s", Some(Operand::Argument(index)))
        } else {
            self.emit_instruction("starg", Some(Operand::Argument(index)))
        }
    }

    /// Emit the shortest `ldarga` form for `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedBody`] on stack errors.
    pub fn emit_ldarga(&mut self, index: u16) -> Result<()> {
        if index <= 255 {
            self.emit_instruction("ldarga.s", Some(Operand::Argument(index)))
        } else {
            self.emit_instruction("ldarga", Some(Operand::Argument(index)))
        }
    }

    /// Emit the shortest `ldloca` form for `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedBody`] on stack errors.
    pub fn emit_ldloca(&mut self, index: u16) -> Result<()> {
        if index <= 255 {
            self.emit_instruction("ldloca.s", Some(Operand::Local(index)))
        } else {
            self.emit_instruction("ldloca", Some(Operand::Local(index)))
        }
    }

    /// Emit the shortest `ldc.i4` form for `value`
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedBody`] on stack errors.
    pub fn emit_ldc_i4(&mut self, value: i32) -> Result<()> {
        match value {
            -1 => self.emit_instruction("ldc.i4.m1", None),
            0 => self.emit_instruction("ldc.i4.0", None),
            1 => self.emit_instruction("ldc.i4.1", None),
            2 => self.emit_instruction("ldc.i4.2", None),
            3 => self.emit_instruction("ldc.i4.3", None),
            4 => self.emit_instruction("ldc.i4.4", None),
            5 => self.emit_instruction("ldc.i4.5", None),
            6 => self.emit_instruction("ldc.i4.6", None),
            7 => self.emit_instruction("ldc.i4.7", None),
            8 => self.emit_instruction("ldc.i4.8", None),
            x => match i8::try_from(x) {
                Ok(byte) => {
                    self.emit_instruction("ldc.i4.s", Some(Operand::Immediate(Immediate::Int8(byte))))
                }
                Err(_) => {
                    self.emit_instruction("ldc.i4", Some(Operand::Immediate(Immediate::Int32(x))))
                }
            },
        }
    }

    /// Define `name` at the current position.
    ///
    /// All paths reaching a label must agree on the stack depth. After an unconditional
    /// transfer the depth is taken from earlier branches to the label, or reset to zero.
    ///
    /// # Errors
    /// - [`crate::Error::DuplicateLabel`] if `name` is already defined
    /// - [`crate::Error::MalformedBody`] if the fall-through depth differs from a branch's
    pub fn define_label(&mut self, name: &str) -> Result<()> {
        if self.labels.contains_key(name) {
            return Err(Error::DuplicateLabel(name.to_string()));
        }

        if let Some(&expected) = self.label_stack_depths.get(name) {
            if self.unreachable {
                self.current_stack_depth = expected;
            } else if self.current_stack_depth != expected {
                return Err(malformed_error!(
                    "Stack depth mismatch at label '{}': expected {} (from branch), got {} (current)",
                    name,
                    expected,
                    self.current_stack_depth
                ));
            }
        } else if !self.unreachable {
            self.label_stack_depths
                .insert(name.to_string(), self.current_stack_depth);
        } else {
            // Depth of dead code must not leak into the code following the label
            self.current_stack_depth = 0;
        }

        self.unreachable = false;

        let position = self.current_position()?;
        self.labels.insert(name.to_string(), position);
        Ok(())
    }

    /// Current code size in bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedBody`] past 4 GiB of code.
    pub fn current_position(&self) -> Result<u32> {
        u32::try_from(self.bytecode.len())
            .map_err(|_| malformed_error!("Bytecode length exceeds u32 range"))
    }

    /// Position of a defined label (before branch shrinking)
    #[must_use]
    pub fn label_offset(&self, name: &str) -> Option<u32> {
        self.labels.get(name).copied()
    }

    /// Highest stack depth seen so far
    #[must_use]
    pub fn max_stack_depth(&self) -> u16 {
        self.max_stack_depth
    }

    /// Stack depth at the current position
    #[must_use]
    pub fn current_stack_depth(&self) -> i16 {
        self.current_stack_depth
    }

    /// Override the current stack depth
    pub fn set_stack_depth(&mut self, depth: i16) {
        self.current_stack_depth = depth;
        if let Ok(depth) = u16::try_from(depth) {
            self.max_stack_depth = self.max_stack_depth.max(depth);
        }
    }

    /// The token scope operands are imported into
    #[must_use]
    pub fn scope(&self) -> &DynamicScope {
        &self.scope
    }

    /// Mutable access to the token scope
    pub fn scope_mut(&mut self) -> &mut DynamicScope {
        &mut self.scope
    }

    /// Open a protected region at the current position
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedBody`] past 4 GiB of code.
    pub fn begin_try(&mut self) -> Result<()> {
        let try_start = self.mark_position()?;
        self.open_regions.push(OpenRegion {
            try_start,
            try_end: None,
            handlers: Vec::new(),
        });
        Ok(())
    }

    /// Start a catch handler for `caught` in the innermost region
    ///
    /// # Errors
    /// Returns [`crate::Error::UnbalancedRegion`] if no region is open.
    pub fn begin_catch(&mut self, caught: &TypeShape) -> Result<()> {
        let token = self.scope.import_type(caught);
        self.begin_handler(ClauseKind::Catch(token))?;
        self.enter_handler(1);
        Ok(())
    }

    /// Start a filter expression in the innermost region
    ///
    /// # Errors
    /// Returns [`crate::Error::UnbalancedRegion`] if no region is open.
    pub fn begin_filter(&mut self) -> Result<()> {
        self.begin_handler(ClauseKind::Filter)?;
        self.enter_handler(1);
        Ok(())
    }

    /// Start the handler guarded by the current filter
    ///
    /// # Errors
    /// Returns [`crate::Error::UnbalancedRegion`] unless a filter expression is open.
    pub fn begin_filter_handler(&mut self) -> Result<()> {
        let label = self.mark_position()?;
        let pending = self
            .open_regions
            .last_mut()
            .and_then(|region| region.handlers.last_mut())
            .filter(|clause| clause.kind == ClauseKind::Filter && clause.handler_start.is_none())
            .ok_or_else(|| Error::UnbalancedRegion("filter handler without filter".to_string()))?;
        pending.handler_start = Some(label);
        self.enter_handler(1);
        Ok(())
    }

    /// Start a finally handler in the innermost region
    ///
    /// # Errors
    /// Returns [`crate::Error::UnbalancedRegion`] if no region is open.
    pub fn begin_finally(&mut self) -> Result<()> {
        self.begin_handler(ClauseKind::Finally)?;
        self.enter_handler(0);
        Ok(())
    }

    /// Start a fault handler in the innermost region
    ///
    /// # Errors
    /// Returns [`crate::Error::UnbalancedRegion`] if no region is open.
    pub fn begin_fault(&mut self) -> Result<()> {
        self.begin_handler(ClauseKind::Fault)?;
        self.enter_handler(0);
        Ok(())
    }

    /// Close the innermost region after its last handler
    ///
    /// # Errors
    /// Returns [`crate::Error::UnbalancedRegion`] if no region is open, the region has no
    /// handler, or a filter never got its handler.
    pub fn end_try(&mut self) -> Result<()> {
        let end = self.mark_position()?;
        let mut region = self
            .open_regions
            .pop()
            .ok_or_else(|| Error::UnbalancedRegion("end of region without try".to_string()))?;

        let Some(last) = region.handlers.last_mut() else {
            return Err(Error::UnbalancedRegion(
                "protected region without handler".to_string(),
            ));
        };
        last.handler_end = Some(end);

        if region.handlers.iter().any(|c| c.handler_start.is_none()) {
            return Err(Error::UnbalancedRegion(
                "filter without handler".to_string(),
            ));
        }

        self.clauses.append(&mut region.handlers);
        Ok(())
    }

    /// Apply a decoded exception marker at the current position
    ///
    /// # Errors
    /// Returns [`crate::Error::UnbalancedRegion`] if the marker does not fit the open regions.
    pub fn mark(&mut self, marker: &ExceptionMarker) -> Result<()> {
        match marker {
            ExceptionMarker::BeginTry => self.begin_try(),
            ExceptionMarker::EndTry => self.end_try(),
            ExceptionMarker::BeginFilter => self.begin_filter(),
            ExceptionMarker::BeginFilterHandler => self.begin_filter_handler(),
            ExceptionMarker::BeginFinally => self.begin_finally(),
            ExceptionMarker::BeginCatch(caught) => self.begin_catch(caught),
            ExceptionMarker::BeginFault => self.begin_fault(),
        }
    }

    /// Number of regions not yet closed
    #[must_use]
    pub fn open_region_count(&self) -> usize {
        self.open_regions.len()
    }

    fn mark_position(&mut self) -> Result<String> {
        let name = format!("$region{}", self.internal_labels);
        self.internal_labels += 1;
        let position = self.current_position()?;
        self.labels.insert(name.clone(), position);
        Ok(name)
    }

    fn begin_handler(&mut self, kind: ClauseKind) -> Result<()> {
        let here = self.mark_position()?;
        let region = self
            .open_regions
            .last_mut()
            .ok_or_else(|| Error::UnbalancedRegion("handler outside of a region".to_string()))?;

        let try_end = region.try_end.get_or_insert_with(|| here.clone()).clone();
        if let Some(previous) = region.handlers.last_mut() {
            previous.handler_end = Some(here.clone());
        }

        let (filter_start, handler_start) = match kind {
            ClauseKind::Filter => (Some(here), None),
            _ => (None, Some(here)),
        };
        region.handlers.push(PendingClause {
            kind,
            try_start: region.try_start.clone(),
            try_end,
            filter_start,
            handler_start,
            handler_end: None,
        });
        Ok(())
    }

    fn enter_handler(&mut self, depth: i16) {
        // Handlers are entered by the runtime with the exception (or nothing) on the stack
        self.unreachable = false;
        self.set_stack_depth(depth);
    }

    fn ensure_method_terminated(&mut self) -> Result<()> {
        let Some(&last_byte) = self.bytecode.last() else {
            return Ok(());
        };

        let len = self.bytecode.len();
        let ends_with_terminator = matches!(
            last_byte,
            opcodes::RET | opcodes::THROW | opcodes::ENDFINALLY | opcodes::JMP
        ) || (len >= 2
            && self.bytecode[len - 2] == opcodes::FE_PREFIX
            && last_byte == opcodes::FE_RETHROW);

        if ends_with_terminator {
            return Ok(());
        }

        // A label at the very end needs an instruction to land on
        let has_branch_to_end = self.fixups.iter().any(|fixup| {
            self.labels
                .get(&fixup.label)
                .is_some_and(|&position| position as usize >= len)
        });

        if has_branch_to_end {
            self.emit_ret(false)?;
        }

        Ok(())
    }

    /// Resolve labels, shrink branches and build the exception clauses.
    ///
    /// # Errors
    /// - [`crate::Error::UnbalancedRegion`] if a region is still open
    /// - [`crate::Error::UndefinedLabel`] if a branch targets an undefined label
    /// - [`crate::Error::InvalidBranch`] if a short branch cannot reach its target
    pub fn finalize(mut self) -> Result<EncodedBody> {
        if !self.open_regions.is_empty() {
            return Err(Error::UnbalancedRegion(format!(
                "{} region(s) not closed",
                self.open_regions.len()
            )));
        }

        self.ensure_method_terminated()?;
        self.optimize_branch_forms()?;

        let fixups = std::mem::take(&mut self.fixups);
        for fixup in &fixups {
            let label_position = self.resolve_label(&fixup.label)?;
            let next_instruction_pos = fixup.fixup_position + fixup.offset_size as usize;
            let offset = relative_offset(label_position, next_instruction_pos)?;
            self.write_branch_offset(offset, fixup)?;
        }

        let switch_fixups = std::mem::take(&mut self.switch_fixups);
        for switch_fixup in &switch_fixups {
            for (i, label) in switch_fixup.labels.iter().enumerate() {
                let label_position = self.resolve_label(label)?;
                let offset =
                    relative_offset(label_position, switch_fixup.instruction_end_position)?;
                let target_pos = switch_fixup.fixup_position + i * 4;
                self.bytecode[target_pos..target_pos + 4].copy_from_slice(&offset.to_le_bytes());
            }
        }

        let exception_handlers = self
            .clauses
            .iter()
            .map(|clause| self.build_clause(clause))
            .collect::<Result<Vec<_>>>()?;

        self.labels.retain(|name, _| !name.starts_with("$region"));

        Ok(EncodedBody {
            code: self.bytecode,
            max_stack: self.max_stack_depth,
            labels: self.labels,
            exception_handlers,
            scope: self.scope,
        })
    }

    fn resolve_label(&self, label: &str) -> Result<u32> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| Error::UndefinedLabel(label.to_string()))
    }

    fn build_clause(&self, clause: &PendingClause) -> Result<ExceptionHandler> {
        let position = |label: &Option<String>| -> Result<u32> {
            match label {
                Some(label) => self.resolve_label(label),
                None => Err(Error::UnbalancedRegion("handler never closed".to_string())),
            }
        };

        let try_offset = self.resolve_label(&clause.try_start)?;
        let try_end = self.resolve_label(&clause.try_end)?;
        let handler_offset = position(&clause.handler_start)?;
        let handler_end = position(&clause.handler_end)?;

        let (flags, filter_offset) = match clause.kind {
            ClauseKind::Catch(token) => (ExceptionHandlerFlags::EXCEPTION, token.value()),
            ClauseKind::Filter => (
                ExceptionHandlerFlags::FILTER,
                position(&clause.filter_start)?,
            ),
            ClauseKind::Finally => (ExceptionHandlerFlags::FINALLY, 0),
            ClauseKind::Fault => (ExceptionHandlerFlags::FAULT, 0),
        };

        Ok(ExceptionHandler {
            flags,
            try_offset,
            try_length: try_end - try_offset,
            handler_offset,
            handler_length: handler_end - handler_offset,
            filter_offset,
        })
    }

    fn optimize_branch_forms(&mut self) -> Result<()> {
        const MAX_ITERATIONS: usize = 100;

        for _ in 0..MAX_ITERATIONS {
            let shrinkable = self.find_shrinkable_branches()?;
            if shrinkable.is_empty() {
                break;
            }
            self.apply_branch_shrinking(&shrinkable)?;
        }

        Ok(())
    }

    fn find_shrinkable_branches(&self) -> Result<Vec<usize>> {
        let mut shrinkable = Vec::new();

        for (idx, fixup) in self.fixups.iter().enumerate() {
            if fixup.offset_size != 4 || fixup.short_form_mnemonic.is_none() {
                continue;
            }

            let label_position = self.resolve_label(&fixup.label)?;

            // Shrinking only moves code closer together, so an offset that fits now keeps
            // fitting once other branches are shrunk too
            let offset = relative_offset(label_position, fixup.instruction_position + 2)?;
            if (-128..=127).contains(&offset) {
                shrinkable.push(idx);
            }
        }

        Ok(shrinkable)
    }

    fn apply_branch_shrinking(&mut self, shrinkable: &[usize]) -> Result<()> {
        let shrinkable_set: HashSet<usize> = shrinkable.iter().copied().collect();

        // (end of the shrunk branch in the old layout, bytes saved up to and including it)
        let mut thresholds: Vec<(usize, usize)> = Vec::with_capacity(shrinkable.len());
        let mut saved = 0usize;
        for &idx in shrinkable {
            let fixup = &self.fixups[idx];
            saved += 3;
            thresholds.push((fixup.fixup_position + 4, saved));
        }

        let adjust_position = |pos: usize| -> usize {
            let delta = thresholds
                .iter()
                .take_while(|(threshold, _)| pos >= *threshold)
                .last()
                .map_or(0, |(_, saved)| *saved);
            pos - delta
        };

        let mut new_bytecode = Vec::with_capacity(self.bytecode.len());
        let mut src_pos = 0usize;
        for &idx in shrinkable {
            let fixup = &self.fixups[idx];
            new_bytecode.extend_from_slice(&self.bytecode[src_pos..fixup.instruction_position]);

            let short_mnemonic = fixup.short_form_mnemonic.ok_or_else(|| {
                Error::InvalidMnemonic("missing short form for shrinkable branch".to_string())
            })?;
            let (opcode, prefix, _) = lookup(short_mnemonic)?;
            if prefix != 0 {
                new_bytecode.push(prefix);
            }
            new_bytecode.push(opcode);
            new_bytecode.push(0);

            src_pos = fixup.fixup_position + 4;
        }
        new_bytecode.extend_from_slice(&self.bytecode[src_pos..]);

        for pos in self.labels.values_mut() {
            *pos = u32::try_from(adjust_position(*pos as usize))
                .map_err(|_| malformed_error!("Label position exceeds u32 range"))?;
        }

        for (idx, fixup) in self.fixups.iter_mut().enumerate() {
            let opcode_len = fixup.fixup_position - fixup.instruction_position;
            fixup.instruction_position = adjust_position(fixup.instruction_position);

            if shrinkable_set.contains(&idx) {
                fixup.fixup_position = fixup.instruction_position + opcode_len;
                fixup.offset_size = 1;
                fixup.short_form_mnemonic = None;
            } else {
                fixup.fixup_position = adjust_position(fixup.fixup_position);
            }
        }

        for switch_fixup in &mut self.switch_fixups {
            switch_fixup.fixup_position = adjust_position(switch_fixup.fixup_position);
            switch_fixup.instruction_end_position =
                adjust_position(switch_fixup.instruction_end_position);
        }

        self.bytecode = new_bytecode;
        Ok(())
    }

    fn emit_operand(
        &mut self,
        mnemonic: &str,
        operand: Option<Operand>,
        expected: OperandType,
    ) -> Result<()> {
        let wrong = |expected: &str| Error::WrongOperandType {
            expected: expected.to_string(),
        };

        match (expected, operand) {
            (OperandType::None, None | Some(Operand::None)) => {}
            (OperandType::None, Some(_)) => return Err(Error::UnexpectedOperand),
            (OperandType::Int8, Some(Operand::Immediate(Immediate::Int8(value)))) => {
                self.bytecode.extend_from_slice(&value.to_le_bytes());
            }
            (OperandType::UInt8, Some(Operand::Immediate(Immediate::UInt8(value)))) => {
                self.bytecode.push(value);
            }
            (OperandType::Int32, Some(Operand::Immediate(Immediate::Int32(value)))) => {
                self.bytecode.extend_from_slice(&value.to_le_bytes());
            }
            (OperandType::Int64, Some(Operand::Immediate(Immediate::Int64(value)))) => {
                self.bytecode.extend_from_slice(&value.to_le_bytes());
            }
            (OperandType::Float32, Some(Operand::Immediate(Immediate::Float32(value)))) => {
                self.bytecode.extend_from_slice(&value.to_le_bytes());
            }
            (OperandType::Float64, Some(Operand::Immediate(Immediate::Float64(value)))) => {
                self.bytecode.extend_from_slice(&value.to_le_bytes());
            }
            (
                OperandType::ShortVariable,
                Some(operand @ (Operand::Local(_) | Operand::Argument(_))),
            ) => {
                let index = variable_index(mnemonic, &operand)?;
                let index = u8::try_from(index).map_err(|_| wrong("8-bit index"))?;
                self.bytecode.push(index);
            }
            (OperandType::Variable, Some(operand @ (Operand::Local(_) | Operand::Argument(_)))) => {
                let index = variable_index(mnemonic, &operand)?;
                self.bytecode.extend_from_slice(&index.to_le_bytes());
            }
            (OperandType::String, Some(Operand::String(value))) => {
                let token = self.scope.import_string(&value);
                self.bytecode.extend_from_slice(&token.value().to_le_bytes());
            }
            (OperandType::Signature, Some(Operand::Signature(signature))) => {
                let token = self.scope.import_signature(&signature);
                self.bytecode.extend_from_slice(&token.value().to_le_bytes());
            }
            (OperandType::Field, Some(Operand::Member(member @ MemberRef::Field(_))))
            | (OperandType::Method, Some(Operand::Member(member @ MemberRef::Method(_))))
            | (OperandType::Type, Some(Operand::Member(member @ MemberRef::Type(_))))
            | (OperandType::Token, Some(Operand::Member(member))) => {
                let token = self.scope.import_member(&member);
                self.bytecode.extend_from_slice(&token.value().to_le_bytes());
            }
            (op_type, Some(Operand::Token(token))) if op_type.is_token() => {
                self.bytecode.extend_from_slice(&token.value().to_le_bytes());
            }
            (OperandType::Switch, _) => {
                return Err(Error::InvalidBranch(
                    "switch must be emitted through emit_switch".to_string(),
                ))
            }
            (expected, _) => return Err(wrong(&format!("{expected:?}"))),
        }

        Ok(())
    }

    fn write_branch_offset(&mut self, offset: i32, fixup: &LabelFixup) -> Result<()> {
        match fixup.offset_size {
            1 => {
                let offset_i8 = i8::try_from(offset).map_err(|_| {
                    Error::InvalidBranch(format!(
                        "offset {offset} to '{}' out of range for a short branch",
                        fixup.label
                    ))
                })?;
                self.bytecode[fixup.fixup_position] = offset_i8.to_le_bytes()[0];
            }
            4 => {
                self.bytecode[fixup.fixup_position..fixup.fixup_position + 4]
                    .copy_from_slice(&offset.to_le_bytes());
            }
            size => {
                return Err(Error::InvalidBranch(format!(
                    "invalid offset size: {size} bytes"
                )))
            }
        }
        Ok(())
    }

    fn update_stack_depth(&mut self, pops: u16, pushes: u16) -> Result<()> {
        let pops = i16::try_from(pops).map_err(|_| malformed_error!("Too many values popped"))?;
        let pushes =
            i16::try_from(pushes).map_err(|_| malformed_error!("Too many values pushed"))?;
        self.current_stack_depth += pushes - pops;

        // Depth is meaningless in unreachable code, it is reset at the next label
        if self.current_stack_depth < 0 && !self.unreachable {
            return Err(malformed_error!(
                "Stack underflow: depth became {} after instruction with {} pops, {} pushes",
                self.current_stack_depth,
                pops,
                pushes
            ));
        }
        if self.current_stack_depth < 0 {
            self.current_stack_depth = 0;
        }

        let current_depth = u16::try_from(self.current_stack_depth)
            .map_err(|_| malformed_error!("Stack depth exceeds u16 range"))?;
        self.max_stack_depth = self.max_stack_depth.max(current_depth);

        Ok(())
    }

    fn record_label_stack_depth(&mut self, label: &str) -> Result<()> {
        if self.unreachable {
            return Ok(());
        }

        if let Some(&expected) = self.label_stack_depths.get(label) {
            if self.current_stack_depth != expected {
                return Err(malformed_error!(
                    "Stack depth mismatch for branch to '{}': expected {}, but branch has {}",
                    label,
                    expected,
                    self.current_stack_depth
                ));
            }
        } else {
            self.label_stack_depths
                .insert(label.to_string(), self.current_stack_depth);
        }
        Ok(())
    }
}

impl Default for InstructionEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn mnemonic_static(mnemonic: &str) -> Result<&'static str> {
    get_mnemonic_lookup()
        .get_key_value(mnemonic)
        .map(|(name, _)| *name)
        .ok_or_else(|| Error::InvalidMnemonic(mnemonic.to_string()))
}

fn variable_index(mnemonic: &str, operand: &Operand) -> Result<u16> {
    let wants_argument = mnemonic.contains("arg");
    match operand {
        Operand::Argument(index) if wants_argument => Ok(*index),
        Operand::Local(index) if !wants_argument => Ok(*index),
        _ => Err(Error::WrongOperandType {
            expected: if wants_argument {
                "argument index".to_string()
            } else {
                "local index".to_string()
            },
        }),
    }
}

fn relative_offset(target: u32, from: usize) -> Result<i32> {
    let target = i64::from(target);
    let from = i64::try_from(from).map_err(|_| malformed_error!("Position exceeds i64 range"))?;
    i32::try_from(target - from).map_err(|_| malformed_error!("Branch offset exceeds i32 range"))
}

/// Stack effect of a call-like instruction from its resolved operand
fn call_effect(mnemonic: &str, operand: Option<&Operand>) -> Result<(u16, u16)> {
    let narrow = |count: u32| {
        u16::try_from(count).map_err(|_| malformed_error!("Too many arguments for '{}'", mnemonic))
    };

    match (mnemonic, operand) {
        ("call" | "callvirt", Some(Operand::Member(MemberRef::Method(method)))) => Ok((
            narrow(method.signature.call_pops())?,
            narrow(method.signature.call_pushes())?,
        )),
        ("newobj", Some(Operand::Member(MemberRef::Method(method)))) => {
            let params = u32::try_from(method.signature.params.len())
                .map_err(|_| malformed_error!("Too many arguments for 'newobj'"))?;
            Ok((narrow(params)?, 1))
        }
        ("calli", Some(Operand::Signature(signature))) => Ok((
            narrow(signature.call_pops() + 1)?,
            narrow(signature.call_pushes())?,
        )),
        ("ret", None | Some(Operand::None)) => Ok((0, 0)),
        _ => Err(Error::WrongOperandType {
            expected: format!("a resolved signature for '{mnemonic}', or use emit_call"),
        }),
    }
}
