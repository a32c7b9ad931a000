//! Synthesis of the replacement routine.
//!
//! [`HookCompiler`] re-emits a routine's decoded body between its prefix and postfix calls.
//! The generated routine has this layout:
//!
//! ```text
//! [out params zeroed, object[] built]      if any hook declares the argument array
//! prefix calls                             bool results go to the skip flag
//! ldloc run; brfalse EXIT                  if any prefix returns bool
//! original body                            every ret becomes stloc result; br EXIT
//! EXIT:
//! postfix calls
//! ldloc result; ret
//! ```
//!
//! The original locals keep their slots, the synthetic locals are appended after them. The
//! result is a static routine: instance routines get their receiver as argument 0, by
//! reference for value types.

use std::collections::HashSet;

use log::debug;

use crate::{
    assembly::{
        decode_body, Immediate, Instruction, InstructionEncoder, InstructionList, Operand,
    },
    hook::{
        binding::{
            emit_load_indirect, emit_store_indirect, needs_boxing, type_operand,
            uses_object_ops, ArgumentBinder, BindingSlots,
        },
        hook::{HookKind, HookRc},
        options::NamingOptions,
    },
    metadata::{
        members::MemberRef,
        method::{encode_method_body, ExceptionHandler},
        routine::{Routine, RoutineBody},
        scope::DynamicScope,
        signatures::SignatureMethod,
        typesystem::{corlib, GenericContext, TypeShape},
    },
    Error, Result,
};

const EXIT_LABEL: &str = "$exit";

/// A synthesized routine, ready to be handed to the runtime.
#[derive(Debug, Clone)]
pub struct CompiledRoutine {
    /// Name for the runtime, derived from the original
    pub name: String,
    /// Static signature: receiver first for instance routines, then the original parameters
    pub signature: SignatureMethod,
    /// Parameter names, in signature order
    pub param_names: Vec<String>,
    /// Local slots, original locals first
    pub locals: Vec<TypeShape>,
    /// CIL code
    pub code: Vec<u8>,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Exception clauses, inner regions first
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Tokens referenced by `code`
    pub scope: DynamicScope,
}

impl CompiledRoutine {
    /// Encode as a method body with header and exception section.
    ///
    /// Locals are zero-initialized whenever there are any, the skipped original relies on it.
    ///
    /// # Arguments
    /// * `local_var_sig_token` - Token under which the host registered [`Self::locals`]
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if the code does not fit a method body.
    pub fn to_body_bytes(&self, local_var_sig_token: u32) -> Result<Vec<u8>> {
        encode_method_body(
            &self.code,
            self.max_stack,
            local_var_sig_token,
            !self.locals.is_empty(),
            &self.exception_handlers,
        )
    }

    /// The same code as a [`RoutineBody`]
    #[must_use]
    pub fn to_routine_body(&self) -> RoutineBody {
        RoutineBody {
            code: self.code.clone(),
            locals: self.locals.clone(),
            exception_handlers: self.exception_handlers.clone(),
            max_stack: self.max_stack,
            init_locals: !self.locals.is_empty(),
            local_var_sig_token: 0,
        }
    }

    /// Decode the generated code against its own token scope
    ///
    /// # Errors
    /// Returns an error if the code does not decode, which indicates a compiler bug.
    pub fn decode(&self) -> Result<InstructionList> {
        decode_body(
            &self.code,
            &self.exception_handlers,
            &self.scope,
            &GenericContext::default(),
        )
    }

    /// Disassembly listing of the generated code
    ///
    /// # Errors
    /// Same as [`CompiledRoutine::decode`].
    pub fn listing(&self) -> Result<String> {
        Ok(self.decode()?.to_string())
    }
}

/// What happens to the original `ret` instructions
#[derive(Debug, Clone, Copy)]
enum Returns {
    /// Kept as is
    Keep,
    /// Stored into the result local (if any) followed by a jump to the exit label
    Redirect(Option<u16>),
}

/// Encoder plus the growing local list of one routine
struct RoutineBuilder {
    encoder: InstructionEncoder,
    locals: Vec<TypeShape>,
}

impl RoutineBuilder {
    fn new(locals: Vec<TypeShape>) -> Self {
        RoutineBuilder {
            encoder: InstructionEncoder::new(),
            locals,
        }
    }

    fn declare_local(&mut self, shape: TypeShape) -> Result<u16> {
        let index = u16::try_from(self.locals.len())
            .map_err(|_| malformed_error!("Too many locals"))?;
        self.locals.push(shape);
        Ok(index)
    }
}

/// Builds the replacement body of one routine.
///
/// # Examples
///
/// ```rust
/// use dothook::{
///     assembly::decode_body,
///     hook::{HookCompiler, NamingOptions},
///     metadata::{
///         routine::{Parameter, Routine, RoutineBody, RoutineId},
///         token::Token,
///         typesystem::{TypeRef, TypeShape},
///         SymbolTable,
///     },
/// };
///
/// let add = Routine::new(RoutineId(1), "Add", TypeRef::class(Token(0x0200_0002), "Demo", "Calc"))
///     .returning(TypeShape::I4)
///     .with_params(vec![Parameter::new("a", TypeShape::I4), Parameter::new("b", TypeShape::I4)])
///     .with_body(RoutineBody::new(vec![0x02, 0x03, 0x58, 0x2A]));
///
/// let code = &add.body.as_ref().unwrap().code;
/// let instructions = decode_body(code, &[], &SymbolTable::new(), &add.generic_context)?;
/// let options = NamingOptions::default();
///
/// let compiled = HookCompiler::new(&add, &instructions, &options).compile(&[], &[])?;
/// // ldarg.0; ldarg.1; add; stloc.0; ldloc.0; ret
/// assert_eq!(compiled.code, vec![0x02, 0x03, 0x58, 0x0A, 0x06, 0x2A]);
/// assert_eq!(compiled.locals, vec![TypeShape::I4]);
/// # Ok::<(), dothook::Error>(())
/// ```
pub struct HookCompiler<'a> {
    routine: &'a Routine,
    instructions: &'a InstructionList,
    options: &'a NamingOptions,
}

impl<'a> HookCompiler<'a> {
    /// Create a compiler for `routine`, whose body decoded to `instructions`
    #[must_use]
    pub fn new(
        routine: &'a Routine,
        instructions: &'a InstructionList,
        options: &'a NamingOptions,
    ) -> Self {
        HookCompiler {
            routine,
            instructions,
            options,
        }
    }

    /// Compile the routine with the given hooks, in call order.
    ///
    /// # Errors
    /// - [`crate::Error::NoBody`] if the routine has no body
    /// - [`crate::Error::InvalidHookReturnShape`] if a postfix returns `bool`
    /// - [`crate::Error::InvalidHookSignature`] / [`crate::Error::MissingField`] if a hook
    ///   parameter cannot be bound
    /// - [`crate::Error::MalformedBody`] if the original body cannot be re-emitted, e.g. it
    ///   returns from inside a protected region
    pub fn compile(&self, prefixes: &[HookRc], postfixes: &[HookRc]) -> Result<CompiledRoutine> {
        let routine = self.routine;
        let body = self.body()?;

        if let Some(postfix) = postfixes.iter().find(|hook| hook.returns_bool()) {
            return Err(Error::InvalidHookReturnShape(postfix.name()));
        }

        let mut builder = RoutineBuilder::new(body.locals.clone());
        let mut slots = BindingSlots::default();

        if !routine.return_type.is_void() {
            slots.result = Some(builder.declare_local(routine.return_type.clone())?);
        }

        if prefixes.iter().any(|hook| hook.returns_bool()) {
            let local = builder.declare_local(TypeShape::Boolean)?;
            builder.encoder.emit_ldc_i4(1)?;
            builder.encoder.emit_stloc(local)?;
            slots.run_original = Some(local);
        }

        let args_name = self.options.args.as_str();
        if prefixes
            .iter()
            .chain(postfixes)
            .any(|hook| hook.declares(args_name))
        {
            let local = builder.declare_local(corlib::object_array())?;
            self.emit_out_initialization(&mut builder.encoder)?;
            self.emit_args_array(&mut builder.encoder, local)?;
            slots.args = Some(local);
        }

        let binder = ArgumentBinder::new(routine, self.options, slots);
        for prefix in prefixes {
            self.emit_hook(&mut builder.encoder, &binder, prefix, HookKind::Prefix, slots)?;
        }

        if let Some(run_original) = slots.run_original {
            builder.encoder.emit_ldloc(run_original)?;
            builder.encoder.emit_branch("brfalse", EXIT_LABEL)?;
        }

        self.emit_original(&mut builder.encoder, Returns::Redirect(slots.result))?;
        builder.encoder.define_label(EXIT_LABEL)?;

        if let Some(args) = slots.args {
            if postfixes.iter().any(|hook| hook.declares(args_name)) {
                self.emit_args_refresh(&mut builder.encoder, args)?;
            }
        }

        for postfix in postfixes {
            self.emit_hook(&mut builder.encoder, &binder, postfix, HookKind::Postfix, slots)?;
        }

        if let Some(result) = slots.result {
            builder.encoder.emit_ldloc(result)?;
        }
        builder.encoder.emit_ret(slots.result.is_some())?;

        let compiled = self.finish(builder)?;
        debug!(
            "compiled {} with {} prefix(es) and {} postfix(es): {} bytes, max stack {}, {} local(s)",
            routine.full_name(),
            prefixes.len(),
            postfixes.len(),
            compiled.code.len(),
            compiled.max_stack,
            compiled.locals.len()
        );
        Ok(compiled)
    }

    /// Re-emit the original body without hooks.
    ///
    /// Branch forms are kept, so the copy has the same layout as the original.
    ///
    /// # Errors
    /// - [`crate::Error::NoBody`] if the routine has no body
    /// - [`crate::Error::MalformedBody`] if the decoded body is inconsistent
    pub fn copy(&self) -> Result<CompiledRoutine> {
        let body = self.body()?;
        let mut builder = RoutineBuilder::new(body.locals.clone());
        self.emit_original(&mut builder.encoder, Returns::Keep)?;
        self.finish(builder)
    }

    fn body(&self) -> Result<&'a RoutineBody> {
        self.routine
            .body
            .as_ref()
            .ok_or_else(|| Error::NoBody(self.routine.full_name()))
    }

    fn finish(&self, builder: RoutineBuilder) -> Result<CompiledRoutine> {
        let routine = self.routine;
        let encoded = builder.encoder.finalize()?;

        let mut params = Vec::with_capacity(routine.params.len() + 1);
        let mut param_names = Vec::with_capacity(routine.params.len() + 1);
        if !routine.is_static {
            params.push(routine.receiver_shape());
            param_names.push(self.options.instance.clone());
        }
        for param in &routine.params {
            params.push(param.shape.clone());
            param_names.push(param.name.clone());
        }

        Ok(CompiledRoutine {
            name: format!("{}_Patch", routine.full_name()),
            signature: SignatureMethod::new_static(routine.return_type.clone(), params),
            param_names,
            locals: builder.locals,
            code: encoded.code,
            max_stack: encoded.max_stack,
            exception_handlers: encoded.exception_handlers,
            scope: encoded.scope,
        })
    }

    fn emit_hook(
        &self,
        encoder: &mut InstructionEncoder,
        binder: &ArgumentBinder<'_>,
        hook: &HookRc,
        kind: HookKind,
        slots: BindingSlots,
    ) -> Result<()> {
        binder.emit_arguments(encoder, hook)?;
        encoder.emit_instruction(
            "call",
            Some(Operand::Member(MemberRef::Method(hook.method.clone()))),
        )?;

        if hook.declares(&self.options.args) {
            if let Some(args) = slots.args {
                self.emit_args_write_back(encoder, args)?;
            }
        }

        if hook.return_type.is_void() {
            return Ok(());
        }
        match (kind, slots.run_original) {
            (HookKind::Prefix, Some(run_original)) if hook.returns_bool() => {
                encoder.emit_stloc(run_original)
            }
            _ => encoder.emit_instruction("pop", None),
        }
    }

    fn emit_out_initialization(&self, encoder: &mut InstructionEncoder) -> Result<()> {
        for (index, param) in self.routine.params.iter().enumerate() {
            if !param.is_out || !param.is_by_ref() {
                continue;
            }

            let element = param.shape.element();
            encoder.emit_ldarg(self.routine.arg_index(index))?;
            if uses_object_ops(element) {
                encoder.emit_instruction("initobj", type_operand(element))?;
                continue;
            }

            match element {
                TypeShape::R4 => encoder.emit_instruction(
                    "ldc.r4",
                    Some(Operand::Immediate(Immediate::Float32(0.0))),
                )?,
                TypeShape::R8 => encoder.emit_instruction(
                    "ldc.r8",
                    Some(Operand::Immediate(Immediate::Float64(0.0))),
                )?,
                TypeShape::I8 | TypeShape::U8 => encoder
                    .emit_instruction("ldc.i8", Some(Operand::Immediate(Immediate::Int64(0))))?,
                shape if shape.is_value_type() => encoder.emit_ldc_i4(0)?,
                _ => encoder.emit_instruction("ldnull", None)?,
            }
            emit_store_indirect(encoder, element)?;
        }
        Ok(())
    }

    fn emit_args_array(&self, encoder: &mut InstructionEncoder, args: u16) -> Result<()> {
        let count = i32::try_from(self.routine.params.len())
            .map_err(|_| malformed_error!("Too many parameters"))?;
        encoder.emit_ldc_i4(count)?;
        encoder.emit_instruction("newarr", type_operand(&TypeShape::Object))?;
        encoder.emit_stloc(args)?;

        for index in 0..self.routine.params.len() {
            self.emit_args_element(encoder, args, index)?;
        }
        Ok(())
    }

    /// Re-read the by-ref arguments the original may have written to
    fn emit_args_refresh(&self, encoder: &mut InstructionEncoder, args: u16) -> Result<()> {
        for (index, param) in self.routine.params.iter().enumerate() {
            if param.is_by_ref() {
                self.emit_args_element(encoder, args, index)?;
            }
        }
        Ok(())
    }

    fn emit_args_element(
        &self,
        encoder: &mut InstructionEncoder,
        args: u16,
        index: usize,
    ) -> Result<()> {
        let param = &self.routine.params[index];
        let element = param.shape.element();

        encoder.emit_ldloc(args)?;
        encoder.emit_ldc_i4(array_index(index)?)?;
        encoder.emit_ldarg(self.routine.arg_index(index))?;
        if param.is_by_ref() {
            emit_load_indirect(encoder, element)?;
        }
        if needs_boxing(element) {
            encoder.emit_instruction("box", type_operand(element))?;
        }
        encoder.emit_instruction("stelem.ref", None)
    }

    /// Copy the array entries of by-ref parameters back through their pointers
    fn emit_args_write_back(&self, encoder: &mut InstructionEncoder, args: u16) -> Result<()> {
        for (index, param) in self.routine.params.iter().enumerate() {
            if !param.is_by_ref() {
                continue;
            }

            let element = param.shape.element();
            encoder.emit_ldarg(self.routine.arg_index(index))?;
            encoder.emit_ldloc(args)?;
            encoder.emit_ldc_i4(array_index(index)?)?;
            encoder.emit_instruction("ldelem.ref", None)?;

            if needs_boxing(element) {
                encoder.emit_instruction("unbox.any", type_operand(element))?;
                emit_store_indirect(encoder, element)?;
            } else {
                encoder.emit_instruction("castclass", type_operand(element))?;
                encoder.emit_instruction("stind.ref", None)?;
            }
        }
        Ok(())
    }

    fn emit_original(&self, encoder: &mut InstructionEncoder, returns: Returns) -> Result<()> {
        let targets: HashSet<usize> = self.instructions.branch_targets().into_iter().collect();
        let last = self.instructions.len().saturating_sub(1);

        for (index, instruction) in self.instructions.iter().enumerate() {
            for marker in &instruction.markers {
                encoder.mark(marker)?;
            }
            if targets.contains(&index) {
                encoder.define_label(&self.label(index)?)?;
            }
            self.emit_original_instruction(encoder, instruction, index == last, returns)?;
        }

        for marker in self.instructions.tail_markers() {
            encoder.mark(marker)?;
        }
        Ok(())
    }

    fn emit_original_instruction(
        &self,
        encoder: &mut InstructionEncoder,
        instruction: &Instruction,
        is_last: bool,
        returns: Returns,
    ) -> Result<()> {
        let mnemonic = instruction.mnemonic;

        if mnemonic == "ret" {
            return match returns {
                Returns::Keep => encoder.emit_ret(!self.routine.return_type.is_void()),
                Returns::Redirect(result) => {
                    if encoder.open_region_count() > 0 {
                        return Err(malformed_error!(
                            "ret inside a protected region at IL_{:04x}",
                            instruction.offset
                        ));
                    }
                    match result {
                        Some(local) => encoder.emit_stloc(local)?,
                        None => encoder.emit_instruction("nop", None)?,
                    }
                    if is_last {
                        Ok(())
                    } else {
                        encoder.emit_branch("br", EXIT_LABEL)
                    }
                }
            };
        }

        match &instruction.operand {
            Operand::Branch(target) => encoder.emit_branch_preserving(mnemonic, &self.label(*target)?),
            Operand::BranchTable(targets) => {
                let labels = targets
                    .iter()
                    .map(|target| self.label(*target))
                    .collect::<Result<Vec<_>>>()?;
                let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
                encoder.emit_switch(&labels)
            }
            Operand::Target(_) | Operand::Switch(_) => Err(malformed_error!(
                "Unresolved branch target at IL_{:04x}",
                instruction.offset
            )),
            Operand::None => encoder.emit_instruction(mnemonic, None),
            operand => encoder.emit_instruction(mnemonic, Some(operand.clone())),
        }
    }

    fn label(&self, index: usize) -> Result<String> {
        self.instructions
            .get(index)
            .map(|instruction| format!("IL_{:04x}", instruction.offset))
            .ok_or_else(|| malformed_error!("Branch to missing instruction #{}", index))
    }
}

fn array_index(index: usize) -> Result<i32> {
    i32::try_from(index).map_err(|_| malformed_error!("Too many parameters"))
}
