//! Loading hook arguments.
//!
//! Every hook parameter is matched by name against the routine's parameters and the special
//! names of [`NamingOptions`]. The matching value is pushed with whatever conversion the
//! hook's declared shape needs: address-of for by-ref parameters, indirect loads for by-value
//! parameters of by-ref originals, `box` towards reference types and implicit numeric
//! widening.

use log::trace;

use crate::{
    assembly::{InstructionEncoder, Operand},
    hook::{hook::Hook, options::NamingOptions},
    metadata::{
        members::MemberRef,
        routine::{Parameter, Routine},
        typesystem::{corlib, TypeShape},
    },
    Error, Result,
};

/// Shapes moved with `ldobj`/`stobj`/`initobj` rather than typed indirect instructions
pub(crate) fn uses_object_ops(shape: &TypeShape) -> bool {
    matches!(
        shape,
        TypeShape::ValueType(_) | TypeShape::GenericParam(_) | TypeShape::GenericMethodParam(_)
    )
}

/// Shapes that must be boxed to travel as `object`
pub(crate) fn needs_boxing(shape: &TypeShape) -> bool {
    shape.is_value_type()
        || matches!(
            shape,
            TypeShape::GenericParam(_) | TypeShape::GenericMethodParam(_)
        )
}

pub(crate) fn type_operand(shape: &TypeShape) -> Option<Operand> {
    Some(Operand::Member(MemberRef::Type(shape.clone())))
}

/// Load a value of shape `shape` through the address on the stack
pub(crate) fn emit_load_indirect(encoder: &mut InstructionEncoder, shape: &TypeShape) -> Result<()> {
    if uses_object_ops(shape) {
        return encoder.emit_instruction("ldobj", type_operand(shape));
    }

    let mnemonic = match shape {
        TypeShape::Boolean | TypeShape::I1 => "ldind.i1",
        TypeShape::U1 => "ldind.u1",
        TypeShape::I2 => "ldind.i2",
        TypeShape::U2 | TypeShape::Char => "ldind.u2",
        TypeShape::I4 | TypeShape::Enum(_) => "ldind.i4",
        TypeShape::U4 => "ldind.u4",
        TypeShape::I8 | TypeShape::U8 => "ldind.i8",
        TypeShape::R4 => "ldind.r4",
        TypeShape::R8 => "ldind.r8",
        TypeShape::I | TypeShape::U => "ldind.i",
        _ => "ldind.ref",
    };
    encoder.emit_instruction(mnemonic, None)
}

/// Store the value on top of the stack through the address below it
pub(crate) fn emit_store_indirect(
    encoder: &mut InstructionEncoder,
    shape: &TypeShape,
) -> Result<()> {
    if uses_object_ops(shape) {
        return encoder.emit_instruction("stobj", type_operand(shape));
    }

    let mnemonic = match shape {
        TypeShape::Boolean | TypeShape::I1 | TypeShape::U1 => "stind.i1",
        TypeShape::I2 | TypeShape::U2 | TypeShape::Char => "stind.i2",
        TypeShape::I4 | TypeShape::U4 | TypeShape::Enum(_) => "stind.i4",
        TypeShape::I8 | TypeShape::U8 => "stind.i8",
        TypeShape::R4 => "stind.r4",
        TypeShape::R8 => "stind.r8",
        TypeShape::I | TypeShape::U => "stind.i",
        _ => "stind.ref",
    };
    encoder.emit_instruction(mnemonic, None)
}

/// Local slots the binder can refer to
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BindingSlots {
    /// Return value, absent for `void` routines
    pub result: Option<u16>,
    /// Skip flag, absent when no prefix returns `bool`
    pub run_original: Option<u16>,
    /// The `object[]` of all arguments, absent when no hook asks for it
    pub args: Option<u16>,
}

/// Binds the parameters of one hook against one routine.
pub(crate) struct ArgumentBinder<'a> {
    routine: &'a Routine,
    options: &'a NamingOptions,
    slots: BindingSlots,
}

impl<'a> ArgumentBinder<'a> {
    pub(crate) fn new(routine: &'a Routine, options: &'a NamingOptions, slots: BindingSlots) -> Self {
        ArgumentBinder {
            routine,
            options,
            slots,
        }
    }

    /// Push the arguments of `hook`, in declaration order
    pub(crate) fn emit_arguments(&self, encoder: &mut InstructionEncoder, hook: &Hook) -> Result<()> {
        for param in &hook.params {
            self.emit_argument(encoder, hook, param)?;
        }
        Ok(())
    }

    fn emit_argument(
        &self,
        encoder: &mut InstructionEncoder,
        hook: &Hook,
        param: &Parameter,
    ) -> Result<()> {
        let name = param.name.as_str();
        let options = self.options;
        trace!("binding {}::{} as {}", hook.name(), name, param.shape);

        if name == options.instance {
            return self.emit_instance(encoder, hook, param);
        }
        if name == options.original_method {
            return self.emit_original_method(encoder, hook, param);
        }
        if name == options.result {
            return self.emit_result(encoder, hook, param);
        }
        if name == options.run_original {
            return self.emit_run_original(encoder, hook, param);
        }
        if name == options.args {
            return self.emit_args(encoder, hook, param);
        }
        if let Some(field) = options.field_name(name) {
            return self.emit_field(encoder, hook, param, field);
        }
        if let Some((index, original)) = self.routine.param(name) {
            let arg = self.routine.arg_index(index);
            return self.emit_parameter(encoder, hook, param, arg, &original.shape);
        }

        Err(hook_signature_error!(
            hook.name(),
            name,
            "'{}' has no parameter with this name",
            self.routine.full_name()
        ))
    }

    fn emit_instance(
        &self,
        encoder: &mut InstructionEncoder,
        hook: &Hook,
        param: &Parameter,
    ) -> Result<()> {
        if self.routine.is_static {
            return encoder.emit_instruction("ldnull", None);
        }

        let owner = self.routine.receiver_shape();
        match (param.shape.is_by_ref(), owner.is_by_ref()) {
            // Value type receivers already arrive as a managed pointer
            (true, true) => encoder.emit_ldarg(0),
            (true, false) => encoder.emit_ldarga(0),
            (false, true) => {
                encoder.emit_ldarg(0)?;
                emit_load_indirect(encoder, owner.element())?;
                emit_conversion(encoder, hook, param, owner.element())
            }
            (false, false) => {
                encoder.emit_ldarg(0)?;
                emit_conversion(encoder, hook, param, &owner)
            }
        }
    }

    fn emit_original_method(
        &self,
        encoder: &mut InstructionEncoder,
        hook: &Hook,
        param: &Parameter,
    ) -> Result<()> {
        let routine = self.routine;
        encoder.emit_instruction(
            "ldtoken",
            Some(Operand::Member(MemberRef::Method(routine.method_ref()))),
        )?;

        // Methods of generic types need the closed declaring type to be found again
        let lookup = if routine.owner.ty.is_generic() {
            let owner = if routine.owner.ty.is_value_type {
                TypeShape::ValueType(routine.owner.ty.clone())
            } else {
                TypeShape::Class(routine.owner.ty.clone())
            };
            encoder.emit_instruction("ldtoken", type_operand(&owner))?;
            corlib::get_method_from_handle_generic()
        } else {
            corlib::get_method_from_handle()
        };
        encoder.emit_instruction("call", Some(Operand::Member(MemberRef::Method(lookup))))?;

        emit_conversion(
            encoder,
            hook,
            param,
            &TypeShape::Class(corlib::method_base()),
        )
    }

    fn emit_result(
        &self,
        encoder: &mut InstructionEncoder,
        hook: &Hook,
        param: &Parameter,
    ) -> Result<()> {
        let Some(local) = self.slots.result else {
            return Err(hook_signature_error!(
                hook.name(),
                param.name,
                "'{}' has no return value",
                self.routine.full_name()
            ));
        };

        let returns = &self.routine.return_type;
        if param.shape.is_by_ref() {
            if param.shape.element() != returns {
                return Err(hook_signature_error!(
                    hook.name(),
                    param.name,
                    "expected {}&, found {}",
                    returns,
                    param.shape
                ));
            }
            return encoder.emit_ldloca(local);
        }

        encoder.emit_ldloc(local)?;
        emit_conversion(encoder, hook, param, returns)
    }

    fn emit_run_original(
        &self,
        encoder: &mut InstructionEncoder,
        hook: &Hook,
        param: &Parameter,
    ) -> Result<()> {
        if param.shape.is_by_ref() {
            return Err(hook_signature_error!(
                hook.name(),
                param.name,
                "cannot be passed by reference"
            ));
        }

        match self.slots.run_original {
            Some(local) => encoder.emit_ldloc(local)?,
            None => encoder.emit_ldc_i4(1)?,
        }
        emit_conversion(encoder, hook, param, &TypeShape::Boolean)
    }

    fn emit_args(
        &self,
        encoder: &mut InstructionEncoder,
        hook: &Hook,
        param: &Parameter,
    ) -> Result<()> {
        let array = corlib::object_array();
        let Some(local) = self.slots.args else {
            return Err(hook_signature_error!(
                hook.name(),
                param.name,
                "argument array was not prepared"
            ));
        };
        if !param.shape.is_assignable_from(&array) {
            return Err(hook_signature_error!(
                hook.name(),
                param.name,
                "expected object[], found {}",
                param.shape
            ));
        }
        encoder.emit_ldloc(local)
    }

    fn emit_field(
        &self,
        encoder: &mut InstructionEncoder,
        hook: &Hook,
        param: &Parameter,
        field_name: &str,
    ) -> Result<()> {
        let owner = &self.routine.owner;
        let field = owner.field(field_name).ok_or_else(|| Error::MissingField {
            owner: owner.ty.full_name(),
            field: field_name.to_string(),
        })?;

        if !field.is_static && self.routine.is_static {
            return Err(hook_signature_error!(
                hook.name(),
                param.name,
                "instance field '{}' is not reachable from a static routine",
                field.name
            ));
        }

        let operand = Some(Operand::Member(MemberRef::Field(field.clone())));
        if param.shape.is_by_ref() {
            if param.shape.element() != &field.shape {
                return Err(hook_signature_error!(
                    hook.name(),
                    param.name,
                    "expected {}&, found {}",
                    field.shape,
                    param.shape
                ));
            }
            if field.is_static {
                return encoder.emit_instruction("ldsflda", operand);
            }
            encoder.emit_ldarg(0)?;
            return encoder.emit_instruction("ldflda", operand);
        }

        if field.is_static {
            encoder.emit_instruction("ldsfld", operand)?;
        } else {
            encoder.emit_ldarg(0)?;
            encoder.emit_instruction("ldfld", operand)?;
        }
        emit_conversion(encoder, hook, param, &field.shape)
    }

    fn emit_parameter(
        &self,
        encoder: &mut InstructionEncoder,
        hook: &Hook,
        param: &Parameter,
        arg: u16,
        original: &TypeShape,
    ) -> Result<()> {
        match (param.shape.is_by_ref(), original.is_by_ref()) {
            (true, original_by_ref) => {
                if param.shape.element() != original.element() {
                    return Err(hook_signature_error!(
                        hook.name(),
                        param.name,
                        "expected {}&, found {}",
                        original.element(),
                        param.shape
                    ));
                }
                if original_by_ref {
                    encoder.emit_ldarg(arg)
                } else {
                    encoder.emit_ldarga(arg)
                }
            }
            (false, true) => {
                encoder.emit_ldarg(arg)?;
                emit_load_indirect(encoder, original.element())?;
                emit_conversion(encoder, hook, param, original.element())
            }
            (false, false) => {
                encoder.emit_ldarg(arg)?;
                emit_conversion(encoder, hook, param, original)
            }
        }
    }
}

/// Bridge a `source` value on the stack to the shape `param` declares
fn emit_conversion(
    encoder: &mut InstructionEncoder,
    hook: &Hook,
    param: &Parameter,
    source: &TypeShape,
) -> Result<()> {
    let target = &param.shape;
    if target == source {
        return Ok(());
    }

    if target.needs_box_from(source) {
        return encoder.emit_instruction("box", type_operand(source));
    }

    if target.is_assignable_from(source) {
        return Ok(());
    }

    // Enums travel as their underlying int32
    let numeric = match source {
        TypeShape::Enum(_) => &TypeShape::I4,
        other => other,
    };
    if target == numeric {
        return Ok(());
    }
    if let Some(conversions) = target.widening_from(numeric) {
        for conversion in conversions {
            encoder.emit_instruction(conversion, None)?;
        }
        return Ok(());
    }

    Err(hook_signature_error!(
        hook.name(),
        param.name,
        "cannot pass {} as {}",
        source,
        target
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        members::{FieldRef, MethodRef},
        routine::RoutineId,
        signatures::SignatureMethod,
        token::Token,
        typesystem::TypeRef,
    };

    fn counter() -> TypeRef {
        TypeRef::class(Token(0x0200_0002), "Demo", "Counter")
    }

    fn routine() -> Routine {
        Routine::new(RoutineId(1), "Bump", counter())
            .instance()
            .returning(TypeShape::I4)
            .with_params(vec![
                Parameter::new("step", TypeShape::I2),
                Parameter::new("total", TypeShape::I8.by_ref()),
            ])
            .with_fields(vec![
                FieldRef {
                    token: Token(0x0400_0001),
                    owner: counter(),
                    name: "hits".to_string(),
                    shape: TypeShape::I4,
                    is_static: false,
                },
                FieldRef {
                    token: Token(0x0400_0002),
                    owner: counter(),
                    name: "instances".to_string(),
                    shape: TypeShape::I4,
                    is_static: true,
                },
            ])
    }

    fn hook(params: Vec<TypeShape>, names: &[&str]) -> Hook {
        let method = MethodRef::new(
            Token(0x0600_0010),
            TypeRef::class(Token(0x0200_0003), "Demo", "Hooks"),
            "Hook",
            SignatureMethod::new_static(TypeShape::Void, params),
        );
        Hook::new(method, names).unwrap()
    }

    fn bind(routine: &Routine, hook: &Hook, slots: BindingSlots) -> Result<Vec<u8>> {
        let options = NamingOptions::default();
        let binder = ArgumentBinder::new(routine, &options, slots);
        let mut encoder = InstructionEncoder::new();
        binder.emit_arguments(&mut encoder, hook)?;
        Ok(encoder.finalize()?.code)
    }

    #[test]
    fn original_parameters() {
        let routine = routine();
        let code = bind(
            &routine,
            &hook(
                vec![
                    TypeShape::I4,
                    TypeShape::I8,
                    TypeShape::I8.by_ref(),
                    TypeShape::I2.by_ref(),
                ],
                &["step", "total", "total", "step"],
            ),
            BindingSlots::default(),
        )
        .unwrap();

        #[rustfmt::skip]
        assert_eq!(code, vec![
            0x03,             // ldarg.1 (int16 widens to int32 as is)
            0x04, 0x4C,       // ldarg.2; ldind.i8
            0x04,             // ldarg.2
            0x0F, 0x01,       // ldarga.s 1
        ]);
    }

    #[test]
    fn boxing_and_widening() {
        let routine = routine();
        let code = bind(
            &routine,
            &hook(
                vec![TypeShape::Object, TypeShape::R8],
                &["step", "step"],
            ),
            BindingSlots::default(),
        )
        .unwrap();

        assert_eq!(code[0], 0x03);
        assert_eq!(code[1], 0x8C); // box int16
        assert_eq!(&code[6..], &[0x03, 0x6C]); // ldarg.1; conv.r8
    }

    #[test]
    fn special_names() {
        let routine = routine();
        let slots = BindingSlots {
            result: Some(2),
            run_original: Some(3),
            args: Some(4),
        };
        let code = bind(
            &routine,
            &hook(
                vec![
                    TypeShape::Class(counter()),
                    TypeShape::I4.by_ref(),
                    TypeShape::Boolean,
                    TypeShape::Object.sz_array(),
                ],
                &["__instance", "__result", "__runOriginal", "__args"],
            ),
            slots,
        )
        .unwrap();

        #[rustfmt::skip]
        assert_eq!(code, vec![
            0x02,       // ldarg.0
            0x12, 0x02, // ldloca.s 2
            0x09,       // ldloc.3
            0x11, 0x04, // ldloc.s 4
        ]);
    }

    #[test]
    fn run_original_without_skipping_prefix() {
        let routine = routine();
        let code = bind(
            &routine,
            &hook(vec![TypeShape::Boolean], &["__runOriginal"]),
            BindingSlots::default(),
        )
        .unwrap();
        assert_eq!(code, vec![0x17]);
    }

    #[test]
    fn fields() {
        let routine = routine();
        let code = bind(
            &routine,
            &hook(
                vec![TypeShape::I4, TypeShape::I4.by_ref()],
                &["___hits", "___instances"],
            ),
            BindingSlots::default(),
        )
        .unwrap();

        assert_eq!(code[0], 0x02); // ldarg.0
        assert_eq!(code[1], 0x7B); // ldfld
        assert_eq!(code[6], 0x7F); // ldsflda

        let missing = bind(
            &routine,
            &hook(vec![TypeShape::I4], &["___nope"]),
            BindingSlots::default(),
        );
        assert!(matches!(missing, Err(Error::MissingField { .. })));
    }

    #[test]
    fn instance_field_from_static_routine() {
        let mut routine = routine();
        routine.is_static = true;
        let result = bind(
            &routine,
            &hook(vec![TypeShape::I4], &["___hits"]),
            BindingSlots::default(),
        );
        assert!(matches!(result, Err(Error::InvalidHookSignature { .. })));
    }

    #[test]
    fn rejected_bindings() {
        let routine = routine();
        let cases: Vec<(TypeShape, &str, BindingSlots)> = vec![
            (TypeShape::I4, "unknown", BindingSlots::default()),
            (TypeShape::I4, "__result", BindingSlots::default()),
            (
                TypeShape::Boolean.by_ref(),
                "__runOriginal",
                BindingSlots::default(),
            ),
            (TypeShape::String, "step", BindingSlots::default()),
            (TypeShape::I4.by_ref(), "total", BindingSlots::default()),
            (
                TypeShape::I4,
                "__args",
                BindingSlots {
                    args: Some(0),
                    ..BindingSlots::default()
                },
            ),
        ];

        for (shape, name, slots) in cases {
            let result = bind(&routine, &hook(vec![shape], &[name]), slots);
            assert!(
                matches!(result, Err(Error::InvalidHookSignature { .. })),
                "{name} should not bind"
            );
        }
    }

    #[test]
    fn struct_receiver() {
        let point = TypeRef::value_type(Token(0x0200_0005), "Geo", "Point");
        let routine = Routine::new(RoutineId(2), "Length", point.clone()).instance();

        let by_ref = bind(
            &routine,
            &hook(
                vec![TypeShape::ValueType(point.clone()).by_ref()],
                &["__instance"],
            ),
            BindingSlots::default(),
        )
        .unwrap();
        assert_eq!(by_ref, vec![0x02]);

        let boxed = bind(
            &routine,
            &hook(vec![TypeShape::Object], &["__instance"]),
            BindingSlots::default(),
        )
        .unwrap();
        // ldarg.0; ldobj Point; box Point
        assert_eq!(boxed[0], 0x02);
        assert_eq!(boxed[1], 0x71);
        assert_eq!(boxed[6], 0x8C);
    }

    #[test]
    fn original_method_token() {
        let routine = routine();
        let code = bind(
            &routine,
            &hook(vec![TypeShape::Object], &["__originalMethod"]),
            BindingSlots::default(),
        )
        .unwrap();
        // ldtoken; call GetMethodFromHandle
        assert_eq!(code.len(), 10);
        assert_eq!(code[0], 0xD0);
        assert_eq!(code[5], 0x28);
    }
}
