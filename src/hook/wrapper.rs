//! Static wrappers around delegates.
//!
//! A hook must be a static method. To hook with a delegate instead, the host stores the
//! delegate in a static field and loads a wrapper that forwards to it:
//!
//! ```text
//! ldsfld  del
//! ldarg.0 .. ldarg.n
//! callvirt Invoke
//! ret
//! ```

use log::debug;

use crate::{
    assembly::{InstructionEncoder, Operand},
    hook::compiler::CompiledRoutine,
    metadata::{
        members::{FieldRef, MemberRef, MethodRef},
        signatures::SignatureMethod,
    },
    Result,
};

/// Compile the wrapper forwarding to the delegate in `field`.
///
/// # Arguments
/// * `field` - Static field holding the delegate
/// * `invoke` - The delegate type's `Invoke` method
/// * `param_names` - Names for the wrapper's parameters, used when it is registered as a hook
///
/// # Errors
/// - [`crate::Error::InvalidHookSignature`] if the field is not static, `Invoke` is not an
///   instance method or the name count does not match
///
/// # Examples
///
/// ```rust
/// use dothook::{
///     hook::compile_delegate_wrapper,
///     metadata::{
///         members::{FieldRef, MethodRef},
///         signatures::SignatureMethod,
///         token::Token,
///         typesystem::{TypeRef, TypeShape},
///     },
/// };
///
/// let action = TypeRef::class(Token(0x0100_0001), "System", "Action`1");
/// let field = FieldRef {
///     token: Token(0x0400_0001),
///     owner: TypeRef::class(Token(0x0200_0010), "Demo", "Hooks"),
///     name: "OnAdd".to_string(),
///     shape: TypeShape::Class(action.clone()),
///     is_static: true,
/// };
/// let invoke = MethodRef::new(
///     Token(0x0A00_0001),
///     action,
///     "Invoke",
///     SignatureMethod::new_instance(TypeShape::Void, vec![TypeShape::I4]),
/// );
///
/// let wrapper = compile_delegate_wrapper(&field, &invoke, &["a"])?;
/// assert_eq!(wrapper.code[0], 0x7E); // ldsfld
/// assert_eq!(wrapper.code[5], 0x02); // ldarg.0
/// assert_eq!(wrapper.code[6], 0x6F); // callvirt
/// assert!(!wrapper.signature.has_this);
/// # Ok::<(), dothook::Error>(())
/// ```
pub fn compile_delegate_wrapper(
    field: &FieldRef,
    invoke: &MethodRef,
    param_names: &[&str],
) -> Result<CompiledRoutine> {
    let wrapper_name = format!("{}_Invoke", field.name);
    if !field.is_static {
        return Err(hook_signature_error!(
            wrapper_name,
            field.name,
            "delegate field must be static"
        ));
    }
    if !invoke.signature.has_this {
        return Err(hook_signature_error!(
            wrapper_name,
            invoke.name,
            "Invoke must be an instance method"
        ));
    }
    if param_names.len() != invoke.signature.params.len() {
        return Err(hook_signature_error!(
            wrapper_name,
            param_names.join(", "),
            "{} names given for {} parameters",
            param_names.len(),
            invoke.signature.params.len()
        ));
    }

    let mut encoder = InstructionEncoder::new();
    encoder.emit_instruction(
        "ldsfld",
        Some(Operand::Member(MemberRef::Field(field.clone()))),
    )?;
    for index in 0..invoke.signature.params.len() {
        let index = u16::try_from(index).map_err(|_| malformed_error!("Too many parameters"))?;
        encoder.emit_ldarg(index)?;
    }
    encoder.emit_instruction(
        "callvirt",
        Some(Operand::Member(MemberRef::Method(invoke.clone()))),
    )?;
    encoder.emit_ret(!invoke.signature.return_type.is_void())?;

    let encoded = encoder.finalize()?;
    debug!(
        "compiled delegate wrapper {} ({} bytes)",
        wrapper_name,
        encoded.code.len()
    );

    Ok(CompiledRoutine {
        name: wrapper_name,
        signature: SignatureMethod::new_static(
            invoke.signature.return_type.clone(),
            invoke.signature.params.clone(),
        ),
        param_names: param_names.iter().map(|name| (*name).to_string()).collect(),
        locals: Vec::new(),
        code: encoded.code,
        max_stack: encoded.max_stack,
        exception_handlers: encoded.exception_handlers,
        scope: encoded.scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{token::Token, typesystem::{TypeRef, TypeShape}},
        Error,
    };

    fn func() -> TypeRef {
        TypeRef::class(Token(0x0100_0002), "System", "Func`3")
    }

    fn field(is_static: bool) -> FieldRef {
        FieldRef {
            token: Token(0x0400_0003),
            owner: TypeRef::class(Token(0x0200_0010), "Demo", "Hooks"),
            name: "Combine".to_string(),
            shape: TypeShape::Class(func()),
            is_static,
        }
    }

    fn invoke() -> MethodRef {
        MethodRef::new(
            Token(0x0A00_0002),
            func(),
            "Invoke",
            SignatureMethod::new_instance(TypeShape::I4, vec![TypeShape::I4, TypeShape::I4]),
        )
    }

    #[test]
    fn forwards_all_arguments() {
        let wrapper = compile_delegate_wrapper(&field(true), &invoke(), &["a", "b"]).unwrap();
        let listing: Vec<&str> = wrapper
            .decode()
            .unwrap()
            .iter()
            .map(|instruction| instruction.mnemonic)
            .collect();

        assert_eq!(listing, vec!["ldsfld", "ldarg.0", "ldarg.1", "callvirt", "ret"]);
        assert_eq!(wrapper.max_stack, 3);
        assert_eq!(wrapper.signature.params.len(), 2);
        assert_eq!(wrapper.param_names, vec!["a", "b"]);
        assert_eq!(wrapper.name, "Combine_Invoke");
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(
            compile_delegate_wrapper(&field(false), &invoke(), &["a", "b"]),
            Err(Error::InvalidHookSignature { .. })
        ));
        assert!(matches!(
            compile_delegate_wrapper(&field(true), &invoke(), &["a"]),
            Err(Error::InvalidHookSignature { .. })
        ));
    }
}
