//! Call-site and method signatures.
//!
//! A [`SignatureMethod`] is what a `call`, `callvirt`, `newobj` or `calli` needs to know to
//! track the evaluation stack, and what the hook compiler needs to lay out the generated
//! routine's parameters.
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 23.2.1 - MethodDefSig

use std::fmt;

use crate::metadata::typesystem::{GenericContext, TypeShape};

/// Method signature (II.23.2.1)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureMethod {
    /// Used to encode the keyword instance in the calling convention, see §II.15.3
    pub has_this: bool,
    /// Used to indicate that the method has one or more generic parameters.
    pub param_count_generic: u32,
    /// The return type of this `Method`
    pub return_type: TypeShape,
    /// The parameters of this `Method`, without `this`
    pub params: Vec<TypeShape>,
}

impl SignatureMethod {
    /// A static signature
    #[must_use]
    pub fn new_static(return_type: TypeShape, params: Vec<TypeShape>) -> Self {
        SignatureMethod {
            has_this: false,
            param_count_generic: 0,
            return_type,
            params,
        }
    }

    /// An instance signature, `this` is implicit
    #[must_use]
    pub fn new_instance(return_type: TypeShape, params: Vec<TypeShape>) -> Self {
        SignatureMethod {
            has_this: true,
            param_count_generic: 0,
            return_type,
            params,
        }
    }

    /// Number of values a call consumes, including `this`
    #[must_use]
    pub fn call_pops(&self) -> u32 {
        // Parameter lists are bounded by the compressed integer encoding
        #[allow(clippy::cast_possible_truncation)]
        let params = self.params.len() as u32;
        params + u32::from(self.has_this)
    }

    /// Number of values a call produces
    #[must_use]
    pub fn call_pushes(&self) -> u32 {
        u32::from(!self.return_type.is_void())
    }

    /// Close the signature over a generic context
    #[must_use]
    pub fn substitute(&self, context: &GenericContext) -> SignatureMethod {
        SignatureMethod {
            has_this: self.has_this,
            param_count_generic: self.param_count_generic,
            return_type: context.substitute(&self.return_type),
            params: self.params.iter().map(|p| context.substitute(p)).collect(),
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this {
            f.write_str("instance ")?;
        }
        write!(f, "{}(", self.return_type)?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_effect() {
        let add = SignatureMethod::new_static(TypeShape::I4, vec![TypeShape::I4, TypeShape::I4]);
        assert_eq!(add.call_pops(), 2);
        assert_eq!(add.call_pushes(), 1);

        let setter = SignatureMethod::new_instance(TypeShape::Void, vec![TypeShape::String]);
        assert_eq!(setter.call_pops(), 2);
        assert_eq!(setter.call_pushes(), 0);
    }

    #[test]
    fn substitute() {
        let open = SignatureMethod::new_instance(
            TypeShape::GenericParam(0),
            vec![TypeShape::GenericMethodParam(0).by_ref()],
        );
        let context = GenericContext::new(vec![TypeShape::String], vec![TypeShape::R8]);

        let closed = open.substitute(&context);
        assert_eq!(closed.return_type, TypeShape::String);
        assert_eq!(closed.params, vec![TypeShape::R8.by_ref()]);
        assert!(closed.has_this);
    }

    #[test]
    fn display() {
        let sig = SignatureMethod::new_instance(TypeShape::Void, vec![TypeShape::I4, TypeShape::Object]);
        assert_eq!(sig.to_string(), "instance void(int32, object)");
    }
}
