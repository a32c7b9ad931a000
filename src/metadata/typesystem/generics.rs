use crate::metadata::typesystem::TypeShape;

/// Type arguments in effect while resolving tokens of a routine.
///
/// Decoding a generic routine (or a routine of a generic type) resolves operands with the
/// instantiation applied, so `!0` in a field signature becomes the concrete type argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericContext {
    /// Arguments for `!n`
    pub type_args: Vec<TypeShape>,
    /// Arguments for `!!n`
    pub method_args: Vec<TypeShape>,
}

impl GenericContext {
    /// Create a context from type and method arguments
    #[must_use]
    pub fn new(type_args: Vec<TypeShape>, method_args: Vec<TypeShape>) -> Self {
        GenericContext {
            type_args,
            method_args,
        }
    }

    /// Returns true if no arguments are in effect
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_args.is_empty() && self.method_args.is_empty()
    }

    /// Replace generic parameters in `shape` with their arguments.
    ///
    /// Parameters without an argument are left open.
    #[must_use]
    pub fn substitute(&self, shape: &TypeShape) -> TypeShape {
        match shape {
            TypeShape::GenericParam(index) => self
                .type_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| shape.clone()),
            TypeShape::GenericMethodParam(index) => self
                .method_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| shape.clone()),
            TypeShape::SzArray(element) => TypeShape::SzArray(Box::new(self.substitute(element))),
            TypeShape::ByRef(element) => TypeShape::ByRef(Box::new(self.substitute(element))),
            other => other.clone(),
        }
    }
}
