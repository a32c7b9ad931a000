//! Hook descriptions.

use std::{fmt, sync::Arc};

use strum::{Display, EnumIter};

use crate::{
    metadata::{members::MethodRef, routine::Parameter, typesystem::TypeShape},
    Result,
};

/// Shared handle to a hook. Removal compares handles with [`Arc::ptr_eq`].
pub type HookRc = Arc<Hook>;

/// Where a hook runs relative to the original body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum HookKind {
    /// Before the original, may return `bool` to skip it
    #[strum(serialize = "prefix")]
    Prefix,
    /// After the original, must not return `bool`
    #[strum(serialize = "postfix")]
    Postfix,
}

/// A static method called from the compiled routine.
///
/// Parameters are bound by name, see [`crate::hook::NamingOptions`] for the special names.
///
/// # Examples
///
/// ```rust
/// use dothook::{
///     hook::Hook,
///     metadata::{
///         members::MethodRef,
///         signatures::SignatureMethod,
///         token::Token,
///         typesystem::{TypeRef, TypeShape},
///     },
/// };
///
/// let hooks = TypeRef::class(Token(0x0200_0010), "Demo", "Hooks");
/// let method = MethodRef::new(
///     Token(0x0600_0020),
///     hooks,
///     "Before",
///     SignatureMethod::new_static(
///         TypeShape::Boolean,
///         vec![TypeShape::I4, TypeShape::I4.by_ref()],
///     ),
/// );
///
/// let hook = Hook::new(method, &["a", "__result"])?;
/// assert!(hook.returns_bool());
/// assert!(hook.declares("__result"));
/// # Ok::<(), dothook::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Hook {
    /// The method to call
    pub method: MethodRef,
    /// Its parameters, shapes taken from the method signature
    pub params: Vec<Parameter>,
    /// Its return shape
    pub return_type: TypeShape,
}

impl Hook {
    /// Describe a hook by naming the parameters of `method`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidHookSignature`] if `method` is not static or the name
    /// count differs from its parameter count.
    pub fn new(method: MethodRef, names: &[&str]) -> Result<Self> {
        let hook_name = method.full_name();
        if method.signature.has_this {
            return Err(hook_signature_error!(
                hook_name,
                "this",
                "hooks must be static methods"
            ));
        }

        if names.len() != method.signature.params.len() {
            return Err(hook_signature_error!(
                hook_name,
                names.join(", "),
                "{} names given for {} parameters",
                names.len(),
                method.signature.params.len()
            ));
        }

        let params = names
            .iter()
            .zip(&method.signature.params)
            .map(|(name, shape)| Parameter::new(name, shape.clone()))
            .collect();

        Ok(Hook {
            return_type: method.signature.return_type.clone(),
            params,
            method,
        })
    }

    /// Wrap into a shared handle
    #[must_use]
    pub fn shared(self) -> HookRc {
        Arc::new(self)
    }

    /// Returns true for a skip signal
    #[must_use]
    pub fn returns_bool(&self) -> bool {
        self.return_type.is_boolean()
    }

    /// Returns true if a parameter is called `name`
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.params.iter().any(|param| param.name == name)
    }

    /// `Owner::Name` of the hook method
    #[must_use]
    pub fn name(&self) -> String {
        self.method.full_name()
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|param| format!("{} {}", param.shape, param.name))
            .collect();
        write!(
            f,
            "{} {}({})",
            self.return_type,
            self.method.full_name(),
            params.join(", ")
        )
    }
}
