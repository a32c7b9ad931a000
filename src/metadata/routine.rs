//! Routines that can be hooked.
//!
//! A [`Routine`] is everything the engine needs to know about a method: who declares it, how
//! it is called, and (if it has one) its CIL body. The host builds these from its own metadata,
//! the engine only reads them.
//!
//! # Examples
//!
//! ```rust
//! use dothook::metadata::{
//!     routine::{Parameter, Routine, RoutineBody, RoutineId},
//!     token::Token,
//!     typesystem::{TypeRef, TypeShape},
//! };
//!
//! let calc = TypeRef::class(Token(0x0200_0002), "Demo", "Calc");
//! let add = Routine::new(RoutineId(1), "Add", calc)
//!     .returning(TypeShape::I4)
//!     .with_params(vec![
//!         Parameter::new("a", TypeShape::I4),
//!         Parameter::new("b", TypeShape::I4),
//!     ])
//!     .with_body(RoutineBody::new(vec![0x02, 0x03, 0x58, 0x2A]));
//!
//! assert_eq!(add.full_name(), "Demo.Calc::Add");
//! assert_eq!(add.arg_index(1), 1);
//! assert_eq!(add.signature().call_pops(), 2);
//! ```

use std::fmt;

use crate::{
    metadata::{
        members::{FieldRef, MethodRef},
        method::{ExceptionHandler, MethodBody, MethodImplOptions},
        signatures::SignatureMethod,
        token::Token,
        typesystem::{GenericContext, TypeRef, TypeShape},
    },
    Result,
};

/// Stable identity of a routine for the lifetime of a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutineId(pub u64);

impl fmt::Display for RoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name, used for hook argument binding
    pub name: String,
    /// Declared shape, `ByRef` for `ref` and `out` parameters
    pub shape: TypeShape,
    /// `out` parameters are zero-initialized before the argument array is built
    pub is_out: bool,
}

impl Parameter {
    /// A by-value or `ref` parameter
    #[must_use]
    pub fn new(name: &str, shape: TypeShape) -> Self {
        Parameter {
            name: name.to_string(),
            shape,
            is_out: false,
        }
    }

    /// An `out` parameter of type `shape`
    #[must_use]
    pub fn out(name: &str, shape: TypeShape) -> Self {
        let shape = if shape.is_by_ref() {
            shape
        } else {
            shape.by_ref()
        };
        Parameter {
            name: name.to_string(),
            shape,
            is_out: true,
        }
    }

    /// Returns true for `ref` and `out` parameters
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        self.shape.is_by_ref()
    }
}

/// The CIL body of a routine
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineBody {
    /// Code bytes, without header
    pub code: Vec<u8>,
    /// Shapes of the local variables
    pub locals: Vec<TypeShape>,
    /// Exception clauses as stored in the body
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// Token of the locals signature, 0 for none
    pub local_var_sig_token: u32,
}

impl RoutineBody {
    /// A body with code only
    #[must_use]
    pub fn new(code: Vec<u8>) -> Self {
        RoutineBody {
            code,
            locals: Vec::new(),
            exception_handlers: Vec::new(),
            max_stack: 8,
            init_locals: false,
            local_var_sig_token: 0,
        }
    }

    /// Set the local variable shapes
    #[must_use]
    pub fn with_locals(mut self, locals: Vec<TypeShape>) -> Self {
        self.init_locals = self.init_locals || !locals.is_empty();
        self.locals = locals;
        self
    }

    /// Set the exception clauses
    #[must_use]
    pub fn with_exception_handlers(mut self, handlers: Vec<ExceptionHandler>) -> Self {
        self.exception_handlers = handlers;
        self
    }

    /// Build a body from raw method body bytes (header, code, extra sections).
    ///
    /// # Arguments
    /// * `data` - The method body as stored in the image
    /// * `locals` - The decoded locals signature, if the header names one
    ///
    /// # Errors
    /// Returns an error if the header or the exception sections are malformed.
    pub fn from_method_body(data: &[u8], locals: Vec<TypeShape>) -> Result<Self> {
        let header = MethodBody::from(data)?;
        Ok(RoutineBody {
            code: header.code(data).to_vec(),
            locals,
            // Fat headers store max_stack in 16 bits
            #[allow(clippy::cast_possible_truncation)]
            max_stack: header.max_stack as u16,
            init_locals: header.is_init_local,
            local_var_sig_token: header.local_var_sig_token,
            exception_handlers: header.exception_handlers,
        })
    }
}

/// The type declaring a routine, with the fields `___name` hook parameters can reach
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerType {
    /// The declaring type
    pub ty: TypeRef,
    /// Fields declared by the type
    pub fields: Vec<FieldRef>,
}

impl OwnerType {
    /// Look up a field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldRef> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// A method that can be decoded, compiled and patched.
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    /// Identity in the engine's registries
    pub id: RoutineId,
    /// Token of the method in its module
    pub token: Token,
    /// Method name
    pub name: String,
    /// Declaring type and its fields
    pub owner: OwnerType,
    /// Static routines have no receiver in argument slot 0
    pub is_static: bool,
    /// Declared return shape
    pub return_type: TypeShape,
    /// Declared parameters, without `this`
    pub params: Vec<Parameter>,
    /// Instantiation used when resolving the body's tokens
    pub generic_context: GenericContext,
    /// Implementation flags
    pub impl_options: MethodImplOptions,
    /// CIL body, `None` for abstract, extern and runtime-implemented methods
    pub body: Option<RoutineBody>,
}

impl Routine {
    /// A static `void` routine without parameters or body
    #[must_use]
    pub fn new(id: RoutineId, name: &str, owner: TypeRef) -> Self {
        Routine {
            id,
            token: Token(0),
            name: name.to_string(),
            owner: OwnerType {
                ty: owner,
                fields: Vec::new(),
            },
            is_static: true,
            return_type: TypeShape::Void,
            params: Vec::new(),
            generic_context: GenericContext::default(),
            impl_options: MethodImplOptions::empty(),
            body: None,
        }
    }

    /// Set the method token
    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = token;
        self
    }

    /// Make this an instance routine
    #[must_use]
    pub fn instance(mut self) -> Self {
        self.is_static = false;
        self
    }

    /// Set the return shape
    #[must_use]
    pub fn returning(mut self, shape: TypeShape) -> Self {
        self.return_type = shape;
        self
    }

    /// Set the parameters
    #[must_use]
    pub fn with_params(mut self, params: Vec<Parameter>) -> Self {
        self.params = params;
        self
    }

    /// Set the owner's fields
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<FieldRef>) -> Self {
        self.owner.fields = fields;
        self
    }

    /// Set the generic instantiation
    #[must_use]
    pub fn with_generic_context(mut self, context: GenericContext) -> Self {
        self.generic_context = context;
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: RoutineBody) -> Self {
        self.body = Some(body);
        self
    }

    /// `Owner::Name`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.owner.ty, self.name)
    }

    /// Returns true if the routine has a CIL body
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Returns true if the routine is an instance member of a value type
    #[must_use]
    pub fn has_struct_receiver(&self) -> bool {
        !self.is_static && self.owner.ty.is_value_type
    }

    /// The shape of `this`: a managed pointer for value types, the class otherwise
    #[must_use]
    pub fn receiver_shape(&self) -> TypeShape {
        let owner = self.owner.ty.clone();
        if owner.is_value_type {
            TypeShape::ValueType(owner).by_ref()
        } else {
            TypeShape::Class(owner)
        }
    }

    /// The argument slot of parameter `index`, shifted by one for instance routines
    #[must_use]
    pub fn arg_index(&self, index: usize) -> u16 {
        // Argument slots are 16 bits in CIL
        #[allow(clippy::cast_possible_truncation)]
        let index = index as u16;
        if self.is_static {
            index
        } else {
            index + 1
        }
    }

    /// Find a parameter by name
    #[must_use]
    pub fn param(&self, name: &str) -> Option<(usize, &Parameter)> {
        self.params
            .iter()
            .enumerate()
            .find(|(_, param)| param.name == name)
    }

    /// The signature callers use
    #[must_use]
    pub fn signature(&self) -> SignatureMethod {
        SignatureMethod {
            has_this: !self.is_static,
            param_count_generic: 0,
            return_type: self.return_type.clone(),
            params: self.params.iter().map(|p| p.shape.clone()).collect(),
        }
    }

    /// A method reference to this routine
    #[must_use]
    pub fn method_ref(&self) -> MethodRef {
        MethodRef::new(self.token, self.owner.ty.clone(), &self.name, self.signature())
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method_ref())
    }
}
