use thiserror::Error;

use crate::metadata::{routine::RoutineId, token::Token};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::MalformedBody {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedBody {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! hook_signature_error {
    ($hook:expr, $param:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::InvalidHookSignature {
            hook: $hook.to_string(),
            parameter: $param.to_string(),
            reason: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Decode-time
/// - [`Error::MalformedBody`] - The body bytes or exception clauses do not form valid CIL
/// - [`Error::OutOfRange`] - A read would run past the end of the buffer
/// - [`Error::UnsupportedOperand`] - An opcode carries an operand shape that cannot be decoded
/// - [`Error::UnresolvedToken`] - The symbol resolver does not know a token
///
/// ## Compile-time
/// - [`Error::InvalidHookSignature`] - A hook parameter cannot be bound
/// - [`Error::InvalidHookReturnShape`] - A postfix hook returns `bool`
/// - [`Error::MissingField`] - A `___field` parameter names a field the owner does not have
/// - Encoder errors: [`Error::InvalidMnemonic`], [`Error::InvalidBranch`],
///   [`Error::UnexpectedOperand`], [`Error::WrongOperandType`], [`Error::UndefinedLabel`],
///   [`Error::DuplicateLabel`], [`Error::UnbalancedRegion`]
///
/// ## Patch-time
/// - [`Error::AddressProtectionDenied`] - The code page could not be made writable
/// - [`Error::NoBody`] - The routine has no body to decode
/// - [`Error::AlreadyPatched`] / [`Error::NotPatched`] - attach/detach protocol misuse
/// - [`Error::UnknownRoutine`] - The engine has no routine with that id
///
/// # Examples
///
/// ```rust
/// use dothook::{assembly::decode_body, metadata::SymbolTable, Error};
///
/// // `br.s` whose target lies outside the body
/// let code = [0x2B, 0x10, 0x2A];
/// match decode_body(&code, &[], &SymbolTable::new(), &Default::default()) {
///     Err(Error::MalformedBody { message, .. }) => println!("bad body: {message}"),
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The method body could not be decoded.
    ///
    /// Carries the source location where the malformation was detected.
    #[error("Malformed body - {file}:{line}: {message}")]
    MalformedBody {
        /// The message to be printed for the MalformedBody error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A read would have run past the end of the buffer.
    #[error("Out of range read would have occurred!")]
    OutOfRange,

    /// The opcode declares an operand shape that cannot be decoded at this position.
    #[error("Unsupported operand for {mnemonic} at IL_{offset:04X}")]
    UnsupportedOperand {
        /// Mnemonic of the offending instruction
        mnemonic: &'static str,
        /// Offset of the offending instruction
        offset: u32,
    },

    /// The resolver has no entry for this token.
    #[error("Unable to resolve token {0}")]
    UnresolvedToken(Token),

    /// A hook parameter does not match the binding contract.
    #[error("Invalid hook signature in '{hook}', parameter '{parameter}': {reason}")]
    InvalidHookSignature {
        /// Name of the hook method
        hook: String,
        /// Name of the parameter that failed to bind
        parameter: String,
        /// Why the binding failed
        reason: String,
    },

    /// A postfix hook declares a `bool` return, which is reserved for prefix skip signals.
    #[error("Postfix '{0}' must not return bool")]
    InvalidHookReturnShape(String),

    /// A `___field` parameter names a field that does not exist on the routine owner.
    #[error("Field '{field}' not found on '{owner}'")]
    MissingField {
        /// Full name of the owner type
        owner: String,
        /// The field name that was requested
        field: String,
    },

    /// The protection of the code page could not be changed.
    #[error("Unable to make 0x{address:X} (+{len}) writable")]
    AddressProtectionDenied {
        /// Start of the span
        address: usize,
        /// Length of the span
        len: usize,
    },

    /// The routine has no body (abstract, extern, runtime-implemented).
    #[error("Routine '{0}' has no body")]
    NoBody(String),

    /// The routine already carries an active patch.
    #[error("Routine {0} is already patched")]
    AlreadyPatched(RoutineId),

    /// The routine has never been patched.
    #[error("Routine {0} is not patched")]
    NotPatched(RoutineId),

    /// The routine was never registered with the engine.
    #[error("Routine {0} is not registered")]
    UnknownRoutine(RoutineId),

    /// An unknown mnemonic was handed to the encoder.
    #[error("Invalid instruction mnemonic: {0}")]
    InvalidMnemonic(String),

    /// A branch could not be encoded.
    #[error("Invalid branch: {0}")]
    InvalidBranch(String),

    /// An operand was given to an instruction that takes none.
    #[error("Unexpected operand for an instruction without operand")]
    UnexpectedOperand,

    /// The operand kind does not match the instruction.
    #[error("Wrong operand type - expected {expected}")]
    WrongOperandType {
        /// The operand kind the instruction expects
        expected: String,
    },

    /// A branch references a label that was never defined.
    #[error("Undefined label: {0}")]
    UndefinedLabel(String),

    /// A label was defined twice.
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),

    /// Exception region markers do not nest.
    #[error("Unbalanced exception region: {0}")]
    UnbalancedRegion(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
