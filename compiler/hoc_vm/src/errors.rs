//! Execution faults.
//!
//! Every fault the engine can raise is an `ExecError`. Opcode handlers never
//! recover locally: they return the error with `?` and the nearest boundary
//! (`Interpreter::run`, `run_guarded`, or a nested native call) hands it to
//! the recovery sweep.
//!
//! # Structured Error Categories
//!
//! `ExecErrorKind` carries the structured data; factory functions such as
//! `division_by_zero()` are the public API and fill in both `kind` and the
//! rendered `message`.

use std::fmt;

use hoc_ir::CodeError;

/// Result of executing one opcode, body or call.
pub type ExecResult<T = ()> = Result<T, ExecError>;

/// Typed fault category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecErrorKind {
    // Stack
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    StackUnderflow,
    StackOverflow {
        capacity: usize,
    },

    // Frames and calls
    CallNestedTooDeeply {
        name: String,
    },
    NotEnoughArguments {
        name: String,
    },
    ReturnMismatch {
        name: String,
        what: &'static str,
    },
    UndefinedFunction {
        name: String,
    },

    // Names
    UndefinedVariable {
        name: String,
    },
    NonVariable {
        name: String,
        action: &'static str,
    },

    // Arithmetic
    DivisionByZero,
    ModuloNonPositive,
    MathDomain {
        name: String,
    },
    MathRange {
        name: String,
    },

    // Arrays
    SubscriptOutOfRange {
        name: String,
    },
    SubscriptBelowOne {
        name: String,
    },
    ArrayTooLarge {
        name: String,
    },
    WrongSubscriptCount {
        name: String,
    },

    // Objects
    NotPublicMember {
        member: String,
        template: String,
    },
    NullObject {
        name: String,
    },
    NotATemplate {
        name: String,
    },
    DeadObject,

    // Declarations
    Definition {
        name: String,
        message: String,
    },

    // Native callbacks
    NativeFault {
        context: String,
        message: String,
    },

    // Engine
    Interrupted,
    MalformedCode {
        error: CodeError,
    },

    /// Faults without a dedicated category.
    Custom {
        message: String,
    },
}

impl fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Stack
            Self::TypeMismatch { expected, got } => {
                write!(f, "bad stack access: expecting {expected}; really {got}")
            }
            Self::StackUnderflow => write!(f, "stack underflow"),
            Self::StackOverflow { capacity } => {
                write!(f, "Stack too deep (capacity {capacity})")
            }

            // Frames and calls
            Self::CallNestedTooDeeply { name } => write!(f, "{name}: call nested too deeply"),
            Self::NotEnoughArguments { name } => write!(f, "{name}: not enough arguments"),
            Self::ReturnMismatch { name, what } => write!(f, "{name}: {what}"),
            Self::UndefinedFunction { name } => write!(f, "{name}: undefined function"),

            // Names
            Self::UndefinedVariable { name } => write!(f, "{name}: undefined variable"),
            Self::NonVariable { name, action } => write!(f, "{name}: {action}"),

            // Arithmetic
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::ModuloNonPositive => write!(f, "a%b, b<=0"),
            Self::MathDomain { name } => write!(f, "{name}: argument out of domain"),
            Self::MathRange { name } => write!(f, "{name}: result out of range"),

            // Arrays
            Self::SubscriptOutOfRange { name } => write!(f, "{name}: subscript out of range"),
            Self::SubscriptBelowOne { name } => write!(f, "{name}: subscript < 1"),
            Self::ArrayTooLarge { name } => write!(f, "{name}: total subscript too large"),
            Self::WrongSubscriptCount { name } => {
                write!(f, "{name}: not right number of subscripts")
            }

            // Objects
            Self::NotPublicMember { member, template } => {
                write!(f, "{member} not a public member of {template}")
            }
            Self::NullObject { name } => write!(f, "{name}: object prefix is NULL"),
            Self::NotATemplate { name } => write!(f, "{name} is not a template"),
            Self::DeadObject => write!(f, "object was destroyed while still referenced"),

            // Declarations
            Self::Definition { name, message } => write!(f, "{name}: {message}"),

            // Native callbacks
            Self::NativeFault { context, message } => write!(f, "{context}: {message}"),

            // Engine
            Self::Interrupted => write!(f, "interrupted"),
            Self::MalformedCode { error } => write!(f, "malformed bytecode: {error}"),

            Self::Custom { message } => write!(f, "{message}"),
        }
    }
}

/// One frame of a captured call trace.
#[derive(Clone, Debug, PartialEq)]
pub struct BacktraceFrame {
    /// `name` or `T[i].name` for method frames.
    pub name: String,
    /// Live argument values, already formatted.
    pub args: Vec<String>,
}

/// Snapshot of the call-frame stack at the fault site, innermost first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecBacktrace {
    frames: Vec<BacktraceFrame>,
    /// Frames deeper than the capture limit.
    elided: usize,
}

impl ExecBacktrace {
    pub fn new(frames: Vec<BacktraceFrame>, elided: usize) -> Self {
        Self { frames, elided }
    }

    pub fn frames(&self) -> &[BacktraceFrame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

impl fmt::Display for ExecBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            return Ok(());
        }
        writeln!(f, "stack backtrace:")?;
        for (i, frame) in self.frames.iter().enumerate() {
            writeln!(f, "  {i}: {}({})", frame.name, frame.args.join(", "))?;
        }
        if self.elided > 0 {
            writeln!(f, "  and {} others", self.elided)?;
        }
        Ok(())
    }
}

/// An execution fault.
#[derive(Clone, Debug)]
pub struct ExecError {
    pub kind: ExecErrorKind,
    /// Rendered message; equals `kind.to_string()` for factory-built errors.
    pub message: String,
    /// Call trace, attached by the boundary that catches the fault.
    pub backtrace: Option<ExecBacktrace>,
    pub notes: Vec<String>,
}

impl ExecError {
    /// Create an uncategorized fault.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ExecErrorKind::Custom {
                message: message.clone(),
            },
            message,
            backtrace: None,
            notes: Vec::new(),
        }
    }

    fn from_kind(kind: ExecErrorKind) -> Self {
        let message = kind.to_string();
        Self {
            kind,
            message,
            backtrace: None,
            notes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_backtrace(mut self, backtrace: ExecBacktrace) -> Self {
        self.backtrace = Some(backtrace);
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Whether the fault came from the interrupt flag.
    pub fn is_interrupt(&self) -> bool {
        matches!(self.kind, ExecErrorKind::Interrupted)
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecError {}

impl From<CodeError> for ExecError {
    fn from(error: CodeError) -> Self {
        malformed_code(error)
    }
}

// Stack

#[cold]
pub fn type_mismatch(expected: &'static str, got: &'static str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::TypeMismatch { expected, got })
}

#[cold]
pub fn stack_underflow() -> ExecError {
    ExecError::from_kind(ExecErrorKind::StackUnderflow)
}

#[cold]
pub fn stack_overflow(capacity: usize) -> ExecError {
    ExecError::from_kind(ExecErrorKind::StackOverflow { capacity })
}

// Frames and calls

#[cold]
pub fn call_nested_too_deeply(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::CallNestedTooDeeply {
        name: name.to_string(),
    })
}

#[cold]
pub fn not_enough_arguments(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NotEnoughArguments {
        name: name.to_string(),
    })
}

#[cold]
pub fn return_mismatch(name: &str, what: &'static str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::ReturnMismatch {
        name: name.to_string(),
        what,
    })
}

#[cold]
pub fn undefined_function(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::UndefinedFunction {
        name: name.to_string(),
    })
}

// Names

#[cold]
pub fn undefined_variable(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::UndefinedVariable {
        name: name.to_string(),
    })
}

/// Reading a symbol that holds no value.
#[cold]
pub fn evaluate_non_variable(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NonVariable {
        name: name.to_string(),
        action: "attempt to evaluate a non-variable",
    })
}

#[cold]
pub fn assign_non_variable(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NonVariable {
        name: name.to_string(),
        action: "assignment to non-variable",
    })
}

#[cold]
pub fn loop_non_variable(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NonVariable {
        name: name.to_string(),
        action: "for loop non-variable",
    })
}

#[cold]
pub fn integer_iteration_variable(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NonVariable {
        name: name.to_string(),
        action: "integer iteration variable",
    })
}

#[cold]
pub fn pointer_to_non_variable(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NonVariable {
        name: name.to_string(),
        action: "attempt to evaluate pointer to a non-variable",
    })
}

#[cold]
pub fn not_a_string(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NonVariable {
        name: name.to_string(),
        action: "not a string variable",
    })
}

#[cold]
pub fn not_an_objref(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NonVariable {
        name: name.to_string(),
        action: "not an object variable",
    })
}

#[cold]
pub fn no_object_context(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NonVariable {
        name: name.to_string(),
        action: "template member used outside of an object context",
    })
}

#[cold]
pub fn pointer_to_non_double(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NonVariable {
        name: name.to_string(),
        action: "can use pointer only to doubles",
    })
}

// Arithmetic

#[cold]
pub fn division_by_zero() -> ExecError {
    ExecError::from_kind(ExecErrorKind::DivisionByZero)
}

#[cold]
pub fn modulo_non_positive() -> ExecError {
    ExecError::from_kind(ExecErrorKind::ModuloNonPositive)
}

#[cold]
pub fn math_domain(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::MathDomain {
        name: name.to_string(),
    })
}

#[cold]
pub fn math_range(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::MathRange {
        name: name.to_string(),
    })
}

// Arrays

#[cold]
pub fn subscript_out_of_range(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::SubscriptOutOfRange {
        name: name.to_string(),
    })
}

#[cold]
pub fn subscript_below_one(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::SubscriptBelowOne {
        name: name.to_string(),
    })
}

#[cold]
pub fn array_too_large(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::ArrayTooLarge {
        name: name.to_string(),
    })
}

#[cold]
pub fn wrong_subscript_count(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::WrongSubscriptCount {
        name: name.to_string(),
    })
}

// Operands

#[cold]
pub fn cannot_compare() -> ExecError {
    ExecError::new("don't know how to compare these types")
}

#[cold]
pub fn cannot_print() -> ExecError {
    ExecError::new("Don't know how to print this type")
}

#[cold]
pub fn cannot_assign_lhs() -> ExecError {
    ExecError::new("Cannot assign to left hand side")
}

/// Compound assignment (`+=` and friends) to an object or string.
#[cold]
pub fn invalid_assign_operator(what: &'static str) -> ExecError {
    ExecError::new(format!("Invalid assignment operator for {what}"))
}

#[cold]
pub fn not_double_pointer() -> ExecError {
    ExecError::new("Not a double pointer")
}

#[cold]
pub fn string_constant_assign() -> ExecError {
    ExecError::new("cannot assign to a string constant")
}

#[cold]
pub fn compound_divide_by_zero() -> ExecError {
    ExecError::new("Divide by 0")
}

// Arguments

#[cold]
pub fn arg_index_below_one() -> ExecError {
    ExecError::new("arg index i < 1")
}

#[cold]
pub fn expecting_string_arg() -> ExecError {
    ExecError::new("Expecting string argument")
}

#[cold]
pub fn objref_arg_required() -> ExecError {
    ExecError::new("Assignment to $o only allowed if caller arg was declared as objref")
}

#[cold]
pub fn outside_procedure(name: &str) -> ExecError {
    ExecError::new(format!("{name} can only be called in a func or proc"))
}

#[cold]
pub fn return_outside_procedure() -> ExecError {
    ExecError::new("return statement outside of a procedure")
}

// Iterators

#[cold]
pub fn iterator_statement_return() -> ExecError {
    ExecError::new("return from within an iterator statement not allowed.")
        .with_note("Set a flag and use break.")
}

#[cold]
pub fn iterator_outside_for(name: &str) -> ExecError {
    ExecError::new(format!("{name}: ITERATOR can only be used in a for statement"))
}

#[cold]
pub fn not_an_iterator(name: &str) -> ExecError {
    ExecError::new(format!("{name}: not an iterator"))
}

#[cold]
pub fn iterator_statement_outside_iterator() -> ExecError {
    ExecError::new("iterator_statement used outside an iterator")
}

// Objects

#[cold]
pub fn object_context_overflow() -> ExecError {
    ExecError::new("too many object context stack depth")
}

#[cold]
pub fn object_context_underflow() -> ExecError {
    ExecError::new("object context stack underflow")
}

#[cold]
pub fn object_id_missing(template: &str, index: i64) -> ExecError {
    ExecError::new(format!("Object ID doesn't exist: {template}[{index}]"))
}

#[cold]
pub fn function_not_array(name: &str, nindex: usize) -> ExecError {
    ExecError::new(format!("{name} is a function not a {nindex}dim array"))
}

#[cold]
pub fn string_member_indexed(name: &str) -> ExecError {
    ExecError::new(format!(
        "{name}: string can't have function arguments or array indices"
    ))
}

#[cold]
pub fn indexed_call(name: &str) -> ExecError {
    ExecError::new(format!(
        "[...](...) syntax only allowed for array range variables: {name}"
    ))
}

#[cold]
pub fn alias_subscripted(name: &str) -> ExecError {
    ExecError::new(format!("{name}: is an alias and cannot have subscripts"))
}

#[cold]
pub fn cannot_push_member(name: &str) -> ExecError {
    ExecError::new(format!("{name}: can't push that type onto stack"))
}

#[cold]
pub fn read_only_property(name: &str) -> ExecError {
    ExecError::new(format!("{name}: property is read-only"))
}

#[cold]
pub fn not_public_member(member: &str, template: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NotPublicMember {
        member: member.to_string(),
        template: template.to_string(),
    })
}

#[cold]
pub fn null_object(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NullObject {
        name: name.to_string(),
    })
}

#[cold]
pub fn not_a_template(name: &str) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NotATemplate {
        name: name.to_string(),
    })
}

#[cold]
pub fn dead_object() -> ExecError {
    ExecError::from_kind(ExecErrorKind::DeadObject)
}

// Declarations

#[cold]
pub fn definition_error(name: &str, message: impl Into<String>) -> ExecError {
    ExecError::from_kind(ExecErrorKind::Definition {
        name: name.to_string(),
        message: message.into(),
    })
}

// Native callbacks

#[cold]
pub fn native_fault(context: impl Into<String>, message: impl Into<String>) -> ExecError {
    ExecError::from_kind(ExecErrorKind::NativeFault {
        context: context.into(),
        message: message.into(),
    })
}

// Engine

#[cold]
pub fn interrupted() -> ExecError {
    ExecError::from_kind(ExecErrorKind::Interrupted)
}

#[cold]
pub fn malformed_code(error: CodeError) -> ExecError {
    ExecError::from_kind(ExecErrorKind::MalformedCode { error })
}
