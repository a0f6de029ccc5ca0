//! Error types for model validation, bit streams, expressions and the codec engines.

use thiserror::Error;

/// Errors found while validating a [crate::schema::Schema] into a [crate::compiled::ValidatedModel].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Two types share the same name.
    #[error("duplicate type {0}")]
    DuplicateType(String),
    /// A base type, element type, tag type or length field type is not defined.
    #[error("type {name} is undefined (referenced by {referenced_by})")]
    UndefinedType { name: String, referenced_by: String },
    /// A type inherits from itself, directly or transitively.
    #[error("base type chain of {0} is cyclic")]
    CyclicBaseType(String),
    /// Two elements of an enumeration share the same name.
    #[error("duplicate enumeration element {enumeration}.{element}")]
    DuplicateEnumerationElement { enumeration: String, element: String },
    /// Two elements of a sequence or choice share the same name.
    #[error("duplicate element {type_name}.{element}")]
    DuplicateElement { type_name: String, element: String },
    /// A tagged sequence without a tag.
    #[error("tagged sequence {0} declares no tag")]
    MissingTag(String),
    /// A tag whose value is not an unsigned hexadecimal literal.
    #[error("tag of {type_name} has invalid hex value {hex_value:?}")]
    InvalidTag { type_name: String, hex_value: String },
}

/// Errors produced by [crate::bits::BitReader] and [crate::bits::BitWriter].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The input ended before the requested number of bits could be read.
    #[error("truncated input: {needed} bits needed, {available} available")]
    Truncated { needed: u64, available: u64 },
    /// A seek or reset targeted a position outside the retained part of the stream.
    #[error("bit position {position} out of range {lower}..={upper}")]
    PositionOutOfRange { position: u64, lower: u64, upper: u64 },
    /// More than 64 bits were requested from a fixed-width read or write.
    #[error("{0} bits do not fit into a 64 bit value")]
    TooManyBits(usize),
    /// A zero-terminated string is not valid UTF-8.
    #[error("zero-terminated string is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors produced while parsing or evaluating a schema expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("syntax error in {expr:?}: {message}")]
    Syntax { expr: String, message: String },
    #[error("unknown variable {0}")]
    UnknownVariable(String),
    #[error("no property {property} on {found}")]
    NoSuchProperty { property: String, found: &'static str },
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i128, len: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
}

/// Broad classification of a [CodecError].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The type model itself is invalid.
    Model,
    /// The input does not match the schema (recoverable inside a choice attempt).
    Structural,
    /// A value cannot be represented with the declared encoding rules.
    Encoding,
    /// The schema or the codec setup cannot be used for the requested operation.
    Configuration,
    /// The underlying sink or source failed.
    Io,
}

/// Errors produced by the marshaller, the unmarshaller and adapters.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("expression {expr:?}: {source}")]
    Expression {
        expr: String,
        #[source]
        source: ExprError,
    },

    // structural mismatch
    #[error("tag mismatch on {type_name}: actual = {actual:X}, expected = {expected:X}")]
    TagMismatch {
        type_name: String,
        expected: u64,
        actual: u64,
    },
    #[error("{message}")]
    DiscriminatorFailed { type_name: String, message: String },
    #[error("no branch matched on {type_name}")]
    NoBranchMatched { type_name: String },
    #[error("undefined enumeration value {value} for {type_name}")]
    UndefinedEnumerationValue { type_name: String, value: String },
    #[error("{field} needs at least {min} items, found {found}")]
    TooFewOccurrences { field: String, min: u64, found: u64 },
    #[error("illegal BCD digit {digit} in {type_name}")]
    InvalidBcdDigit { type_name: String, digit: u64 },
    #[error("{text:?} is not a number for {type_name}")]
    InvalidNumber { type_name: String, text: String },
    #[error("text of {type_name} is not valid {encoding}")]
    InvalidText {
        type_name: String,
        encoding: &'static str,
    },

    // encoding constraint violations
    #[error("{width} is not sufficient for value {value} of {type_name}")]
    ValueTooWide {
        type_name: String,
        width: String,
        value: String,
    },
    #[error("length of {type_name} is {actual} bytes, declared {expected}")]
    LengthMismatch {
        type_name: String,
        expected: u64,
        actual: u64,
    },
    #[error("actual length of {type_name} ({actual_bits} bits) exceeds explicit length of {declared_bits} bits")]
    ExceedsExplicitLength {
        type_name: String,
        declared_bits: u64,
        actual_bits: u64,
    },
    #[error("{bits} padding bits for {type_name} are not divisible by 8")]
    UnalignedPadding { type_name: String, bits: u64 },
    #[error("payload of {type_name} ends at bit offset {bit_offset}")]
    UnalignedPayload { type_name: String, bit_offset: u8 },
    #[error("unsupported {what} on {type_name}")]
    Unsupported { type_name: String, what: String },

    // configuration
    #[error("type {0} is not defined")]
    UnknownType(String),
    #[error("cannot marshal type {0}")]
    CannotMarshal(String),
    #[error("cannot unmarshal type {0}")]
    CannotUnmarshal(String),
    #[error("{role} type {type_name} is not a simple type")]
    NotSimpleType {
        role: &'static str,
        type_name: String,
    },
    #[error("all branches empty in choice {type_name}")]
    NoBranchSelected { type_name: String },
    #[error("missing value for {type_name}.{field}")]
    MissingField { type_name: String, field: String },
    #[error("{type_name} declares no length")]
    MissingLength { type_name: String },
    #[error("BCD bit length {bits} of {type_name} must be divisible by 4")]
    InvalidBcdLength { type_name: String, bits: u64 },
    #[error("no adapter named {0}")]
    NoAdapter(String),
    #[error("expected {expected} for {type_name}, found {found}")]
    UnexpectedValue {
        type_name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{type_name} has no element named {name}")]
    UnknownEnumerationElement { type_name: String, name: String },

    #[error("adapter {adapter}: {message}")]
    Adapter { adapter: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Classifies the error according to the codec's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::Model(_) => ErrorKind::Model,
            CodecError::Stream(StreamError::TooManyBits(_)) => ErrorKind::Configuration,
            CodecError::Stream(_)
            | CodecError::TagMismatch { .. }
            | CodecError::DiscriminatorFailed { .. }
            | CodecError::NoBranchMatched { .. }
            | CodecError::UndefinedEnumerationValue { .. }
            | CodecError::TooFewOccurrences { .. }
            | CodecError::InvalidBcdDigit { .. }
            | CodecError::InvalidNumber { .. }
            | CodecError::InvalidText { .. }
            | CodecError::Adapter { .. } => ErrorKind::Structural,
            CodecError::ValueTooWide { .. }
            | CodecError::LengthMismatch { .. }
            | CodecError::ExceedsExplicitLength { .. }
            | CodecError::UnalignedPadding { .. }
            | CodecError::UnalignedPayload { .. }
            | CodecError::Unsupported { .. } => ErrorKind::Encoding,
            CodecError::Expression { .. }
            | CodecError::UnknownType(_)
            | CodecError::CannotMarshal(_)
            | CodecError::CannotUnmarshal(_)
            | CodecError::NotSimpleType { .. }
            | CodecError::NoBranchSelected { .. }
            | CodecError::MissingField { .. }
            | CodecError::MissingLength { .. }
            | CodecError::InvalidBcdLength { .. }
            | CodecError::NoAdapter(_)
            | CodecError::UnexpectedValue { .. }
            | CodecError::UnknownEnumerationElement { .. } => ErrorKind::Configuration,
            CodecError::Io(_) => ErrorKind::Io,
        }
    }

    /// Creates an adapter failure; intended for [crate::context::Adapter] implementations.
    pub fn adapter(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        CodecError::Adapter {
            adapter: adapter.into(),
            message: message.into(),
        }
    }
}
