//! Schema-driven marshalling of structured values to and from bit-level binary layouts.
//!
//! A [schema::Schema] describes types (simple values, enumerations, sequences, tagged
//! sequences and choices) together with their physical format. It is validated once into a
//! [compiled::ValidatedModel], wrapped in a [context::CodecContext] and then used to
//! marshal [value::Value] trees into bytes and to unmarshal bytes back into values.
//!
//! ## Example
//!
//! ```
//! use bitform::{
//!     CodecContext, Schema, StructValue, Value,
//!     schema::{ContentKind, Format, LengthUnit, SequenceElement, TypeDef},
//! };
//!
//! let nibble = TypeDef::simple("nibble", ContentKind::Integer).with_format(
//!     Format::new()
//!         .with_length("4", LengthUnit::Bit)
//!         .with_unsigned(true),
//! );
//! let header = TypeDef::sequence(
//!     "Header",
//!     vec![
//!         SequenceElement::new("version", "nibble"),
//!         SequenceElement::new("flags", "nibble"),
//!     ],
//! );
//! let context =
//!     CodecContext::from_schema(Schema::new().with_type(nibble).with_type(header)).unwrap();
//!
//! let mut value = Value::from(
//!     StructValue::new("Header")
//!         .with("version", 4u8)
//!         .with("flags", 2u8),
//! );
//! let bytes = context.marshaller().marshal(&mut value).unwrap();
//! assert_eq!(bytes, vec![0x42]);
//!
//! let decoded = context.unmarshaller().unmarshal(&bytes, "Header").unwrap();
//! assert_eq!(decoded, value);
//! ```

pub mod bits;
pub mod compiled;
pub mod context;
pub mod errors;
pub mod eval;
pub mod expr;
pub mod marshal;
pub mod scalar;
pub mod schema;
pub mod unmarshal;
pub mod value;

pub use compiled::ValidatedModel;
pub use context::{Adapter, CodecContext};
pub use errors::{CodecError, ErrorKind, ModelError};
pub use marshal::Marshaller;
pub use schema::Schema;
pub use unmarshal::Unmarshaller;
pub use value::{EnumValue, StructValue, Value};
