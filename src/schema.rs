//! Raw type definitions describing a binary layout.
//!
//! A [Schema] is plain data: names are not resolved and inherited attributes are not merged.
//! Use [crate::compiled::ValidatedModel::compile] to check and link it before use. With the
//! `serde` feature these types can be stored as JSON.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A collection of type definitions.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Schema {
    pub types: Vec<TypeDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, def: TypeDef) -> Self {
        self.types.push(def);
        self
    }
}

/// A named type. `format` holds the representation attributes declared on the type itself.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeDef {
    pub name: String,
    /// Name of the type this one inherits unset attributes from.
    pub base: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub format: Format,
    pub discriminator: Option<Discriminator>,
    /// Name of a registered [crate::context::Adapter] replacing the built-in encoding.
    pub adapter: Option<String>,
    pub kind: TypeKind,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            base: None,
            format: Format::default(),
            discriminator: None,
            adapter: None,
            kind,
        }
    }

    pub fn simple(name: impl Into<String>, content: ContentKind) -> Self {
        Self::new(
            name,
            TypeKind::Simple(SimpleDef {
                content: Some(content),
            }),
        )
    }

    /// A simple type taking its content kind and format from `base`.
    pub fn derived(name: impl Into<String>, base: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Simple(SimpleDef { content: None })).with_base(base)
    }

    pub fn enumeration(
        name: impl Into<String>,
        content: ContentKind,
        elements: Vec<EnumerationElement>,
    ) -> Self {
        Self::new(
            name,
            TypeKind::Enumeration(EnumerationDef {
                content: Some(content),
                elements,
            }),
        )
    }

    pub fn sequence(name: impl Into<String>, elements: Vec<SequenceElement>) -> Self {
        Self::new(
            name,
            TypeKind::Sequence(SequenceDef {
                tag: None,
                length_field: None,
                elements,
            }),
        )
    }

    pub fn tagged_sequence(
        name: impl Into<String>,
        tag: Tag,
        elements: Vec<SequenceElement>,
    ) -> Self {
        Self::new(
            name,
            TypeKind::TaggedSequence(SequenceDef {
                tag: Some(tag),
                length_field: None,
                elements,
            }),
        )
    }

    pub fn choice(name: impl Into<String>, elements: Vec<Element>) -> Self {
        Self::new(name, TypeKind::Choice(ChoiceDef { elements }))
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_discriminator(mut self, discriminator: Discriminator) -> Self {
        self.discriminator = Some(discriminator);
        self
    }

    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    /// Declares a length field on a sequence. Ignored for other kinds.
    pub fn with_length_field(mut self, type_name: impl Into<String>) -> Self {
        if let TypeKind::Sequence(seq) | TypeKind::TaggedSequence(seq) = &mut self.kind {
            seq.length_field = Some(LengthField {
                type_name: type_name.into(),
            });
        }
        self
    }

    /// Content kind of a simple type or enumeration, after inheritance.
    pub fn content(&self) -> Option<ContentKind> {
        match &self.kind {
            TypeKind::Simple(simple) => simple.content,
            TypeKind::Enumeration(enumeration) => enumeration.content,
            _ => None,
        }
    }
}

/// The closed set of type kinds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TypeKind {
    Simple(SimpleDef),
    Enumeration(EnumerationDef),
    Sequence(SequenceDef),
    TaggedSequence(SequenceDef),
    Choice(ChoiceDef),
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::Simple(_) => "simple type",
            TypeKind::Enumeration(_) => "enumeration",
            TypeKind::Sequence(_) => "sequence",
            TypeKind::TaggedSequence(_) => "tagged sequence",
            TypeKind::Choice(_) => "choice",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContentKind {
    Integer,
    Text,
    Opaque,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimpleDef {
    /// `None` inherits the content kind from the base type.
    pub content: Option<ContentKind>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnumerationDef {
    pub content: Option<ContentKind>,
    pub elements: Vec<EnumerationElement>,
}

impl EnumerationDef {
    pub fn by_name(&self, name: &str) -> Option<&EnumerationElement> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn by_value(&self, value: &Value) -> Option<&EnumerationElement> {
        self.elements.iter().find(|e| &e.value == value)
    }
}

/// A named enumeration constant with its underlying integer or text value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnumerationElement {
    pub name: String,
    pub value: Value,
}

impl EnumerationElement {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SequenceDef {
    pub tag: Option<Tag>,
    pub length_field: Option<LengthField>,
    pub elements: Vec<SequenceElement>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChoiceDef {
    pub elements: Vec<Element>,
}

/// A fixed bit pattern preceding a tagged sequence. Its width is the width of `type_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tag {
    pub type_name: String,
    /// Unsigned hexadecimal literal, with or without a `0x` prefix.
    pub hex_value: String,
}

impl Tag {
    pub fn new(type_name: impl Into<String>, hex_value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            hex_value: hex_value.into(),
        }
    }

    /// Parses the hexadecimal literal. `None` when it is not valid.
    pub fn expected_value(&self) -> Option<u64> {
        let digits = self
            .hex_value
            .strip_prefix("0x")
            .or_else(|| self.hex_value.strip_prefix("0X"))
            .unwrap_or(&self.hex_value);
        u64::from_str_radix(digits, 16).ok()
    }
}

/// An integer simple type written before a sequence payload, holding the payload size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LengthField {
    pub type_name: String,
}

/// A boolean expression checked after a value has been decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Discriminator {
    pub test: String,
    /// Replaces the default failure message.
    pub message: Option<String>,
}

impl Discriminator {
    pub fn new(test: impl Into<String>) -> Self {
        Self {
            test: test.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A named, typed slot of a sequence or a branch of a choice.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Element {
    pub name: String,
    pub type_name: String,
    /// Overrides for the type's representation attributes.
    #[cfg_attr(feature = "serde", serde(default))]
    pub format: Format,
    pub discriminator: Option<Discriminator>,
}

impl Element {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            format: Format::default(),
            discriminator: None,
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_discriminator(mut self, discriminator: Discriminator) -> Self {
        self.discriminator = Some(discriminator);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MaxOccurs {
    Bounded(u64),
    Unbounded,
}

impl Default for MaxOccurs {
    fn default() -> Self {
        MaxOccurs::Bounded(1)
    }
}

impl MaxOccurs {
    /// Whether `count` items have reached the maximum.
    pub fn reached(self, count: u64) -> bool {
        match self {
            MaxOccurs::Bounded(max) => count >= max,
            MaxOccurs::Unbounded => false,
        }
    }
}

/// How the number of items of a list element is determined when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OccursCountKind {
    /// Exactly `max_occurs` items.
    Fixed,
    /// The `occurs_count` expression, evaluated once.
    Expression,
    /// Items are decoded until one fails.
    Parsed,
}

#[cfg(feature = "serde")]
fn default_min_occurs() -> u64 {
    1
}

/// An element of a sequence with its multiplicity and optional derived value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SequenceElement {
    pub element: Element,
    #[cfg_attr(feature = "serde", serde(default = "default_min_occurs"))]
    pub min_occurs: u64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_occurs: MaxOccurs,
    pub occurs_count_kind: Option<OccursCountKind>,
    pub occurs_count: Option<String>,
    /// Expression whose result replaces the field value when marshalling.
    pub output_value_calc: Option<String>,
}

impl SequenceElement {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            element: Element::new(name, type_name),
            min_occurs: 1,
            max_occurs: MaxOccurs::Bounded(1),
            occurs_count_kind: None,
            occurs_count: None,
            output_value_calc: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.element.name
    }

    pub fn type_name(&self) -> &str {
        &self.element.type_name
    }

    pub fn optional(mut self) -> Self {
        self.min_occurs = 0;
        self
    }

    pub fn with_occurs(mut self, min: u64, max: MaxOccurs) -> Self {
        self.min_occurs = min;
        self.max_occurs = max;
        self
    }

    /// Makes this an expression-driven list element.
    pub fn with_occurs_count(mut self, expr: impl Into<String>) -> Self {
        self.occurs_count_kind = Some(OccursCountKind::Expression);
        self.occurs_count = Some(expr.into());
        self.min_occurs = 0;
        self.max_occurs = MaxOccurs::Unbounded;
        self
    }

    pub fn with_occurs_count_kind(mut self, kind: OccursCountKind) -> Self {
        self.occurs_count_kind = Some(kind);
        self
    }

    pub fn with_output_value_calc(mut self, expr: impl Into<String>) -> Self {
        self.output_value_calc = Some(expr.into());
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.element.format = format;
        self
    }

    pub fn with_discriminator(mut self, discriminator: Discriminator) -> Self {
        self.element.discriminator = Some(discriminator);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Representation {
    Binary,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinaryNumberRep {
    Binary,
    Bcd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LengthKind {
    /// Length given by the `length` expression.
    Explicit,
    /// Length implied by the type (structured types, adapters).
    Implicit,
    /// Consumes the rest of the enclosing container.
    EndOfParent,
    /// Zero-terminated text.
    Delimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LengthUnit {
    Bit,
    Byte,
}

impl LengthUnit {
    pub fn bits(self) -> u64 {
        match self {
            LengthUnit::Bit => 1,
            LengthUnit::Byte => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Encoding {
    Utf8,
    Ascii,
    Latin1,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Ascii => "US-ASCII",
            Encoding::Latin1 => "ISO-8859-1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TextPadKind {
    None,
    PadChar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Justification {
    Left,
    Right,
    Center,
}

/// Representation attributes. Every field is optional so that unset attributes can be
/// inherited from a base type; the accessor methods apply the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Format {
    pub representation: Option<Representation>,
    pub binary_number_rep: Option<BinaryNumberRep>,
    pub length_kind: Option<LengthKind>,
    /// Length expression; a literal number is an expression.
    pub length: Option<String>,
    pub min_length: Option<String>,
    pub length_unit: Option<LengthUnit>,
    pub unsigned: Option<bool>,
    pub encoding: Option<Encoding>,
    pub text_pad_kind: Option<TextPadKind>,
    pub text_string_justification: Option<Justification>,
    pub text_string_pad_character: Option<char>,
    pub text_number_justification: Option<Justification>,
    pub text_number_pad_character: Option<char>,
    pub fill_byte: Option<u8>,
    /// Alignment in bits.
    pub alignment: Option<u64>,
}

macro_rules! merge_fields {
    ($self:ident, $base:ident, $($field:ident),*) => {
        $(if $self.$field.is_none() {
            $self.$field = $base.$field.clone();
        })*
    };
}

impl Format {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills every unset attribute from `base`.
    pub fn merge_from(&mut self, base: &Format) {
        merge_fields!(
            self,
            base,
            representation,
            binary_number_rep,
            length_kind,
            length,
            min_length,
            length_unit,
            unsigned,
            encoding,
            text_pad_kind,
            text_string_justification,
            text_string_pad_character,
            text_number_justification,
            text_number_pad_character,
            fill_byte,
            alignment
        );
    }

    /// Explicit length with the given unit.
    pub fn with_length(mut self, length: impl Into<String>, unit: LengthUnit) -> Self {
        self.length = Some(length.into());
        self.length_unit = Some(unit);
        self
    }

    pub fn with_min_length(mut self, length: impl Into<String>) -> Self {
        self.min_length = Some(length.into());
        self
    }

    pub fn with_length_kind(mut self, kind: LengthKind) -> Self {
        self.length_kind = Some(kind);
        self
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = Some(representation);
        self
    }

    pub fn with_binary_number_rep(mut self, rep: BinaryNumberRep) -> Self {
        self.binary_number_rep = Some(rep);
        self
    }

    pub fn with_unsigned(mut self, unsigned: bool) -> Self {
        self.unsigned = Some(unsigned);
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Enables padding of text to the declared length.
    pub fn with_padding(mut self) -> Self {
        self.text_pad_kind = Some(TextPadKind::PadChar);
        self
    }

    pub fn with_string_justification(mut self, justification: Justification, pad: char) -> Self {
        self.text_string_justification = Some(justification);
        self.text_string_pad_character = Some(pad);
        self
    }

    pub fn with_number_justification(mut self, justification: Justification, pad: char) -> Self {
        self.text_number_justification = Some(justification);
        self.text_number_pad_character = Some(pad);
        self
    }

    pub fn with_fill_byte(mut self, fill_byte: u8) -> Self {
        self.fill_byte = Some(fill_byte);
        self
    }

    pub fn with_alignment(mut self, bits: u64) -> Self {
        self.alignment = Some(bits);
        self
    }

    pub fn representation(&self) -> Representation {
        self.representation.unwrap_or(Representation::Binary)
    }

    pub fn binary_number_rep(&self) -> BinaryNumberRep {
        self.binary_number_rep.unwrap_or(BinaryNumberRep::Binary)
    }

    pub fn length_kind(&self) -> LengthKind {
        match self.length_kind {
            Some(kind) => kind,
            None if self.length.is_some() => LengthKind::Explicit,
            None => LengthKind::Implicit,
        }
    }

    pub fn length_unit(&self) -> LengthUnit {
        self.length_unit.unwrap_or(LengthUnit::Byte)
    }

    pub fn is_unsigned(&self) -> bool {
        self.unsigned.unwrap_or(false)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding.unwrap_or(Encoding::Utf8)
    }

    pub fn is_padded(&self) -> bool {
        self.text_pad_kind == Some(TextPadKind::PadChar)
    }

    pub fn string_justification(&self) -> Justification {
        self.text_string_justification.unwrap_or(Justification::Left)
    }

    pub fn string_pad_character(&self) -> char {
        self.text_string_pad_character.unwrap_or(' ')
    }

    pub fn number_justification(&self) -> Justification {
        self.text_number_justification.unwrap_or(Justification::Right)
    }

    pub fn number_pad_character(&self) -> char {
        self.text_number_pad_character.unwrap_or('0')
    }

    pub fn fill_byte(&self) -> u8 {
        self.fill_byte.unwrap_or(0)
    }
}
