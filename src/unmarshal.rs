//! Schema-driven decoder: reads a bit stream and builds the matching [Value] tree.
//!
//! Choice branches, optional elements and parsed list items are attempted under a
//! [crate::bits::Mark]; any failure rewinds the reader to the mark.

use std::io::Read;
use std::sync::Arc;

use log::{debug, trace};
use num_bigint::{BigInt, BigUint};
use num_traits::ToPrimitive;

use crate::{
    bits::{BYTE_SIZE, BitReader},
    compiled::ValidatedModel,
    context::CodecContext,
    errors::{CodecError, ModelError, StreamError},
    eval::{DeclaredLength, ExpressionContext, LENGTH_VARIABLE},
    marshal::byte_count,
    scalar,
    schema::{
        BinaryNumberRep, ChoiceDef, ContentKind, Discriminator, Element, Encoding, Format,
        LengthKind, MaxOccurs, OccursCountKind, Representation, SequenceDef, SequenceElement,
        TypeDef, TypeKind,
    },
    value::{EnumValue, StructValue, Value},
};

/// Decodes values according to the model of a [CodecContext].
#[derive(Debug)]
pub struct Unmarshaller<'c> {
    context: &'c CodecContext,
    model: &'c ValidatedModel,
    eval: ExpressionContext,
    /// End positions (in bits) of the enclosing containers.
    limits: Vec<u64>,
}

impl<'c> Unmarshaller<'c> {
    pub fn new(context: &'c CodecContext) -> Self {
        Self {
            context,
            model: context.model(),
            eval: ExpressionContext::new(Arc::clone(context.model())),
            limits: Vec::new(),
        }
    }

    /// Decodes a value of type `type_name` from the start of `data`.
    pub fn unmarshal(&mut self, data: &[u8], type_name: &str) -> Result<Value, CodecError> {
        let mut reader = BitReader::new(data);
        self.unmarshal_reader(&mut reader, type_name)
    }

    /// Buffers `source` and decodes a value of type `type_name` from it.
    pub fn unmarshal_from<R: Read>(&mut self, source: R, type_name: &str) -> Result<Value, CodecError> {
        let mut reader = BitReader::from_read(source)?;
        self.unmarshal_reader(&mut reader, type_name)
    }

    /// Decodes a value of type `type_name` at the current position of `reader`.
    pub fn unmarshal_reader(
        &mut self,
        reader: &mut BitReader<'_>,
        type_name: &str,
    ) -> Result<Value, CodecError> {
        let def = self.model.require_type(type_name)?;
        if def.content().is_some() && def.adapter.is_none() {
            return Err(CodecError::CannotUnmarshal(def.name.clone()));
        }

        debug!("unmarshal {} from {} bits", def.name, reader.remaining_bits());
        self.limits.push(reader.len_bits());
        let result = self.unmarshal_value(reader, def, &def.format);
        self.limits.pop();
        result
    }

    fn limit(&self, reader: &BitReader<'_>) -> u64 {
        self.limits.last().copied().unwrap_or(reader.len_bits())
    }

    fn unmarshal_value(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &'c TypeDef,
        format: &'c Format,
    ) -> Result<Value, CodecError> {
        if let Some(alignment) = format.alignment {
            reader.align_to(alignment)?;
        }
        let start = reader.bit_position();

        if let Some(adapter) = &def.adapter {
            trace!("unmarshal {} with adapter {adapter}", def.name);
            let value = self.context.adapter(adapter)?.unmarshal(reader)?;
            return self.check_type_discriminator(value, def);
        }

        let value = match &def.kind {
            TypeKind::Sequence(_) | TypeKind::TaggedSequence(_) | TypeKind::Choice(_) => {
                self.eval.push(Value::Struct(StructValue::new(def.name.clone())));
                let result = self.unmarshal_frame(reader, def, format, start);
                let value = self.eval.pop().unwrap_or_default();
                result?;
                value
            }
            TypeKind::Simple(_) | TypeKind::Enumeration(_) => {
                let value = self.unmarshal_simple(reader, def, format)?;
                self.skip_padding(reader, def, format, start)?;
                value
            }
        };

        self.check_type_discriminator(value, def)
    }

    /// Decodes into the struct on top of the scope stack.
    fn unmarshal_frame(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &'c TypeDef,
        format: &'c Format,
        start: u64,
    ) -> Result<(), CodecError> {
        match &def.kind {
            TypeKind::Sequence(seq) | TypeKind::TaggedSequence(seq) => {
                self.unmarshal_sequence(reader, def, seq)?
            }
            TypeKind::Choice(choice) => self.unmarshal_choice(reader, def, choice)?,
            _ => return Err(CodecError::CannotUnmarshal(def.name.clone())),
        }

        self.skip_padding(reader, def, format, start)
    }

    fn unmarshal_sequence(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &'c TypeDef,
        seq: &'c SequenceDef,
    ) -> Result<(), CodecError> {
        debug!("unmarshal sequence {} at bit {}", def.name, reader.bit_position());

        if let Some(tag) = &seq.tag {
            let tag_def = self.model.require_simple(&tag.type_name, "tag")?;
            let expected = tag.expected_value().ok_or_else(|| ModelError::InvalidTag {
                type_name: def.name.clone(),
                hex_value: tag.hex_value.clone(),
            })?;
            let bits = self.required_length(tag_def, &tag_def.format)?;
            let actual = reader.read_big_uint(bits as usize)?;
            if actual != BigUint::from(expected) {
                return Err(CodecError::TagMismatch {
                    type_name: def.name.clone(),
                    expected,
                    actual: actual.to_u64().unwrap_or(u64::MAX),
                });
            }
        }

        let Some(length_field) = &seq.length_field else {
            return self.unmarshal_elements(reader, def, seq);
        };

        let length_def = self.model.require_simple(&length_field.type_name, "length field")?;
        let length = self
            .unmarshal_integer(reader, length_def, &length_def.format)?
            .as_u64()
            .ok_or_else(|| CodecError::UnexpectedValue {
                type_name: length_def.name.clone(),
                expected: "unsigned length",
                found: "negative integer",
            })?;

        let payload_start = reader.bit_position();
        let declared_bits = length.saturating_mul(BYTE_SIZE as u64);
        if declared_bits > reader.remaining_bits() {
            return Err(StreamError::Truncated {
                needed: declared_bits,
                available: reader.remaining_bits(),
            }
            .into());
        }
        let limit = payload_start + declared_bits;
        trace!("{} payload is {length} bytes", def.name);

        let previous = self.eval.set_variable(LENGTH_VARIABLE, Value::UInt(length));
        self.limits.push(limit);
        let result = self.unmarshal_elements(reader, def, seq);
        self.limits.pop();
        self.eval.restore_variable(LENGTH_VARIABLE, previous);
        result?;

        let actual_bits = reader.bit_position() - payload_start;
        if actual_bits > declared_bits {
            return Err(CodecError::ExceedsExplicitLength {
                type_name: def.name.clone(),
                declared_bits,
                actual_bits,
            });
        }

        reader.set_bit_position(limit)?;
        Ok(())
    }

    fn unmarshal_elements(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &'c TypeDef,
        seq: &'c SequenceDef,
    ) -> Result<(), CodecError> {
        for element in &seq.elements {
            let name = element.name();
            let element_def = self.model.require_type(element.type_name())?;

            if self.model.is_list(element) {
                let items = self.unmarshal_list(reader, def, element, element_def)?;
                self.eval.set_field(name, Value::List(items));
            } else if self.model.is_optional(element) {
                let mark = reader.mark();
                match self.unmarshal_element(reader, &element.element, element_def) {
                    Ok(value) => self.eval.set_field(name, value),
                    Err(err) => {
                        trace!("optional {}.{name} absent: {err}", def.name);
                        reader.reset(mark)?;
                    }
                }
            } else {
                let value = self.unmarshal_element(reader, &element.element, element_def)?;
                self.eval.set_field(name, value);
            }
        }

        Ok(())
    }

    fn unmarshal_list(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &'c TypeDef,
        element: &'c SequenceElement,
        element_def: &'c TypeDef,
    ) -> Result<Vec<Value>, CodecError> {
        let kind = element.occurs_count_kind.unwrap_or(match element.occurs_count {
            Some(_) => OccursCountKind::Expression,
            None => OccursCountKind::Parsed,
        });
        let mut items = Vec::new();

        match kind {
            OccursCountKind::Expression => {
                let expr = element.occurs_count.as_deref().ok_or_else(|| {
                    CodecError::Unsupported {
                        type_name: def.name.clone(),
                        what: format!("occurs count expression missing on {}", element.name()),
                    }
                })?;
                let count = self.eval.evaluate_u64(expr)?;
                trace!("{}.{} has {count} items", def.name, element.name());
                for _ in 0..count {
                    items.push(self.unmarshal_element(reader, &element.element, element_def)?);
                }
            }
            OccursCountKind::Fixed => {
                let MaxOccurs::Bounded(count) = element.max_occurs else {
                    return Err(CodecError::Unsupported {
                        type_name: def.name.clone(),
                        what: format!("fixed occurrence of unbounded {}", element.name()),
                    });
                };
                for _ in 0..count {
                    items.push(self.unmarshal_element(reader, &element.element, element_def)?);
                }
            }
            OccursCountKind::Parsed => {
                while !element.max_occurs.reached(items.len() as u64)
                    && reader.bit_position() < self.limit(reader)
                {
                    let mark = reader.mark();
                    match self.unmarshal_element(reader, &element.element, element_def) {
                        Ok(_) if reader.bit_position() == mark.bit_position() => {
                            trace!("{}.{} item consumed nothing", def.name, element.name());
                            break;
                        }
                        Ok(item) => {
                            debug!("{}.{}[{}] decoded", def.name, element.name(), items.len());
                            items.push(item);
                        }
                        Err(err) => {
                            trace!("{}.{} ends after {} items: {err}", def.name, element.name(), items.len());
                            reader.reset(mark)?;
                            break;
                        }
                    }
                }
            }
        }

        if (items.len() as u64) < element.min_occurs {
            return Err(CodecError::TooFewOccurrences {
                field: format!("{}.{}", def.name, element.name()),
                min: element.min_occurs,
                found: items.len() as u64,
            });
        }

        Ok(items)
    }

    fn unmarshal_choice(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &'c TypeDef,
        choice: &'c ChoiceDef,
    ) -> Result<(), CodecError> {
        debug!("unmarshal choice {} at bit {}", def.name, reader.bit_position());

        for branch in &choice.elements {
            let branch_def = self.model.require_type(&branch.type_name)?;
            let mark = reader.mark();
            debug!("try {}.{}", def.name, branch.name);

            match self.unmarshal_element(reader, branch, branch_def) {
                Ok(value) => {
                    debug!("commit {}.{}", def.name, branch.name);
                    self.eval.set_field(&branch.name, value);
                    return Ok(());
                }
                Err(err) => {
                    trace!("{}.{} does not match: {err}", def.name, branch.name);
                    reader.reset(mark)?;
                }
            }
        }

        Err(CodecError::NoBranchMatched {
            type_name: def.name.clone(),
        })
    }

    /// Decodes one value of an element and checks the element's discriminator.
    fn unmarshal_element(
        &mut self,
        reader: &mut BitReader<'_>,
        element: &'c Element,
        def: &'c TypeDef,
    ) -> Result<Value, CodecError> {
        let value = self.unmarshal_value(reader, def, &element.format)?;
        match &element.discriminator {
            Some(discriminator) => self.check_discriminator(value, discriminator, &def.name),
            None => Ok(value),
        }
    }

    fn check_type_discriminator(&mut self, value: Value, def: &'c TypeDef) -> Result<Value, CodecError> {
        match &def.discriminator {
            Some(discriminator) => self.check_discriminator(value, discriminator, &def.name),
            None => Ok(value),
        }
    }

    /// Evaluates `discriminator` with `value` bound as `self` and the container as `up[1]`.
    fn check_discriminator(
        &mut self,
        value: Value,
        discriminator: &Discriminator,
        type_name: &str,
    ) -> Result<Value, CodecError> {
        self.eval.push(value);
        let result = self.eval.evaluate_bool(&discriminator.test);
        let value = self.eval.pop().unwrap_or_default();

        if result? {
            return Ok(value);
        }

        trace!("discriminator {:?} of {type_name} failed", discriminator.test);
        Err(CodecError::DiscriminatorFailed {
            type_name: type_name.to_string(),
            message: discriminator.message.clone().unwrap_or_else(|| {
                format!(
                    "discriminator {} failed for {type_name} = {value}",
                    discriminator.test
                )
            }),
        })
    }

    fn unmarshal_simple(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &'c TypeDef,
        format: &'c Format,
    ) -> Result<Value, CodecError> {
        let raw = match def.content() {
            Some(ContentKind::Integer) => self.unmarshal_integer(reader, def, format)?,
            Some(ContentKind::Text) => self.unmarshal_text(reader, def, format)?,
            Some(ContentKind::Opaque) => self.unmarshal_opaque(reader, def, format)?,
            None => return Err(CodecError::CannotUnmarshal(def.name.clone())),
        };

        let TypeKind::Enumeration(enumeration) = &def.kind else {
            return Ok(raw);
        };

        let element = enumeration.by_value(&raw).ok_or_else(|| {
            CodecError::UndefinedEnumerationValue {
                type_name: def.name.clone(),
                value: raw.to_string(),
            }
        })?;
        Ok(Value::Enum(EnumValue::new(def.name.clone(), element.name.clone())))
    }

    fn unmarshal_integer(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &TypeDef,
        format: &Format,
    ) -> Result<Value, CodecError> {
        let unsigned = format.is_unsigned();

        let value = match format.representation() {
            Representation::Binary => {
                let bits = self.required_length(def, format)?;
                match format.binary_number_rep() {
                    BinaryNumberRep::Binary => read_integer(reader, bits, unsigned)?,
                    BinaryNumberRep::Bcd => {
                        let raw = reader.read_big_uint(bits as usize)?;
                        let number = scalar::decode_bcd(&raw, bits, &def.name)?;
                        integer_value(BigInt::from(number), unsigned)
                    }
                }
            }
            Representation::Text => {
                let width = self.byte_width(def, format)?;
                let encoding = format.encoding();
                let pad_char = format.number_pad_character();
                scalar::check_number_padding(pad_char, format.number_justification(), &def.name)?;
                let pad = scalar::pad_byte(pad_char, encoding, &def.name)?;

                let bytes = reader.read_bytes(width)?;
                let content = scalar::strip_padding(&bytes, format.number_justification(), pad);
                let text = scalar::decode_text(content, encoding, &def.name)?;
                integer_value(scalar::parse_number(&text, pad_char, &def.name)?, unsigned)
            }
        };

        trace!("read {} = {value}", def.name);
        Ok(value)
    }

    fn unmarshal_text(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &TypeDef,
        format: &Format,
    ) -> Result<Value, CodecError> {
        let encoding = format.encoding();

        let text = match format.length_kind() {
            LengthKind::Explicit => {
                let width = self.byte_width(def, format)?;
                let bytes = reader.read_bytes(width)?;
                if format.is_padded() {
                    let pad = scalar::pad_byte(format.string_pad_character(), encoding, &def.name)?;
                    let content = scalar::strip_padding(&bytes, format.string_justification(), pad);
                    scalar::decode_text(content, encoding, &def.name)?
                } else {
                    scalar::decode_text(&bytes, encoding, &def.name)?
                }
            }
            LengthKind::Delimited if encoding == Encoding::Utf8 => {
                reader.read_zero_terminated_string()?
            }
            LengthKind::Delimited => {
                let mut bytes = Vec::new();
                loop {
                    match reader.read_byte()? {
                        0 => break,
                        byte => bytes.push(byte),
                    }
                }
                scalar::decode_text(&bytes, encoding, &def.name)?
            }
            LengthKind::EndOfParent | LengthKind::Implicit => {
                let bytes = self.read_to_limit(reader, def)?;
                scalar::decode_text(&bytes, encoding, &def.name)?
            }
        };

        trace!("read {} = {text:?}", def.name);
        Ok(Value::Text(text))
    }

    fn unmarshal_opaque(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &TypeDef,
        format: &Format,
    ) -> Result<Value, CodecError> {
        let bytes = match format.length_kind() {
            LengthKind::Explicit => {
                let width = self.byte_width(def, format)?;
                reader.read_bytes(width)?
            }
            LengthKind::Delimited => {
                return Err(CodecError::Unsupported {
                    type_name: def.name.clone(),
                    what: "delimited opaque content".to_string(),
                });
            }
            LengthKind::EndOfParent | LengthKind::Implicit => self.read_to_limit(reader, def)?,
        };

        trace!("read {} = {} bytes", def.name, bytes.len());
        Ok(Value::Bytes(bytes))
    }

    /// Reads the rest of the enclosing container.
    fn read_to_limit(&self, reader: &mut BitReader<'_>, def: &TypeDef) -> Result<Vec<u8>, CodecError> {
        let remaining = self.limit(reader).saturating_sub(reader.bit_position());
        let count = byte_count(def, remaining)?;
        Ok(reader.read_bytes(count)?)
    }

    /// Skips the gap between the consumed bits and the declared length.
    fn skip_padding(
        &mut self,
        reader: &mut BitReader<'_>,
        def: &TypeDef,
        format: &Format,
        start: u64,
    ) -> Result<(), CodecError> {
        let Some(declared) = self.eval.declared_length(format)? else {
            return Ok(());
        };
        let actual = reader.bit_position() - start;

        let target = match declared {
            DeclaredLength::Exact(bits) if actual > bits => {
                return Err(CodecError::ExceedsExplicitLength {
                    type_name: def.name.clone(),
                    declared_bits: bits,
                    actual_bits: actual,
                });
            }
            DeclaredLength::Exact(bits) | DeclaredLength::AtLeast(bits) => bits.max(actual),
        };

        if target > actual {
            trace!("skip {} padding bits of {}", target - actual, def.name);
            reader.skip_bits(target - actual)?;
        }

        Ok(())
    }

    fn required_length(&mut self, def: &TypeDef, format: &Format) -> Result<u64, CodecError> {
        self.eval
            .length_bits(format)?
            .ok_or_else(|| CodecError::MissingLength {
                type_name: def.name.clone(),
            })
    }

    fn byte_width(&mut self, def: &TypeDef, format: &Format) -> Result<usize, CodecError> {
        let bits = self.required_length(def, format)?;
        byte_count(def, bits)
    }
}

fn read_integer(reader: &mut BitReader<'_>, bits: u64, unsigned: bool) -> Result<Value, CodecError> {
    let bits = bits as usize;
    let value = match (bits <= 64, unsigned) {
        (true, true) => Value::UInt(reader.read_bits(bits)?),
        (true, false) => Value::Int(reader.read_signed_bits(bits)?),
        (false, true) => Value::BigInt(BigInt::from(reader.read_big_uint(bits)?)),
        (false, false) => Value::BigInt(reader.read_big_int(bits)?),
    };

    Ok(value)
}

fn integer_value(number: BigInt, unsigned: bool) -> Value {
    match (unsigned, number.to_u64()) {
        (true, Some(v)) => Value::UInt(v),
        _ => Value::from_big_int(number),
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::{Discriminator, Format, LengthUnit, Schema, SequenceElement, Tag};

    use super::*;

    fn int(name: &str, bits: u64, unsigned: bool) -> TypeDef {
        TypeDef::simple(name, ContentKind::Integer).with_format(
            Format::new()
                .with_length(bits.to_string(), LengthUnit::Bit)
                .with_unsigned(unsigned),
        )
    }

    fn context(types: Vec<TypeDef>) -> CodecContext {
        let schema = types.into_iter().fold(Schema::new(), Schema::with_type);
        CodecContext::from_schema(schema).unwrap()
    }

    #[test]
    fn test_unmarshal_bit_fields() {
        let context = context(vec![
            int("u3", 3, true),
            int("i5", 5, false),
            TypeDef::sequence(
                "Bits",
                vec![SequenceElement::new("a", "u3"), SequenceElement::new("b", "i5")],
            ),
        ]);
        let value = context
            .unmarshaller()
            .unmarshal(&[0b101_11111], "Bits")
            .unwrap();
        assert_eq!(
            value,
            StructValue::new("Bits").with("a", 5u8).with("b", -1).into()
        );
    }

    #[test]
    fn test_unmarshal_tag_mismatch() {
        let context = context(vec![
            int("u8", 8, true),
            TypeDef::tagged_sequence("Option1", Tag::new("u8", "0A"), vec![]),
        ]);
        let err = context
            .unmarshaller()
            .unmarshal(&[0x0B], "Option1")
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::TagMismatch {
                expected: 0x0A,
                actual: 0x0B,
                ..
            }
        ));
    }

    #[test]
    fn test_unmarshal_skips_rest_of_length_field_payload() {
        let context = context(vec![
            int("u8", 8, true),
            TypeDef::sequence("Inner", vec![SequenceElement::new("a", "u8")]).with_length_field("u8"),
            TypeDef::sequence(
                "Outer",
                vec![SequenceElement::new("inner", "Inner"), SequenceElement::new("b", "u8")],
            ),
        ]);
        let value = context
            .unmarshaller()
            .unmarshal(&[0x03, 0x01, 0xEE, 0xEE, 0x02], "Outer")
            .unwrap();
        let outer = value.as_struct().unwrap();
        assert_eq!(outer.get("b"), &Value::UInt(2));
        assert_eq!(
            outer.get("inner").as_struct().unwrap().get("a"),
            &Value::UInt(1)
        );
    }

    #[test]
    fn test_unmarshal_length_field_overrun() {
        let context = context(vec![
            int("u8", 8, true),
            int("u16", 16, true),
            TypeDef::sequence("Inner", vec![SequenceElement::new("a", "u16")]).with_length_field("u8"),
        ]);
        let err = context
            .unmarshaller()
            .unmarshal(&[0x01, 0x00, 0x05], "Inner")
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::ExceedsExplicitLength {
                declared_bits: 8,
                actual_bits: 16,
                ..
            }
        ));
    }

    #[test]
    fn test_optional_element_absent() {
        let context = context(vec![
            int("u8", 8, true),
            int("u16", 16, true),
            TypeDef::sequence(
                "Maybe",
                vec![
                    SequenceElement::new("a", "u8"),
                    SequenceElement::new("b", "u16").optional(),
                ],
            ),
        ]);
        let value = context.unmarshaller().unmarshal(&[7, 1], "Maybe").unwrap();
        let record = value.as_struct().unwrap();
        assert_eq!(record.get("a"), &Value::UInt(7));
        assert!(!record.contains("b"));
    }

    #[test]
    fn test_discriminator_failure() {
        let context = context(vec![
            int("u8", 8, true),
            TypeDef::sequence(
                "Version",
                vec![SequenceElement::new("v", "u8").with_discriminator(
                    Discriminator::new("self == 2")
                        .with_message("unsupported version"),
                )],
            ),
        ]);

        assert!(context.unmarshaller().unmarshal(&[2], "Version").is_ok());

        let err = context.unmarshaller().unmarshal(&[3], "Version").unwrap_err();
        assert!(matches!(
            err,
            CodecError::DiscriminatorFailed { ref message, .. } if message == "unsupported version"
        ));
    }

    #[test]
    fn test_parsed_list_too_few() {
        let context = context(vec![
            int("u16", 16, true),
            TypeDef::sequence(
                "Words",
                vec![SequenceElement::new("w", "u16").with_occurs(2, MaxOccurs::Unbounded)],
            ),
        ]);

        let value = context
            .unmarshaller()
            .unmarshal(&[0, 1, 0, 2, 0, 3, 9], "Words")
            .unwrap();
        assert_eq!(
            value.as_struct().unwrap().get("w"),
            &Value::List(vec![Value::UInt(1), Value::UInt(2), Value::UInt(3)])
        );

        let err = context.unmarshaller().unmarshal(&[0, 1], "Words").unwrap_err();
        assert!(matches!(
            err,
            CodecError::TooFewOccurrences { min: 2, found: 1, .. }
        ));
    }

    #[test]
    fn test_unmarshal_rejects_simple_root() {
        let context = context(vec![int("u8", 8, true)]);
        assert!(matches!(
            context.unmarshaller().unmarshal(&[1], "u8"),
            Err(CodecError::CannotUnmarshal(_))
        ));
        assert!(matches!(
            context.unmarshaller().unmarshal(&[1], "u9"),
            Err(CodecError::UnknownType(_))
        ));
    }
}
