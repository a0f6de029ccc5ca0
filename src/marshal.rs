//! Schema-driven encoder: walks a [Value] tree and writes its bit-level representation.

use std::io::Write;
use std::mem;
use std::sync::Arc;

use log::{debug, trace};
use num_bigint::{BigInt, BigUint};
use num_traits::ToPrimitive;

use crate::{
    bits::{BYTE_SIZE, BitWriter},
    compiled::ValidatedModel,
    context::CodecContext,
    errors::{CodecError, ModelError},
    eval::{DeclaredLength, ExpressionContext, LENGTH_VARIABLE},
    scalar,
    schema::{
        BinaryNumberRep, ChoiceDef, ContentKind, Element, Format, LengthKind, Representation,
        SequenceDef, SequenceElement, TypeDef, TypeKind,
    },
    value::Value,
};

/// Encodes values according to the model of a [CodecContext].
///
/// The value tree is borrowed mutably: fields are moved into the evaluation scope while
/// they are encoded and moved back afterwards, and derived fields are updated in place.
#[derive(Debug)]
pub struct Marshaller<'c> {
    context: &'c CodecContext,
    model: &'c ValidatedModel,
    eval: ExpressionContext,
}

impl<'c> Marshaller<'c> {
    pub fn new(context: &'c CodecContext) -> Self {
        Self {
            context,
            model: context.model(),
            eval: ExpressionContext::new(Arc::clone(context.model())),
        }
    }

    /// Encodes `value`, a struct whose `type_name` names a sequence or choice.
    pub fn marshal(&mut self, value: &mut Value) -> Result<Vec<u8>, CodecError> {
        let mut writer = BitWriter::new();
        self.marshal_into(value, &mut writer)?;
        Ok(writer.into_bytes())
    }

    /// Encodes `value` and writes the bytes to `sink`.
    pub fn marshal_to<W: Write>(&mut self, value: &mut Value, sink: &mut W) -> Result<(), CodecError> {
        let mut writer = BitWriter::new();
        self.marshal_into(value, &mut writer)?;
        writer.write_to(sink)?;
        Ok(())
    }

    /// Encodes `value` at the current position of `writer`.
    pub fn marshal_into(&mut self, value: &mut Value, writer: &mut BitWriter) -> Result<(), CodecError> {
        let Value::Struct(root) = value else {
            return Err(CodecError::CannotMarshal(format!("{} value", value.kind_name())));
        };

        let def = self.model.require_type(&root.type_name)?;
        if def.content().is_some() && def.adapter.is_none() {
            return Err(CodecError::CannotMarshal(def.name.clone()));
        }

        debug!("marshal {}", def.name);
        self.marshal_value(value, def, &def.format, writer)
    }

    fn marshal_value(
        &mut self,
        value: &mut Value,
        def: &'c TypeDef,
        format: &'c Format,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        if let Some(alignment) = format.alignment {
            writer.align_to(alignment);
        }
        let start = writer.bit_position();

        if let Some(adapter) = &def.adapter {
            trace!("marshal {} with adapter {adapter}", def.name);
            return self.context.adapter(adapter)?.marshal(value, writer);
        }

        match &def.kind {
            TypeKind::Sequence(_) | TypeKind::TaggedSequence(_) | TypeKind::Choice(_) => {
                if !matches!(value, Value::Struct(_)) {
                    return Err(CodecError::UnexpectedValue {
                        type_name: def.name.clone(),
                        expected: "struct",
                        found: value.kind_name(),
                    });
                }

                self.eval.push(mem::take(value));
                let result = self.marshal_frame(def, format, start, writer);
                *value = self.eval.pop().unwrap_or_default();
                result
            }
            TypeKind::Simple(_) | TypeKind::Enumeration(_) => {
                let sized = self.payload_sized(format)?;
                let format = sized.as_ref().unwrap_or(format);
                self.marshal_simple(value, def, format, writer)?;
                self.pad(def, format, start, writer)
            }
        }
    }

    /// Encodes the structured value on top of the scope stack.
    fn marshal_frame(
        &mut self,
        def: &'c TypeDef,
        format: &'c Format,
        start: u64,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        match &def.kind {
            TypeKind::Sequence(seq) | TypeKind::TaggedSequence(seq) => {
                self.marshal_sequence(def, seq, writer)?
            }
            TypeKind::Choice(choice) => self.marshal_choice(def, choice, writer)?,
            _ => return Err(CodecError::CannotMarshal(def.name.clone())),
        }

        self.pad(def, format, start, writer)
    }

    fn marshal_sequence(
        &mut self,
        def: &'c TypeDef,
        seq: &'c SequenceDef,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        debug!("marshal sequence {} at bit {}", def.name, writer.bit_position());

        if let Some(tag) = &seq.tag {
            let tag_def = self.model.require_simple(&tag.type_name, "tag")?;
            let expected = tag.expected_value().ok_or_else(|| ModelError::InvalidTag {
                type_name: def.name.clone(),
                hex_value: tag.hex_value.clone(),
            })?;
            let bits = self.required_length(tag_def, &tag_def.format)?;
            writer.write_big_uint(&BigUint::from(expected), bits as usize);
        }

        let Some(length_field) = &seq.length_field else {
            return self.marshal_elements(def, seq, writer);
        };

        let length_def = self.model.require_simple(&length_field.type_name, "length field")?;
        let mut payload = BitWriter::new();
        self.marshal_elements(def, seq, &mut payload)?;
        if payload.bit_offset() != 0 {
            return Err(CodecError::UnalignedPayload {
                type_name: def.name.clone(),
                bit_offset: payload.bit_offset(),
            });
        }

        let bytes = payload.into_bytes();
        trace!("{} payload is {} bytes", def.name, bytes.len());
        self.marshal_integer(
            &Value::UInt(bytes.len() as u64),
            length_def,
            &length_def.format,
            writer,
        )?;
        writer.write_bytes(&bytes);
        Ok(())
    }

    fn marshal_elements(
        &mut self,
        def: &'c TypeDef,
        seq: &'c SequenceDef,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        for element in &seq.elements {
            let name = element.name();

            if let Some(calc) = element
                .output_value_calc
                .as_ref()
                .filter(|_| !self.model.is_list(element))
            {
                let derived = self.eval.evaluate(calc)?;
                trace!("derived {}.{name} = {derived}", def.name);
                self.eval.set_field(name, derived);
            }

            if self.eval.field(name).is_null() {
                if element.min_occurs == 0 {
                    trace!("skip absent {}.{name}", def.name);
                    continue;
                }
                return Err(CodecError::MissingField {
                    type_name: def.name.clone(),
                    field: name.to_string(),
                });
            }

            self.marshal_field(element, writer)?;
        }

        Ok(())
    }

    /// Moves a field of the top frame out, encodes it, and moves it back.
    fn marshal_field(
        &mut self,
        element: &'c SequenceElement,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        let def = self.model.require_type(element.type_name())?;
        let mut field = self.eval.take_field(element.name());

        let result = if self.model.is_list(element) {
            self.marshal_list(&mut field, &element.element, def, writer)
        } else {
            self.marshal_value(&mut field, def, &element.element.format, writer)
        };

        self.eval.set_field(element.name(), field);
        result
    }

    fn marshal_list(
        &mut self,
        field: &mut Value,
        element: &'c Element,
        def: &'c TypeDef,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        let Value::List(items) = field else {
            return Err(CodecError::UnexpectedValue {
                type_name: def.name.clone(),
                expected: "list",
                found: field.kind_name(),
            });
        };

        trace!("marshal {} items of {}", items.len(), element.name);
        for item in items.iter_mut() {
            self.marshal_value(item, def, &element.format, writer)?;
        }

        Ok(())
    }

    fn marshal_choice(
        &mut self,
        def: &'c TypeDef,
        choice: &'c ChoiceDef,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        let branch = choice
            .elements
            .iter()
            .find(|branch| !self.eval.field(&branch.name).is_null())
            .ok_or_else(|| CodecError::NoBranchSelected {
                type_name: def.name.clone(),
            })?;
        debug!("marshal choice {} as {}", def.name, branch.name);

        let branch_def = self.model.require_type(&branch.type_name)?;
        let mut field = self.eval.take_field(&branch.name);
        let result = self.marshal_value(&mut field, branch_def, &branch.format, writer);
        self.eval.set_field(&branch.name, field);
        result
    }

    /// `$length` is only known once the payload has been written, so an explicit length
    /// reading it is replaced by the value's own size.
    fn payload_sized(&mut self, format: &Format) -> Result<Option<Format>, CodecError> {
        let Some(length) = &format.length else {
            return Ok(None);
        };
        if format.length_kind() != LengthKind::Explicit
            || self.eval.variable(LENGTH_VARIABLE).is_some()
            || !self.eval.references(length, LENGTH_VARIABLE)?
        {
            return Ok(None);
        }

        let mut sized = format.clone();
        sized.length = None;
        sized.length_kind = Some(LengthKind::EndOfParent);
        Ok(Some(sized))
    }

    fn marshal_simple(
        &mut self,
        value: &Value,
        def: &'c TypeDef,
        format: &Format,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        let content = match &def.kind {
            TypeKind::Enumeration(enumeration) => {
                let Value::Enum(constant) = value else {
                    return Err(CodecError::UnexpectedValue {
                        type_name: def.name.clone(),
                        expected: "enumeration",
                        found: value.kind_name(),
                    });
                };
                let element = enumeration.by_name(&constant.name).ok_or_else(|| {
                    CodecError::UnknownEnumerationElement {
                        type_name: def.name.clone(),
                        name: constant.name.clone(),
                    }
                })?;
                &element.value
            }
            _ => value,
        };

        match def.content() {
            Some(ContentKind::Integer) => self.marshal_integer(content, def, format, writer),
            Some(ContentKind::Text) => self.marshal_text(content, def, format, writer),
            Some(ContentKind::Opaque) => self.marshal_opaque(content, def, format, writer),
            None => Err(CodecError::CannotMarshal(def.name.clone())),
        }
    }

    fn marshal_integer(
        &mut self,
        value: &Value,
        def: &TypeDef,
        format: &Format,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        let number = value.as_big_int().ok_or_else(|| CodecError::UnexpectedValue {
            type_name: def.name.clone(),
            expected: "integer",
            found: value.kind_name(),
        })?;

        match format.representation() {
            Representation::Binary => {
                let bits = self.required_length(def, format)?;
                trace!("write {} = {number} in {bits} bits", def.name);

                match format.binary_number_rep() {
                    BinaryNumberRep::Binary => write_integer(&number, bits, writer)?,
                    BinaryNumberRep::Bcd => {
                        let packed = scalar::encode_bcd(&number, bits, &def.name)?;
                        writer.write_big_uint(&packed, bits as usize);
                    }
                }
            }
            Representation::Text => {
                let width = self.byte_width(def, format)?;
                let encoding = format.encoding();
                let text = number.to_string();
                scalar::check_number_padding(
                    format.number_pad_character(),
                    format.number_justification(),
                    &def.name,
                )?;
                let pad = scalar::pad_byte(format.number_pad_character(), encoding, &def.name)?;
                let content = scalar::encode_text(&text, encoding, &def.name)?;

                let justified = scalar::justify(&content, width, format.number_justification(), pad)
                    .ok_or_else(|| CodecError::ValueTooWide {
                        type_name: def.name.clone(),
                        width: format!("{width} bytes"),
                        value: text.clone(),
                    })?;
                trace!("write {} = {text:?} in {width} bytes", def.name);
                writer.write_bytes(&justified);
            }
        }

        Ok(())
    }

    fn marshal_text(
        &mut self,
        value: &Value,
        def: &TypeDef,
        format: &Format,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        let text = value.as_str().ok_or_else(|| CodecError::UnexpectedValue {
            type_name: def.name.clone(),
            expected: "text",
            found: value.kind_name(),
        })?;
        let encoding = format.encoding();
        let bytes = scalar::encode_text(text, encoding, &def.name)?;
        trace!("write {} = {text:?}", def.name);

        match format.length_kind() {
            LengthKind::Explicit => {
                let width = self.byte_width(def, format)?;
                if format.is_padded() {
                    let pad = scalar::pad_byte(format.string_pad_character(), encoding, &def.name)?;
                    let justified =
                        scalar::justify(&bytes, width, format.string_justification(), pad)
                            .ok_or_else(|| CodecError::ValueTooWide {
                                type_name: def.name.clone(),
                                width: format!("{width} bytes"),
                                value: text.to_string(),
                            })?;
                    writer.write_bytes(&justified);
                } else {
                    check_length(def, width, bytes.len())?;
                    writer.write_bytes(&bytes);
                }
            }
            LengthKind::Delimited => {
                writer.write_bytes(&bytes);
                writer.write_byte(0);
            }
            LengthKind::EndOfParent | LengthKind::Implicit => writer.write_bytes(&bytes),
        }

        Ok(())
    }

    fn marshal_opaque(
        &mut self,
        value: &Value,
        def: &TypeDef,
        format: &Format,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        let bytes = value.as_bytes().ok_or_else(|| CodecError::UnexpectedValue {
            type_name: def.name.clone(),
            expected: "bytes",
            found: value.kind_name(),
        })?;

        match format.length_kind() {
            LengthKind::Explicit => {
                let width = self.byte_width(def, format)?;
                check_length(def, width, bytes.len())?;
            }
            LengthKind::Delimited => {
                return Err(CodecError::Unsupported {
                    type_name: def.name.clone(),
                    what: "delimited opaque content".to_string(),
                });
            }
            LengthKind::EndOfParent | LengthKind::Implicit => {}
        }

        trace!("write {} = {} bytes", def.name, bytes.len());
        writer.write_bytes(bytes);
        Ok(())
    }

    /// Fills the gap between the emitted bits and the declared length with the fill byte.
    fn pad(
        &mut self,
        def: &TypeDef,
        format: &Format,
        start: u64,
        writer: &mut BitWriter,
    ) -> Result<(), CodecError> {
        let Some(declared) = self.eval.declared_length(format)? else {
            return Ok(());
        };
        let actual = writer.bit_position() - start;

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

        let shortfall = target - actual;
        if shortfall == 0 {
            return Ok(());
        }
        if shortfall % BYTE_SIZE as u64 != 0 {
            return Err(CodecError::UnalignedPadding {
                type_name: def.name.clone(),
                bits: shortfall,
            });
        }

        trace!("pad {} with {} fill bytes", def.name, shortfall / 8);
        for _ in 0..shortfall / BYTE_SIZE as u64 {
            writer.write_byte(format.fill_byte());
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

pub(crate) fn byte_count(def: &TypeDef, bits: u64) -> Result<usize, CodecError> {
    if bits % BYTE_SIZE as u64 != 0 {
        return Err(CodecError::Unsupported {
            type_name: def.name.clone(),
            what: format!("length of {bits} bits for byte-oriented content"),
        });
    }

    Ok((bits / BYTE_SIZE as u64) as usize)
}

fn check_length(def: &TypeDef, expected: usize, actual: usize) -> Result<(), CodecError> {
    if expected != actual {
        return Err(CodecError::LengthMismatch {
            type_name: def.name.clone(),
            expected: expected as u64,
            actual: actual as u64,
        });
    }

    Ok(())
}

/// Writes the low-order `bits` bits of `number` in two's complement.
fn write_integer(number: &BigInt, bits: u64, writer: &mut BitWriter) -> Result<(), CodecError> {
    if bits <= 64 {
        if let Some(v) = number.to_i64() {
            writer.write_signed_bits(v, bits as usize)?;
            return Ok(());
        }
        if let Some(v) = number.to_u64() {
            writer.write_bits(v, bits as usize)?;
            return Ok(());
        }
    }

    writer.write_big_int(number, bits as usize);
    Ok(())
}
