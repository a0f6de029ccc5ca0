#![allow(dead_code)]

use bitform::{
    Adapter, CodecContext, CodecError, Schema, Value,
    bits::{BitReader, BitWriter},
    schema::{
        BinaryNumberRep, ContentKind, Discriminator, Element, EnumerationElement, Format,
        Justification, LengthKind, LengthUnit, MaxOccurs, OccursCountKind, Representation,
        SequenceElement, Tag, TypeDef,
    },
};

/// Unsigned integer prefixed by a byte count once it no longer fits into 7 bits.
pub struct VarInt;

impl Adapter for VarInt {
    fn marshal(&self, value: &Value, writer: &mut BitWriter) -> Result<(), CodecError> {
        let n = value
            .as_u64()
            .ok_or_else(|| CodecError::adapter("VarInt", "expected an unsigned integer"))?;
        if n < 0x80 {
            writer.write_byte(n as u8);
            return Ok(());
        }

        let bytes = n.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        writer.write_byte(0x80 | (bytes.len() - skip) as u8);
        writer.write_bytes(&bytes[skip..]);
        Ok(())
    }

    fn unmarshal(&self, reader: &mut BitReader<'_>) -> Result<Value, CodecError> {
        let first = reader.read_byte()?;
        if first < 0x80 {
            return Ok(Value::UInt(first.into()));
        }

        let count = usize::from(first & 0x7F);
        if count > 8 {
            return Err(CodecError::adapter(
                "VarInt",
                format!("{count} bytes do not fit into 64 bits"),
            ));
        }
        let n = reader
            .read_bytes(count)?
            .into_iter()
            .fold(0u64, |acc, b| acc << 8 | u64::from(b));
        Ok(Value::UInt(n))
    }
}

fn int(name: &str, bits: u64, unsigned: bool) -> TypeDef {
    TypeDef::simple(name, ContentKind::Integer).with_format(
        Format::new()
            .with_length(bits.to_string(), LengthUnit::Bit)
            .with_unsigned(unsigned),
    )
}

fn fields(names: &[(&str, &str)]) -> Vec<SequenceElement> {
    names
        .iter()
        .map(|(name, type_name)| SequenceElement::new(*name, *type_name))
        .collect()
}

pub fn schema() -> Schema {
    let types = vec![
        int("i8", 8, false),
        int("u8", 8, true),
        int("i16", 16, false),
        int("u16", 16, true),
        int("i24", 24, false),
        int("u24", 24, true),
        int("i32", 32, false),
        int("u32", 32, true),
        // numbers
        TypeDef::sequence(
            "ShortNumbers",
            fields(&[("i8", "i8"), ("u8", "u8"), ("i16", "i16"), ("u16", "u16")]),
        ),
        TypeDef::sequence(
            "LongNumbers",
            fields(&[("i24", "i24"), ("u24", "u24"), ("i32", "i32"), ("u32", "u32")]),
        ),
        TypeDef::sequence(
            "AllNumbers",
            fields(&[("short", "ShortNumbers"), ("long", "LongNumbers")]),
        ),
        // tagged choice
        TypeDef::tagged_sequence("Option1", Tag::new("u8", "0A"), fields(&[("value", "u8")])),
        TypeDef::tagged_sequence(
            "Option2",
            Tag::new("u8", "0x0B"),
            fields(&[("small", "i16"), ("big", "i32")]),
        )
        .with_length_field("u8"),
        TypeDef::choice(
            "MyChoice",
            vec![
                Element::new("option1", "Option1"),
                Element::new("option2", "Option2"),
            ],
        ),
        // discriminated choice
        TypeDef::sequence("Status", fields(&[("code", "u8")])),
        TypeDef::choice(
            "Reply",
            vec![
                Element::new("success", "Status")
                    .with_discriminator(Discriminator::new("self.code == 0")),
                Element::new("failure", "Status"),
            ],
        ),
        // lists
        TypeDef::sequence(
            "NumberList",
            vec![
                SequenceElement::new("numItems", "u8")
                    .with_output_value_calc("length(self.items)"),
                SequenceElement::new("items", "i32").with_occurs_count("self.numItems"),
            ],
        ),
        TypeDef::sequence(
            "Readings",
            vec![SequenceElement::new("values", "u16").with_occurs(0, MaxOccurs::Unbounded)],
        )
        .with_length_field("u8"),
        TypeDef::sequence(
            "Packet",
            fields(&[("readings", "Readings"), ("checksum", "u8")]),
        ),
        // adapter
        TypeDef::simple("VarInt", ContentKind::Integer).with_adapter("VarInt"),
        TypeDef::sequence("Counter", fields(&[("count", "VarInt"), ("tail", "u8")])),
        // text
        TypeDef::simple("Text", ContentKind::Text),
        TypeDef::sequence(
            "City",
            vec![SequenceElement::new("name", "Text")
                .with_format(Format::new().with_length_kind(LengthKind::EndOfParent))],
        )
        .with_length_field("u8"),
        TypeDef::simple("Name8", ContentKind::Text).with_format(
            Format::new()
                .with_length("8", LengthUnit::Byte)
                .with_padding()
                .with_string_justification(Justification::Left, ' '),
        ),
        TypeDef::simple("Quantity", ContentKind::Integer).with_format(
            Format::new()
                .with_representation(Representation::Text)
                .with_length("6", LengthUnit::Byte)
                .with_number_justification(Justification::Right, '0'),
        ),
        TypeDef::sequence(
            "Order",
            fields(&[("customer", "Name8"), ("quantity", "Quantity")]),
        ),
        // BCD
        TypeDef::simple("Bcd16", ContentKind::Integer).with_format(
            Format::new()
                .with_length("16", LengthUnit::Bit)
                .with_binary_number_rep(BinaryNumberRep::Bcd)
                .with_unsigned(true),
        ),
        TypeDef::sequence("Amount", fields(&[("value", "Bcd16")])),
        // enumeration
        TypeDef::enumeration(
            "Color",
            ContentKind::Integer,
            vec![
                EnumerationElement::new("Red", 1),
                EnumerationElement::new("Green", 2),
                EnumerationElement::new("Blue", 3),
            ],
        )
        .with_base("u8"),
        TypeDef::sequence("Pixel", fields(&[("color", "Color"), ("alpha", "u8")])),
        // padding
        TypeDef::sequence("Padded", fields(&[("value", "u32")]))
            .with_format(Format::new().with_length("11", LengthUnit::Byte)),
        TypeDef::sequence("Min", fields(&[("value", "u8")]))
            .with_format(Format::new().with_min_length("3")),
        TypeDef::simple("Label", ContentKind::Text).with_format(
            Format::new()
                .with_length("6", LengthUnit::Byte)
                .with_padding()
                .with_string_justification(Justification::Center, '*'),
        ),
        TypeDef::sequence("Badge", fields(&[("label", "Label")])),
        // opaque
        TypeDef::simple("Digest", ContentKind::Opaque)
            .with_format(Format::new().with_length("4", LengthUnit::Byte)),
        TypeDef::sequence("Signed", fields(&[("digest", "Digest")])),
        TypeDef::simple("Blob", ContentKind::Opaque),
        TypeDef::sequence(
            "Msg",
            vec![
                SequenceElement::new("kind", "u8"),
                SequenceElement::new("body", "Blob")
                    .with_format(Format::new().with_length("$length - 1", LengthUnit::Byte)),
            ],
        )
        .with_length_field("u8"),
        // alignment and delimited text
        int("u3", 3, true),
        TypeDef::sequence(
            "Aligned",
            vec![
                SequenceElement::new("flag", "u3"),
                SequenceElement::new("value", "u8")
                    .with_format(Format::new().with_alignment(16)),
                SequenceElement::new("name", "Text")
                    .with_format(Format::new().with_length_kind(LengthKind::Delimited)),
            ],
        ),
        // fixed occurrences
        TypeDef::sequence(
            "Triple",
            vec![SequenceElement::new("xs", "u8")
                .with_occurs(3, MaxOccurs::Bounded(3))
                .with_occurs_count_kind(OccursCountKind::Fixed)],
        ),
    ];

    types.into_iter().fold(Schema::new(), Schema::with_type)
}

pub fn context() -> CodecContext {
    let mut context = CodecContext::from_schema(schema()).unwrap();
    context.register_adapter("VarInt", VarInt);
    context
}

/// Marshals `value`, asserts the encoding and returns the unmarshalled value.
pub fn encode_decode(context: &CodecContext, mut value: Value, expected: &[u8]) -> Value {
    let type_name = value.as_struct().unwrap().type_name.clone();
    let bytes = context.marshaller().marshal(&mut value).unwrap();
    assert_eq!(bytes, expected);

    let decoded = context.unmarshaller().unmarshal(&bytes, &type_name).unwrap();
    assert_eq!(decoded, value);
    decoded
}
