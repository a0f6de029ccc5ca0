use bitform::{
    CodecContext, Schema, StructValue, Value,
    schema::{ContentKind, Format, LengthUnit, SequenceElement, TypeDef},
};
use criterion::{Criterion, criterion_group, criterion_main};

fn gen_context(field_count: usize) -> CodecContext {
    let u16_type = TypeDef::simple("u16", ContentKind::Integer).with_format(
        Format::new()
            .with_length("16", LengthUnit::Bit)
            .with_unsigned(true),
    );

    let elements = (0..field_count)
        .map(|i| SequenceElement::new(format!("f{}", i), "u16"))
        .collect();

    let schema = Schema::new()
        .with_type(u16_type)
        .with_type(TypeDef::sequence("Record", elements));

    CodecContext::from_schema(schema).unwrap()
}

fn gen_value(field_count: usize) -> Value {
    let mut record = StructValue::new("Record");

    // Deterministic but non-trivial pattern
    for i in 0..field_count {
        record.set(format!("f{}", i), (i * 31 % 65536) as u16);
    }

    record.into()
}

fn bench_marshal(c: &mut Criterion) {
    for &field_count in &[1usize, 10, 50, 100] {
        let context = gen_context(field_count);
        let mut value = gen_value(field_count);

        c.bench_function(&format!("marshal_{}_fields", field_count), |b| {
            b.iter(|| {
                let _ = context.marshaller().marshal(&mut value).unwrap();
            })
        });
    }
}

fn bench_unmarshal(c: &mut Criterion) {
    for &field_count in &[1usize, 10, 50, 100] {
        let context = gen_context(field_count);
        let packet = context
            .marshaller()
            .marshal(&mut gen_value(field_count))
            .unwrap();

        c.bench_function(&format!("unmarshal_{}_fields", field_count), |b| {
            b.iter(|| {
                let _ = context.unmarshaller().unmarshal(&packet, "Record").unwrap();
            })
        });
    }
}

criterion_group!(benches, bench_marshal, bench_unmarshal);
criterion_main!(benches);
