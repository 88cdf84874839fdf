use astron_replica::comms::frame::{decode_frame, ClientMessage, Frame, InternalMessage};
use astron_replica::comms::messages::{EntryKind, ObjectEntry};
use astron_replica::schema::{Audience, FieldModifiers, SchemaBuilder};
use astron_replica::wire::{FieldType, FieldValue};
use astron_replica::{ChannelId, ClassId, ObjectId, ZoneId};
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn frame_benchmark(c: &mut Criterion) {
    let client = ClientMessage::new(120, Bytes::from(vec![7u8; 64]));
    let internal = InternalMessage::to(ChannelId::new(1000), ChannelId::new(4000), 2020, Bytes::from(vec![7u8; 64]));
    let client_frame = client.to_frame().unwrap();
    let internal_frame = internal.to_frame().unwrap();

    c.bench_function("client_frame_encode", |b| b.iter(|| black_box(&client).to_frame()));
    c.bench_function("client_frame_decode", |b| {
        b.iter(|| decode_frame::<ClientMessage>(black_box(&client_frame)))
    });
    c.bench_function("internal_frame_encode", |b| b.iter(|| black_box(&internal).to_frame()));
    c.bench_function("internal_frame_decode", |b| {
        b.iter(|| decode_frame::<InternalMessage>(black_box(&internal_frame)))
    });
}

fn entry_benchmark(c: &mut Criterion) {
    let mods = FieldModifiers::new().required().broadcast();
    let schema = SchemaBuilder::new()
        .class("Avatar", &[], |c| {
            c.field("x", FieldType::Float64, mods)
                .field("y", FieldType::Float64, mods)
                .field("z", FieldType::Float64, mods)
                .field("name", FieldType::String, mods)
                .field("tags", FieldType::Tuple(vec![FieldType::UInt16, FieldType::Blob]), mods);
        })
        .build()
        .unwrap();
    let entry = ObjectEntry::with_required(
        &schema,
        Audience::Internal,
        ObjectId::new(100_000),
        ObjectId::new(1),
        ZoneId::new(2),
        ClassId::new(0),
        vec![
            FieldValue::Float64(1.5),
            FieldValue::Float64(-2.25),
            FieldValue::Float64(0.0),
            FieldValue::from("bench avatar"),
            FieldValue::Tuple(vec![FieldValue::UInt16(3), FieldValue::Blob(Bytes::from_static(b"abc"))]),
        ],
    )
    .unwrap();
    let payload = entry.encode(EntryKind::AiRequired);

    c.bench_function("object_entry_encode", |b| {
        b.iter(|| black_box(&entry).encode(EntryKind::AiRequired))
    });
    c.bench_function("object_entry_decode", |b| {
        b.iter(|| ObjectEntry::decode(EntryKind::AiRequired, black_box(&payload), &schema))
    });
}

criterion_group!(benches, frame_benchmark, entry_benchmark);
criterion_main!(benches);
