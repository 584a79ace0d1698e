use criterion::{criterion_group, criterion_main, Criterion};
use refbox_comm::{MessageRegistry, SerializationFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct MachineInfo {
    name: String,
    team: String,
    zone: u32,
    rotation: u32,
    lights: Vec<u8>,
}

fn sample() -> MachineInfo {
    MachineInfo {
        name: "C-BS".into(),
        team: "CYAN".into(),
        zone: 51,
        rotation: 90,
        lights: vec![1, 0, 2],
    }
}

#[allow(clippy::unwrap_used)]
fn bench_registry_formats(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_round_trip");

    for format in [
        SerializationFormat::Bincode,
        SerializationFormat::Json,
        SerializationFormat::MessagePack,
    ] {
        let registry = MessageRegistry::with_format(format);
        registry.register::<MachineInfo>(2000, 13).unwrap();
        let message = sample();

        group.bench_function(format!("serialize_{}", format.name()), |b| {
            b.iter(|| registry.serialize_message(&message).unwrap())
        });

        let frame = registry.serialize_message(&message).unwrap();
        group.bench_function(format!("deserialize_{}", format.name()), |b| {
            b.iter(|| registry.deserialize(&frame.header, &frame.payload).unwrap())
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_lookup(c: &mut Criterion) {
    let registry = MessageRegistry::new();
    registry.register::<MachineInfo>(2000, 13).unwrap();
    c.bench_function("new_instance", |b| {
        b.iter(|| registry.new_instance(2000, 13).unwrap())
    });
}

criterion_group!(benches, bench_registry_formats, bench_lookup);
criterion_main!(benches);
