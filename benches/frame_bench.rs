use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use refbox_comm::{Frame, FrameCodec};
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let payload_sizes = [16usize, 256, 1400, 16 * 1024, 1024 * 1024];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || Frame::new(2000, 20, vec![0u8; size]).unwrap(),
                |frame| {
                    let mut buf = BytesMut::with_capacity(size + 8);
                    let mut codec = FrameCodec::default();
                    codec.encode(frame, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("decode_{size}b"), |b| {
            let mut wire = BytesMut::new();
            FrameCodec::default()
                .encode(Frame::new(2000, 20, vec![0u8; size]).unwrap(), &mut wire)
                .unwrap();
            b.iter_batched(
                || wire.clone(),
                |mut buf| {
                    let decoded = FrameCodec::default().decode(&mut buf).unwrap();
                    assert!(decoded.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_datagram_parse(c: &mut Criterion) {
    let datagram = Frame::new(2000, 20, vec![7u8; 1400]).unwrap().to_bytes();
    c.bench_function("datagram_parse_1400b", |b| {
        b.iter(|| {
            let frame = Frame::from_datagram(&datagram);
            assert!(frame.is_ok());
        })
    });
}

criterion_group!(benches, bench_frame_encode_decode, bench_datagram_parse);
criterion_main!(benches);
