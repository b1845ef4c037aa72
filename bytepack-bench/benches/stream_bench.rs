//! Stream adapter benchmarks.

use bytepack_core::{Codec, Options, PrimitiveKind, TypeDescriptor, Value};
use bytepack_io::{
    recv_value, send_value, AsyncValueReader, AsyncValueWriter, StreamConfig, ValueReader,
};
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Cursor;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

fn create_batch(size: usize) -> Value {
    Value::List((0..size).map(|i| Value::String(format!("event-{}", i))).collect())
}

fn bench_blocking_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocking_read");
    let codec = Codec::new(Options::default());
    let ty = TypeDescriptor::list(TypeDescriptor::string());

    for size in [100, 10000] {
        let encoded = codec.encode(&create_batch(size), &ty).unwrap();
        let config = StreamConfig::default();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut reader =
                    ValueReader::new(Cursor::new(&encoded[..]), codec.clone(), ty.clone(), &config);
                black_box(reader.read().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_async_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("async_round_trip");
    let codec = Codec::new(Options::default());
    let ty = TypeDescriptor::list(TypeDescriptor::primitive(PrimitiveKind::I64));

    for size in [100, 10000] {
        let value = Value::List((0..size as i64).map(Value::I64).collect());
        let config = StreamConfig::new().with_chunk_size(4096);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, value| {
            b.to_async(&rt).iter(|| {
                let codec = codec.clone();
                let ty = ty.clone();
                let value = value.clone();
                async move {
                    let (client, server) = tokio::io::duplex(64 * 1024);
                    let writer_codec = codec.clone();
                    let writer_ty = ty.clone();
                    let writer = tokio::spawn(async move {
                        let mut writer = AsyncValueWriter::new(client, writer_codec, writer_ty, &config);
                        writer.write(&value).await.unwrap();
                        writer.shutdown().await.unwrap();
                    });
                    let mut reader = AsyncValueReader::new(server, codec, ty, &config);
                    let decoded = reader.read().await.unwrap();
                    writer.await.unwrap();
                    black_box(decoded)
                }
            });
        });
    }

    group.finish();
}

fn bench_channel(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("channel");
    let codec = Codec::new(Options::default());
    let ty = TypeDescriptor::list(TypeDescriptor::string());

    for chunk in [256, 8192] {
        let value = create_batch(1000);
        let config = StreamConfig::new().with_chunk_size(chunk);

        group.bench_with_input(BenchmarkId::from_parameter(chunk), &value, |b, value| {
            b.to_async(&rt).iter(|| {
                let codec = codec.clone();
                let ty = ty.clone();
                let value = value.clone();
                async move {
                    let (tx, mut rx) = mpsc::channel::<Bytes>(16);
                    let sender_codec = codec.clone();
                    let sender_ty = ty.clone();
                    let sender = tokio::spawn(async move {
                        send_value(&sender_codec, &value, &sender_ty, &tx, &config)
                            .await
                            .unwrap()
                    });
                    let received = recv_value(&codec, &ty, &mut rx, &config).await.unwrap();
                    sender.await.unwrap();
                    black_box(received)
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_blocking_read, bench_async_round_trip, bench_channel);

criterion_main!(benches);
