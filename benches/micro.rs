//! benches/micro.rs
//!
//! Micro-benchmarks for the protocol layer: incrementally framing a
//! multibulk command and encoding a reply, the two hot loops every command
//! passes through regardless of which command it is (§4.1, §6).

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion};
use redis_rust::protocol::serializer::Reply;
use redis_rust::CommandReader;

fn bench_reader(c: &mut Criterion) {
    let wire = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n".to_vec();
    c.bench_function("reader_frame_set", |b| {
        b.iter(|| {
            let mut reader = CommandReader::new();
            reader.feed(&wire);
            let cmd = reader.next_command().unwrap().unwrap();
            criterion::black_box(cmd.argv.len());
        });
    });
}

fn bench_reply_encode(c: &mut Criterion) {
    let items: Vec<Bytes> = (0..64).map(|i| Bytes::from(i.to_string())).collect();
    c.bench_function("reply_bulk_array_64", |b| {
        b.iter(|| criterion::black_box(Reply::bulk_array(items.iter())));
    });
}

criterion_group!(benches, bench_reader, bench_reply_encode);
criterion_main!(benches);
