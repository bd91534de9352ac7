//! Criterion benchmarks for the ComfoConnect frame codec.
//!
//! Sensor notifications dominate gateway traffic, so they get the most
//! attention here, alongside stream reassembly through `FrameDecoder`.
//!
//! Run with:
//! ```bash
//! cargo bench --package comfoq-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use comfoq_core::protocol::codec::{decode_message, encode_message};
use comfoq_core::protocol::messages::{
    Body, CnRmiRequest, CnRpdoNotification, CnRpdoRequest, Message, Operation, RegisterAppRequest,
};
use comfoq_core::protocol::FrameDecoder;
use comfoq_core::Command;
use uuid::Uuid;

// ── Message fixtures ──────────────────────────────────────────────────────────

fn make_keepalive() -> Message {
    Message {
        src: Uuid::from_u128(1),
        dst: Uuid::from_u128(2),
        operation: Operation::unreferenced(),
        body: Body::KeepAlive,
    }
}

fn make_notification() -> Message {
    Message {
        src: Uuid::from_u128(2),
        dst: Uuid::from_u128(1),
        operation: Operation::unreferenced(),
        body: Body::CnRpdoNotification(CnRpdoNotification {
            pdid: 121,
            data: vec![0xe8, 0x03],
            zone: Some(1),
        }),
    }
}

fn make_subscribe() -> Message {
    Message::request(
        Uuid::from_u128(1),
        Uuid::from_u128(2),
        17,
        Body::CnRpdoRequest(CnRpdoRequest {
            pdid: 276,
            zone: Some(1),
            r#type: Some(6),
            timeout: None,
        }),
    )
}

fn make_register() -> Message {
    Message::request(
        Uuid::from_u128(1),
        Uuid::from_u128(2),
        1,
        Body::RegisterAppRequest(RegisterAppRequest {
            uuid: Uuid::from_u128(1).as_bytes().to_vec(),
            pin: 1234,
            devicename: "comfoq-bench".to_string(),
        }),
    )
}

fn make_command() -> Message {
    Message::request(
        Uuid::from_u128(1),
        Uuid::from_u128(2),
        9,
        Body::CnRmiRequest(CnRmiRequest {
            node_id: 1,
            message: Command::FanBoost30m.payload().to_vec(),
        }),
    )
}

fn fixtures() -> Vec<(&'static str, Message)> {
    vec![
        ("KeepAlive", make_keepalive()),
        ("CnRpdoNotification", make_notification()),
        ("CnRpdoRequest", make_subscribe()),
        ("RegisterAppRequest", make_register()),
        ("CnRmiRequest", make_command()),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for (name, msg) in fixtures() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &msg, |b, m| {
            b.iter(|| encode_message(black_box(m)).unwrap())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for (name, msg) in fixtures() {
        let bytes = encode_message(&msg).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, raw| {
            b.iter(|| decode_message(black_box(raw)).unwrap())
        });
    }
    group.finish();
}

/// 100 notifications delivered in 64-byte reads.
fn bench_stream_reassembly(c: &mut Criterion) {
    let frame = encode_message(&make_notification()).unwrap();
    let stream: Vec<u8> = frame.iter().copied().cycle().take(frame.len() * 100).collect();

    c.bench_function("frame_decoder_100_notifications", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut count = 0;
            for chunk in stream.chunks(64) {
                decoder.push(black_box(chunk));
                while let Ok(Some(_)) = decoder.next_message() {
                    count += 1;
                }
            }
            assert_eq!(count, 100);
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_stream_reassembly);
criterion_main!(benches);
