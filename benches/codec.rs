//! Codec benchmark suite.
//!
//! Benchmarks frame encoding and decoding at different payload sizes:
//! - Binding counts: 0, 16, 256
//! - Result rows per frame: 1, 64, 1024
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;

use gremlin_socket::protocol::{Bindings, ResultData};
use gremlin_socket::{Codec, Request, RequestId, Response, StatusCode, Value};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BINDING_COUNTS: &[usize] = &[0, 16, 256];
const ROW_COUNTS: &[usize] = &[1, 64, 1024];

// ============================================================================
// Fixtures
// ============================================================================

fn request_with_bindings(count: usize) -> Request {
    let bindings: Bindings = (0..count)
        .map(|i| (format!("p{i}"), Value::from(format!("value-{i}"))))
        .collect();
    Request::eval("g.V().has('name', within(p0)).valueMap(true)").with_bindings(bindings)
}

/// A mime-prefixed 206 frame carrying `rows` vertices.
fn response_frame(codec: &Codec, rows: usize) -> Vec<u8> {
    let data: Vec<_> = (0..rows)
        .map(|i| json!({"id": i, "label": "person", "name": [format!("name-{i}")]}))
        .collect();
    let data = ResultData::from_json(&data).expect("result data");
    let response = Response::new(RequestId::generate(), StatusCode::PARTIAL_CONTENT, data);
    let body = serde_json::to_vec(&response).expect("serialize");

    let mime = codec.mime_type().as_bytes();
    let mut frame = Vec::with_capacity(1 + mime.len() + body.len());
    frame.push(mime.len() as u8);
    frame.extend_from_slice(mime);
    frame.extend_from_slice(&body);
    frame
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode_request(c: &mut Criterion) {
    let codec = Codec::default();
    let mut group = c.benchmark_group("encode_request");

    for &count in BINDING_COUNTS {
        let request = request_with_bindings(count);
        group.bench_with_input(BenchmarkId::new("bindings", count), &request, |b, request| {
            b.iter(|| codec.encode_request(black_box(request)).expect("encode"));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode_response(c: &mut Criterion) {
    let codec = Codec::default();
    let mut group = c.benchmark_group("decode_response");

    for &rows in ROW_COUNTS {
        let frame = response_frame(&codec, rows);
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("rows", rows), &frame, |b, frame| {
            b.iter(|| codec.decode_response(black_box(frame)).expect("decode"));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode_request, bench_decode_response);
criterion_main!(benches);
