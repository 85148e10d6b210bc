use std::hint::black_box;
use std::io;

use criterion::{criterion_group, criterion_main, Criterion};
use nano_http::codec::{Preamble, DEFAULT_PREAMBLE_LIMIT};
use nano_http::protocol::{Request, Response};

const SIMPLE_GET: &[u8] =
    b"GET /hello/world?x=1&x=2 HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n";

fn bench_preamble_scan(c: &mut Criterion) {
    c.bench_function("scan_simple_preamble", |b| {
        b.iter(|| {
            let preamble = Preamble::read_from(&mut &SIMPLE_GET[..], DEFAULT_PREAMBLE_LIMIT)
                .expect("valid preamble");
            black_box(preamble.body_offset());
        });
    });
}

fn bench_request_decode(c: &mut Criterion) {
    c.bench_function("decode_simple_request", |b| {
        b.iter(|| {
            let preamble = Preamble::read_from(&mut &SIMPLE_GET[..], DEFAULT_PREAMBLE_LIMIT)
                .expect("valid preamble");
            let request = Request::materialize(preamble, io::empty()).expect("valid request");
            black_box((request.path().len(), request.param("x").is_some()));
        });
    });
}

fn bench_response_commit(c: &mut Criterion) {
    c.bench_function("commit_simple_response", |b| {
        b.iter(|| {
            let mut response = Response::new(Vec::with_capacity(128));
            response.add_header("Content-Type", "text/plain").expect("clean response");
            response.write(b"Hello World!").expect("write to a vec");
            black_box(response.get_ref().len());
        });
    });
}

criterion_group!(benches, bench_preamble_scan, bench_request_decode, bench_response_commit);
criterion_main!(benches);
