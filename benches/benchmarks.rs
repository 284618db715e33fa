use binix_router::message_router::codec::{
    self, Payload, RendererMessage, ResponseBuilder,
};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

const THRESHOLD: usize = 16 * 1024;

fn request(size: usize) -> RendererMessage {
    RendererMessage {
        context_id: 1,
        request_id: 1,
        persistent: false,
        payload: Payload::String("x".repeat(size)),
    }
}

/// Request encode/decode on both sides of the shared memory threshold
fn benchmark_request_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_codec");

    for size in [64, THRESHOLD - 1, THRESHOLD, 256 * 1024] {
        let message = request(size);
        group.bench_with_input(BenchmarkId::new("encode", size), &message, |b, message| {
            b.iter(|| codec::build_renderer_message(THRESHOLD, "cefQueryMsg", black_box(message)))
        });

        let encoded = codec::build_renderer_message(THRESHOLD, "cefQueryMsg", &message);
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| codec::parse_renderer_message(black_box(encoded)))
        });
    }

    group.finish();
}

/// Response building, which happens on the handler's thread
fn benchmark_response_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_builder");

    for size in [64, THRESHOLD, 256 * 1024] {
        let payload = Payload::Binary(vec![7; size]);
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| ResponseBuilder::new(THRESHOLD, "cefQueryMsg", black_box(payload.clone())).build(1, 1))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_request_codec, benchmark_response_builder);
criterion_main!(benches);
