use criterion::{Criterion, black_box, criterion_group, criterion_main};
use lspop::json::object;
use lspop::{CompletionCandidate, MessageFramer, compute_visible_page, encode_message};

fn log_stream(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..count {
        out.extend(encode_message(&object! {
            "jsonrpc" => "2.0",
            "method" => "window/logMessage",
            "params" => object! { "type" => 4u32, "message" => format!("indexing crate {i}") },
        }));
    }
    out
}

fn bench_framer_chunked(c: &mut Criterion) {
    let stream = log_stream(1_000);
    c.bench_function("framer/1k_messages_4k_chunks", |b| {
        b.iter(|| {
            let mut framer = MessageFramer::new();
            let mut count = 0;
            for chunk in stream.chunks(4096) {
                count += framer.feed(black_box(chunk)).len();
            }
            black_box(count)
        })
    });
}

fn bench_visible_page(c: &mut Criterion) {
    let all = (0..5_000)
        .map(|i| CompletionCandidate::new(format!("symbol_{i:05}")))
        .collect::<Vec<_>>();
    c.bench_function("completion/page_5k_candidates", |b| {
        b.iter(|| black_box(compute_visible_page(&all, black_box("sym"), 2_500, 0, 10)))
    });
}

criterion_group!(benches, bench_framer_chunked, bench_visible_page);
criterion_main!(benches);
