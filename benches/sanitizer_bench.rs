use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use probe_util::{convert_to_plain_text, escape, HtmlSanitizer, SanitizerConfig};
use std::time::Duration;

fn document(paragraphs: usize) -> String {
    let mut doc = String::new();
    for i in 0..paragraphs {
        doc.push_str(&format!(
            "<p>Paragraph {i} with <b>bold</b>, <i>italic</i> and a \
             <a href=\"https://example.com/{i}\" onclick=\"steal()\">link</a>.\n\
             Two  spaces &amp; an entity. <script>alert({i})</script>\
             <!-- note {i} --></p>\n"
        ));
    }
    doc
}

fn sanitizer() -> HtmlSanitizer {
    HtmlSanitizer::new(SanitizerConfig::from_lists("p,b,i,a", "href").unwrap())
}

fn bench_passes(c: &mut Criterion) {
    let doc = document(200);
    let s = sanitizer();
    let mut group = c.benchmark_group("sanitizer");
    group.throughput(Throughput::Bytes(doc.len() as u64));
    group.bench_function("escape", |b| b.iter(|| black_box(escape(&doc, true))));
    group.bench_function("escape_unsafe", |b| {
        b.iter(|| black_box(s.escape_unsafe(&doc)))
    });
    group.bench_function("filter_unsafe_html", |b| {
        b.iter(|| black_box(s.filter_unsafe_html(&doc)))
    });
    group.bench_function("convert_to_plain_text", |b| {
        b.iter(|| black_box(convert_to_plain_text(&doc)))
    });
    group.finish();
}

fn bench_clean_text(c: &mut Criterion) {
    let text = "plain words without any markup at all ".repeat(500);
    let s = sanitizer();
    c.bench_function("escape_unsafe_clean_text", |b| {
        b.iter(|| black_box(s.escape_unsafe(&text)))
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_sanitizer;
    config = bench_config();
    targets = bench_passes, bench_clean_text
}
criterion_main!(benches_sanitizer);
