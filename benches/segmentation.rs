//! Benchmarks for chapter segmentation and the conversion pipeline.
//!
//! Run with: cargo bench

use std::hint::black_box;
use std::io::Cursor;

use criterion::{Criterion, criterion_group, criterion_main};

use txtbook::convert::{ConvertConfig, TxtConverter};
use txtbook::extract::{ExtractConfig, extract_text};
use txtbook::segment::{DEFAULT_PATTERN, Segmenter, extract_titles};
use txtbook::text::decode;

const NUMERALS: [&str; 10] = ["一", "二", "三", "四", "五", "六", "七", "八", "九", "十"];

/// A synthetic novel: a preface and 500 chapters of 40 lines each.
fn sample_novel() -> String {
    let mut text = String::from("书名：测试\n作者：佚名\n\n");
    for chapter in 0..500 {
        let title = format!(
            "第{}{}章 标题{chapter}",
            NUMERALS[chapter / 100 % 10],
            NUMERALS[chapter % 10]
        );
        text.push_str(&title);
        text.push('\n');
        for line in 0..40 {
            text.push_str("\u{3000}\u{3000}这是正文的第");
            text.push_str(&line.to_string());
            text.push_str("行，用来填充章节内容。\n");
        }
        text.push('\n');
    }
    text
}

// ============================================================================
// Segmentation
// ============================================================================

fn bench_extract_titles(c: &mut Criterion) {
    let text = sample_novel();
    c.bench_function("extract_titles", |b| {
        b.iter(|| extract_titles(black_box(&text), DEFAULT_PATTERN).unwrap());
    });
}

fn bench_segment_precompiled(c: &mut Criterion) {
    let text = sample_novel();
    let segmenter = Segmenter::default();
    c.bench_function("segment_precompiled", |b| {
        b.iter(|| segmenter.chapters(black_box(&text)));
    });
}

// ============================================================================
// Decoding
// ============================================================================

fn bench_decode_gb18030(c: &mut Criterion) {
    let text = sample_novel();
    let (bytes, _, _) = encoding_rs::GB18030.encode(&text);
    c.bench_function("decode_gb18030", |b| {
        b.iter(|| decode(black_box(&bytes), "gb18030").unwrap());
    });
}

// ============================================================================
// Pipeline
// ============================================================================

fn bench_build_and_write_epub(c: &mut Criterion) {
    let text = sample_novel();
    let converter = TxtConverter::new(
        ConvertConfig::default()
            .with_title("测试")
            .with_identifier("urn:bench")
            .with_date("2024-01-01T00:00:00Z")
            .with_step(10),
    )
    .unwrap();

    c.bench_function("build_and_write_epub", |b| {
        b.iter(|| {
            let book = converter.build_book(black_box(&text)).unwrap();
            let mut output = Vec::new();
            txtbook::epub::write_epub_to_writer(&book, Cursor::new(&mut output)).unwrap();
            output
        });
    });
}

fn bench_extract_text(c: &mut Criterion) {
    let text = sample_novel();
    let book = TxtConverter::new(ConvertConfig::default())
        .unwrap()
        .build_book(&text)
        .unwrap();
    let config = ExtractConfig::default();

    c.bench_function("extract_text", |b| {
        b.iter(|| extract_text(black_box(&book), &config).unwrap());
    });
}

criterion_group!(
    benches,
    // Segmentation
    bench_extract_titles,
    bench_segment_precompiled,
    // Decoding
    bench_decode_gb18030,
    // Pipeline
    bench_build_and_write_epub,
    bench_extract_text,
);
criterion_main!(benches);
