use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ema::core::annotations::{scan_all, AnnotationScanner, SideChannel};
use std::hint::black_box;
use unicode_segmentation::UnicodeSegmentation;

fn make_reply(paragraphs: usize) -> String {
    let base = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor";
    let tags = [
        "[Expression: smile] [Action: wave]",
        "[Expression: confused] [Action: none]",
        "[Expression: serious] [Action: nod]",
    ];
    let mut reply = String::new();
    for i in 0..paragraphs {
        reply.push_str(tags[i % tags.len()]);
        reply.push_str("\n\n");
        reply.push_str(base);
        reply.push_str("\n\n");
    }
    reply
}

/// Prefix end offsets, one per grapheme, as the renderer reveals them.
fn prefix_ends(text: &str) -> Vec<usize> {
    text.grapheme_indices(true)
        .map(|(start, grapheme)| start + grapheme.len())
        .collect()
}

fn incremental(text: &str, ends: &[usize]) -> SideChannel {
    let mut scanner = AnnotationScanner::new();
    let mut side = SideChannel::default();
    for &end in ends {
        for annotation in scanner.scan(&text[..end]) {
            side.apply(annotation);
        }
    }
    side
}

fn full_rescan(text: &str, ends: &[usize]) -> SideChannel {
    let mut side = SideChannel::default();
    for &end in ends {
        side = SideChannel::default();
        scan_all(&text[..end], &mut side);
    }
    side
}

fn bench_annotation_scan(c: &mut Criterion) {
    for &paragraphs in &[4usize, 16usize] {
        let reply = make_reply(paragraphs);
        let ends = prefix_ends(&reply);

        let mut group = c.benchmark_group(format!("annotation_scan_paragraphs{paragraphs}"));
        group.throughput(Throughput::Elements(ends.len() as u64));
        group.bench_with_input(BenchmarkId::new("incremental", ends.len()), &ends, |b, ends| {
            b.iter(|| black_box(incremental(black_box(&reply), ends)))
        });
        group.bench_with_input(BenchmarkId::new("full_rescan", ends.len()), &ends, |b, ends| {
            b.iter(|| black_box(full_rescan(black_box(&reply), ends)))
        });
        group.finish();
    }
}

criterion_group!(benches, bench_annotation_scan);
criterion_main!(benches);
