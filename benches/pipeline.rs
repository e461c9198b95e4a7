use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mermaid_scene_preview::config::{ConvertOptions, LayoutConfig};
use mermaid_scene_preview::element::normalize;
use mermaid_scene_preview::layout::compute_layout;
use mermaid_scene_preview::parser::parse_mermaid;
use mermaid_scene_preview::scene::to_scene;
use mermaid_scene_preview::theme::Theme;
use std::hint::black_box;

fn dense_flowchart_source(nodes: usize, extra_edges: usize) -> String {
    let mut out = String::from("flowchart LR\n");
    for i in 0..nodes {
        out.push_str(&format!("  N{i}[Node {i}]\n"));
    }
    for i in 0..nodes.saturating_sub(1) {
        out.push_str(&format!("  N{} --> N{}\n", i, i + 1));
    }
    let mut count = 0usize;
    'outer: for i in 0..nodes {
        for j in (i + 2)..nodes {
            if count >= extra_edges {
                break 'outer;
            }
            out.push_str(&format!("  N{i} -.-> N{j}\n"));
            count += 1;
        }
    }
    out
}

fn clustered_source(clusters: usize, per_cluster: usize) -> String {
    let mut out = String::from("flowchart TD\n");
    for c in 0..clusters {
        out.push_str(&format!("  subgraph S{c}[Stage {c}]\n"));
        for n in 0..per_cluster {
            out.push_str(&format!("    C{c}_{n}(Step {n}) --> C{c}_{}\n", n + 1));
        }
        out.push_str("  end\n");
        if c > 0 {
            out.push_str(&format!("  C{}_{per_cluster} -->|next| C{c}_0\n", c - 1));
        }
    }
    out
}

fn inputs() -> Vec<(String, String)> {
    let mut inputs = vec![(
        "default".to_string(),
        mermaid_scene_preview::DEFAULT_DIAGRAM.to_string(),
    )];
    for (nodes, extra) in [(20usize, 20usize), (60, 120), (120, 300)] {
        inputs.push((format!("dense_{nodes}_{extra}"), dense_flowchart_source(nodes, extra)));
    }
    inputs.push(("clusters_6x8".to_string(), clustered_source(6, 8)));
    inputs
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let options = ConvertOptions::default();
    for (name, input) in inputs() {
        group.bench_with_input(BenchmarkId::from_parameter(&name), &input, |b, data| {
            b.iter(|| {
                let parsed = parse_mermaid(black_box(data), &options).expect("parse failed");
                black_box(parsed.graph.nodes.len());
            });
        });
    }
    group.finish();
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    let theme = Theme::sketch();
    let config = LayoutConfig::default();
    let options = ConvertOptions::default();
    for (name, input) in inputs() {
        let parsed = parse_mermaid(&input, &options).expect("parse failed");
        group.bench_with_input(BenchmarkId::from_parameter(&name), &parsed.graph, |b, graph| {
            b.iter(|| {
                let layout = compute_layout(black_box(graph), &theme, &config);
                black_box(layout.nodes.len());
            });
        });
    }
    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_to_elements");
    let theme = Theme::sketch();
    let config = LayoutConfig::default();
    let options = ConvertOptions::default();
    for (name, input) in inputs() {
        group.bench_with_input(BenchmarkId::from_parameter(&name), &input, |b, data| {
            b.iter(|| {
                let parsed = parse_mermaid(black_box(data), &options).expect("parse failed");
                let scene = to_scene(&parsed.graph, &theme, &config);
                let elements = normalize(scene.elements);
                black_box(elements.len());
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_parse, bench_layout, bench_end_to_end
);
criterion_main!(benches);
