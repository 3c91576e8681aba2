//! Benchmarks for graph compilation and Context merging
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use texbake::graph::nodes::{BakeSetting, MeshConfig, MeshList};
use texbake::graph::{Context, GraphCompiler, NodeGraph, NodeKind, NodeType};

/// `bakes` bakes sharing one pass and settings node, each with its own mesh,
/// combine chain of `chain` nodes and output.
fn wide_graph(bakes: usize, chain: usize) -> NodeGraph {
    let mut graph = NodeGraph::new("bench");
    let kind = NodeKind::default_for;
    graph.add_node("Pass", kind(NodeType::BlenderPass)).unwrap();
    graph
        .add_node(
            "Settings",
            NodeKind::BakeSetting(BakeSetting {
                resolution: [256, 256],
                ..Default::default()
            }),
        )
        .unwrap();

    for i in 0..bakes {
        let mesh = format!("Mesh{i}");
        let bake = format!("Bake{i}");
        graph
            .add_node(
                mesh.as_str(),
                NodeKind::Mesh(MeshList {
                    meshes: vec![MeshConfig {
                        target: format!("Low{i}"),
                        source: format!("High{i}"),
                        ..Default::default()
                    }],
                }),
            )
            .unwrap();
        graph.add_node(bake.as_str(), kind(NodeType::Bake)).unwrap();
        graph.link("Pass", 0, &bake, 0).unwrap();
        graph.link("Settings", 0, &bake, 1).unwrap();
        graph.link(&mesh, 0, &bake, 2).unwrap();

        let mut upstream = bake;
        for c in 0..chain {
            let combine = format!("Combine{i}_{c}");
            graph.add_node(combine.as_str(), kind(NodeType::ImageCombine)).unwrap();
            graph.link(&upstream, 0, &combine, 0).unwrap();
            upstream = combine;
        }
        let out = format!("Out{i}");
        graph.add_node(out.as_str(), kind(NodeType::SaveToImage)).unwrap();
        graph.link(&upstream, 0, &out, 0).unwrap();
    }
    graph
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let compiler = GraphCompiler::new();

    for roots in [1, 16, 128].iter() {
        let graph = wide_graph(*roots, 2);
        group.throughput(Throughput::Elements(graph.len() as u64));
        group.bench_with_input(BenchmarkId::new("roots", roots), &graph, |b, graph| {
            b.iter(|| compiler.compile(black_box(graph)));
        });
    }

    for chain in [8, 64].iter() {
        let graph = wide_graph(1, *chain);
        group.bench_with_input(BenchmarkId::new("chain", chain), &graph, |b, graph| {
            b.iter(|| compiler.compile(black_box(graph)));
        });
    }

    group.finish();
}

fn bench_context_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("context_merge");

    for entries in [10, 100, 1000].iter() {
        let mut incoming = Context::new();
        for i in 0..*entries {
            incoming.ensure_list("OutImages").push(json!([
                format!("Obj{i}"),
                "Internal",
                "COMBINED",
                format!("Obj{i}_Internal_COMBINED")
            ]));
            incoming
                .ensure_path(&["Pass", "Internal"])
                .insert(format!("P{i}"), json!(i));
        }

        group.throughput(Throughput::Elements(*entries as u64));
        group.bench_with_input(BenchmarkId::new("merge", entries), &incoming, |b, incoming| {
            b.iter(|| {
                let mut ctx = Context::new();
                ctx.insert("BakeSettings", json!({ "resolution": [512, 512] }));
                ctx.merge(black_box(incoming.clone()));
                ctx
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_context_merge);
criterion_main!(benches);
