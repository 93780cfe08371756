use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use riskgraph_core::{
    ClusteringConfig, ClusteringStrategy, NodeType, Properties, RelationshipType, RiskGraphConfig,
    UpdaterConfig,
};
use riskgraph_graph::{
    compute_centrality, CascadeAnalyzer, CentralityInput, ClusterAnalyzer, EntityGraph,
    GraphService, PathAnalyzer, SearchLimits,
};
use serde_json::json;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Generate a random exposure graph with `node_count` entities and roughly
/// `node_count * edge_density` directed edges.
fn create_exposure_graph(node_count: usize, edge_density: f64) -> EntityGraph {
    fastrand::seed(7);
    let mut graph = EntityGraph::new();

    for i in 0..node_count {
        let mut props = Properties::new();
        props.insert("risk_score".to_string(), json!(fastrand::f64()));
        let node_type = if i % 5 == 0 {
            NodeType::Bank
        } else {
            NodeType::Company
        };
        graph.upsert_node(&format!("entity_{}", i), node_type, props);
    }

    let edge_count = (node_count as f64 * edge_density) as usize;
    for _ in 0..edge_count {
        let from = fastrand::usize(..node_count);
        let to = fastrand::usize(..node_count);
        if from != to {
            graph.upsert_edge(
                &format!("entity_{}", from),
                &format!("entity_{}", to),
                RelationshipType::Credits,
                Some(fastrand::f64()),
                None,
            );
        }
    }

    graph
}

fn bench_find_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_paths");
    group.measurement_time(Duration::from_secs(5));

    for size in [100, 500, 1000].iter() {
        let graph = create_exposure_graph(*size, 3.0);
        group.bench_with_input(BenchmarkId::new("depth_4", size), size, |b, &size| {
            b.iter(|| {
                let result = PathAnalyzer::new(&graph, SearchLimits::default())
                    .find_paths("entity_0", &format!("entity_{}", size - 1), 4, 10)
                    .unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

fn bench_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade");
    group.measurement_time(Duration::from_secs(8));

    for size in [100, 500, 1000].iter() {
        let graph = create_exposure_graph(*size, 2.0);
        group.bench_with_input(BenchmarkId::new("max_depth_3", size), size, |b, _| {
            b.iter(|| {
                let result = CascadeAnalyzer::new(&graph, SearchLimits::default())
                    .analyze_cascade("entity_0", 3)
                    .unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

fn bench_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("clustering");
    group.measurement_time(Duration::from_secs(8));

    for size in [100, 500].iter() {
        let graph = create_exposure_graph(*size, 2.5);
        for strategy in [
            ClusteringStrategy::Modularity,
            ClusteringStrategy::KClique,
            ClusteringStrategy::ConnectedComponents,
        ] {
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), size),
                size,
                |b, _| {
                    b.iter(|| {
                        let result = ClusterAnalyzer::new(&graph, ClusteringConfig::default())
                            .detect_clusters(strategy, 3)
                            .unwrap();
                        black_box(result);
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_centrality(c: &mut Criterion) {
    let mut group = c.benchmark_group("centrality");
    group.sample_size(20);

    let config = UpdaterConfig::default();
    for size in [100, 500, 2000].iter() {
        let input = CentralityInput::from_graph(&create_exposure_graph(*size, 2.0));
        group.bench_with_input(BenchmarkId::new("compute", size), size, |b, _| {
            b.iter(|| black_box(compute_centrality(&input, &config)));
        });
    }

    group.finish();
}

// Service path: blocking-pool dispatch plus the read lock
fn bench_service_queries(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("service_queries");
    group.significance_level(0.1).sample_size(20);

    let service =
        GraphService::with_graph(create_exposure_graph(1000, 2.0), RiskGraphConfig::default());
    group.bench_function("shortest_path_1000_nodes", |b| {
        b.to_async(&rt).iter(|| async {
            let result = service.shortest_path("entity_0", "entity_999").await.unwrap();
            black_box(result);
        });
    });
    group.bench_function("cascade_1000_nodes", |b| {
        b.to_async(&rt).iter(|| async {
            let result = service.analyze_cascade("entity_0", Some(3)).await.unwrap();
            black_box(result);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_find_paths,
    bench_cascade,
    bench_clustering,
    bench_centrality,
    bench_service_queries
);
criterion_main!(benches);
