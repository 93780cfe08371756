// ABOUTME: End-to-end checks of the path, cascade and cluster queries on small
// ABOUTME: hand-built graphs whose answers are known in advance.

use riskgraph_core::{ClusteringConfig, ClusteringStrategy, NodeType, Properties, RelationshipType};
use riskgraph_graph::{
    CascadeAnalyzer, CascadeReport, ClusterAnalyzer, EntityGraph, PathAnalyzer, SearchLimits,
};
use serde_json::json;

fn node_with_risk(graph: &mut EntityGraph, id: &str, risk: f64) {
    let mut props = Properties::new();
    props.insert("risk_score".to_string(), json!(risk));
    graph.upsert_node(id, NodeType::Company, props);
}

fn edge(graph: &mut EntityGraph, source: &str, target: &str) {
    graph.upsert_edge(source, target, RelationshipType::DependsOn, None, None);
}

#[test]
fn direct_path_precedes_two_hop_path() {
    let mut g = EntityGraph::new();
    edge(&mut g, "A", "B");
    edge(&mut g, "B", "C");
    edge(&mut g, "A", "C");

    let search = PathAnalyzer::new(&g, SearchLimits::default())
        .find_paths("A", "C", 2, 10)
        .unwrap();
    let paths: Vec<Vec<&str>> = search
        .paths
        .iter()
        .map(|p| p.nodes.iter().map(String::as_str).collect())
        .collect();
    assert_eq!(paths, vec![vec!["A", "C"], vec!["A", "B", "C"]]);
}

#[test]
fn cascade_depths_on_a_chain() {
    let mut g = EntityGraph::new();
    edge(&mut g, "A", "B");
    edge(&mut g, "B", "C");
    edge(&mut g, "C", "D");

    let report = CascadeAnalyzer::new(&g, SearchLimits::default())
        .analyze_cascade("A", 2)
        .unwrap();
    let CascadeReport::Found(analysis) = report else {
        panic!("source should exist");
    };
    assert_eq!(analysis.depth_breakdown[&1].nodes, vec!["B"]);
    assert_eq!(analysis.depth_breakdown[&2].nodes, vec!["C"]);
    let bucketed: Vec<&String> = analysis
        .depth_breakdown
        .values()
        .flat_map(|b| b.nodes.iter())
        .collect();
    assert!(!bucketed.iter().any(|id| id.as_str() == "D"));
}

#[test]
fn triangle_cluster_risk_and_density() {
    let mut g = EntityGraph::new();
    node_with_risk(&mut g, "x", 0.9);
    node_with_risk(&mut g, "y", 0.8);
    node_with_risk(&mut g, "z", 0.7);
    edge(&mut g, "x", "y");
    edge(&mut g, "y", "z");
    edge(&mut g, "z", "x");

    let report = ClusterAnalyzer::new(&g, ClusteringConfig::default())
        .detect_clusters(ClusteringStrategy::Modularity, 3)
        .unwrap();
    let cluster = &report.clusters[0];
    assert!((cluster.risk_score - 0.8).abs() < 1e-9);
    assert!((cluster.density - 1.0).abs() < 1e-12);
}

#[test]
fn hotspots_exclude_low_risk_clusters() {
    let mut g = EntityGraph::new();
    for (ids, risk) in [(["h1", "h2", "h3"], 0.75), (["c1", "c2", "c3"], 0.65)] {
        for id in ids {
            node_with_risk(&mut g, id, risk);
        }
        edge(&mut g, ids[0], ids[1]);
        edge(&mut g, ids[1], ids[2]);
        edge(&mut g, ids[2], ids[0]);
    }

    let hotspots = ClusterAnalyzer::new(&g, ClusteringConfig::default())
        .find_hotspots(0.7, 3)
        .unwrap();
    assert!(hotspots.hotspots.iter().all(|h| h.risk_score >= 0.7));
    assert_eq!(hotspots.hotspot_count, 1);
    assert!((hotspots.average_hotspot_risk - 0.75).abs() < 1e-9);
}

#[test]
fn empty_graph_answers() {
    let g = EntityGraph::new();

    let paths = PathAnalyzer::new(&g, SearchLimits::default())
        .find_paths("A", "B", 3, 10)
        .unwrap();
    assert!(paths.paths.is_empty());

    let cascade = CascadeAnalyzer::new(&g, SearchLimits::default())
        .analyze_cascade("A", 3)
        .unwrap();
    assert!(!cascade.is_found());

    for strategy in [
        ClusteringStrategy::Modularity,
        ClusteringStrategy::KClique,
        ClusteringStrategy::ConnectedComponents,
    ] {
        let report = ClusterAnalyzer::new(&g, ClusteringConfig::default())
            .detect_clusters(strategy, 1)
            .unwrap();
        assert!(report.clusters.is_empty());
    }
}

#[test]
fn statistics_track_mutations() {
    let mut g = EntityGraph::new();
    edge(&mut g, "a", "b");
    edge(&mut g, "b", "c");
    edge(&mut g, "a", "b");
    g.upsert_node("d", NodeType::Region, Properties::new());
    assert_eq!(g.statistics().node_count, 4);
    assert_eq!(g.statistics().edge_count, 2);

    g.remove_edge("a", "b");
    g.remove_node("d");
    let stats = g.statistics();
    assert_eq!(stats.node_count, g.nodes().count());
    assert_eq!(stats.edge_count, g.edges().count());
    assert_eq!(stats.edge_count, 1);
}
