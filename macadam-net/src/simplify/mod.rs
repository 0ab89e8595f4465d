// Network simplification pipeline
//
// The raw graph built from an extract is noisy: complex intersections arrive
// as clusters of nearby nodes, two-way streets as single directed edges, and
// long streets as chains of short edges split at every shared vertex. The
// passes here run in a fixed order, each one feeding the next:
//
// 1. junction merge     - collapse node clusters into centroid nodes
// 2. reflect            - add the reverse edge where only one direction exists
// 3. interstitial       - merge edge chains through pass-through nodes
// 4. unbundle           - chain merged geometry parts back into single lines
// 5. renumber           - reassign dense node ids after removals
// 6. dedupe             - drop near-identical parallel edges
//
// Node positions move in pass 1, so edge geometry is re-anchored and lengths
// are remeasured there; later passes only combine or drop what pass 1 left.

pub mod dedupe;
pub mod interstitial;
pub mod junctions;
pub mod reflect;
pub mod unbundle;

use std::fmt;

use macadam_common::Result;

use crate::graph::RoadGraph;

/// Tuning knobs for [`clean_network`].
#[derive(Debug, Clone, Copy)]
pub struct CleanConfig {
    /// Projected CRS used for clustering distances, chosen for the AOI.
    pub measure_epsg: u32,
    /// CRS of the stored geometry.
    pub geom_epsg: u32,
    /// Nodes closer than this (meters, in the measure CRS) merge into one.
    pub junction_dist_m: f64,
    /// Parallel edges within this length ratio of the shortest are duplicates.
    pub max_ratio: f64,
}

impl CleanConfig {
    pub fn new(measure_epsg: u32) -> Self {
        CleanConfig {
            measure_epsg,
            geom_epsg: 4326,
            junction_dist_m: 50.0,
            max_ratio: 1.5,
        }
    }
}

/// Node and edge counts around one pass.
#[derive(Debug, Clone, Copy)]
pub struct PassReport {
    pub pass: &'static str,
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub edges_before: usize,
    pub edges_after: usize,
}

/// Per-pass counts for a full [`clean_network`] run.
#[derive(Debug, Default)]
pub struct CleanReport {
    pub passes: Vec<PassReport>,
}

impl CleanReport {
    fn record(&mut self, pass: &'static str, before: (usize, usize), g: &RoadGraph) {
        self.passes.push(PassReport {
            pass,
            nodes_before: before.0,
            nodes_after: g.node_count(),
            edges_before: before.1,
            edges_after: g.edge_count(),
        });
    }

    /// Final node count, if any pass ran.
    pub fn final_nodes(&self) -> Option<usize> {
        self.passes.last().map(|p| p.nodes_after)
    }

    /// Final edge count, if any pass ran.
    pub fn final_edges(&self) -> Option<usize> {
        self.passes.last().map(|p| p.edges_after)
    }
}

impl fmt::Display for CleanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.passes {
            writeln!(
                f,
                "{:>14}: nodes {} to {}, edges {} to {}",
                p.pass, p.nodes_before, p.nodes_after, p.edges_before, p.edges_after
            )?;
        }
        Ok(())
    }
}

/// Run the full simplification sequence over a raw graph.
///
/// Consumes the graph and returns the cleaned one together with per-pass
/// counts. The pass order is fixed; see the module comment.
pub fn clean_network(mut graph: RoadGraph, cfg: &CleanConfig) -> Result<(RoadGraph, CleanReport)> {
    let mut report = CleanReport::default();

    println!("[1/6] Merging junction clusters (within {} m)...", cfg.junction_dist_m);
    let before = (graph.node_count(), graph.edge_count());
    let jstats = junctions::merge_junctions(&mut graph, cfg)?;
    report.record("junction merge", before, &graph);
    println!(
        "  {} clusters merged {} nodes, {} intra-cluster edges dropped",
        jstats.clusters, jstats.nodes_merged, jstats.edges_dropped
    );

    println!("[2/6] Reflecting one-way edges...");
    let before = (graph.node_count(), graph.edge_count());
    let added = reflect::add_missing_reflected_edges(&mut graph);
    report.record("reflect", before, &graph);
    println!("  {} reverse edges added, edges {} to {}", added, before.1, graph.edge_count());

    println!("[3/6] Collapsing interstitial nodes...");
    let before = (graph.node_count(), graph.edge_count());
    let istats = interstitial::collapse_interstitial(&mut graph);
    report.record("interstitial", before, &graph);
    println!(
        "  {} chains merged, {} pass-through nodes removed",
        istats.chains_merged, istats.nodes_removed
    );

    println!("[4/6] Unbundling merged geometry...");
    let before = (graph.node_count(), graph.edge_count());
    let ustats = unbundle::unbundle_geometry(&mut graph);
    report.record("unbundle", before, &graph);
    println!(
        "  {} geometries chained into single lines, {} left multi-part",
        ustats.flattened, ustats.left_multi
    );

    println!("[5/6] Renumbering nodes...");
    let before = (graph.node_count(), graph.edge_count());
    graph.renumber();
    report.record("renumber", before, &graph);

    println!("[6/6] Removing duplicate parallel edges (ratio {})...", cfg.max_ratio);
    let before = (graph.node_count(), graph.edge_count());
    let removed = dedupe::remove_duplicate_edges(&mut graph, cfg.max_ratio);
    report.record("dedupe", before, &graph);
    println!("  {} duplicate edges removed", removed);

    Ok((graph, report))
}
