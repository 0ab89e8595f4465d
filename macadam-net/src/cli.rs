//! Command-line interface: one subcommand per pipeline stage.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use macadam_common::classes;

use crate::aoi;
use crate::extract;
use crate::formats::{self, snapshot, SaveOptions};
use crate::graph::{build_graph, RoadGraph, TravelMode};
use crate::od::{calculate_od, write_matrix_csv, CostField};
use crate::salt::salt_long_lines;
use crate::simplify::{clean_network, CleanConfig};
use crate::snap;
use crate::speed;

#[derive(Parser)]
#[command(name = "macadam-net")]
#[command(about = "Road network extraction and simplification from OpenStreetMap data", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a road network from an OSM PBF extract
    Extract {
        /// Input .osm.pbf file
        input: PathBuf,
        /// Name for the saved artifact set
        #[arg(long)]
        name: String,
        /// Output directory
        #[arg(long, default_value = "networks")]
        out: PathBuf,
        /// GeoJSON polygon to clip the network against
        #[arg(long)]
        aoi: Option<PathBuf>,
        /// Comma-separated road classes to keep (defaults to the drivable set)
        #[arg(long)]
        classes: Option<String>,
        /// Keep only the largest strongly-connected component
        #[arg(long)]
        largest_component: bool,
        /// Also write the edges as GeoJSON
        #[arg(long)]
        geojson: bool,
    },
    /// Run the simplification passes over a saved network
    Clean {
        /// Network snapshot (.graph)
        snapshot: PathBuf,
        /// Projected EPSG code for clustering distances (e.g. the UTM zone)
        #[arg(long)]
        measure_epsg: u32,
        /// EPSG code of the stored geometry
        #[arg(long, default_value = "4326")]
        geom_epsg: u32,
        /// Junction cluster distance in meters
        #[arg(long, default_value = "50.0")]
        junction_dist: f64,
        /// Parallel edges within this length ratio of the shortest are duplicates
        #[arg(long, default_value = "1.5")]
        max_ratio: f64,
        /// Keep only the largest strongly-connected component afterwards
        #[arg(long)]
        largest_component: bool,
        /// Name for the cleaned artifact set
        #[arg(long)]
        name: String,
        /// Output directory
        #[arg(long, default_value = "networks")]
        out: PathBuf,
        /// Also write the edges as GeoJSON
        #[arg(long)]
        geojson: bool,
    },
    /// Inspect a saved network
    Info {
        /// Network snapshot (.graph)
        snapshot: PathBuf,
        /// How many sample nodes and edges to print
        #[arg(long, default_value = "5")]
        sample: usize,
    },
    /// Stamp every edge with a travel time
    ToTime {
        /// Network snapshot (.graph)
        snapshot: PathBuf,
        /// Travel mode: drive or walk
        #[arg(long, default_value = "drive")]
        mode: TravelMode,
        /// Length multiplier applied before conversion
        #[arg(long, default_value = "1.0")]
        factor: f64,
        /// Name for the timed artifact set
        #[arg(long)]
        name: String,
        /// Output directory
        #[arg(long, default_value = "networks")]
        out: PathBuf,
        /// Also write the edges as GeoJSON
        #[arg(long)]
        geojson: bool,
    },
    /// Split overlong edges into equal pieces
    Salt {
        /// Network snapshot (.graph)
        snapshot: PathBuf,
        /// Split edges longer than this many meters
        #[arg(long, default_value = "5000.0")]
        thresh: f64,
        /// Name for the salted artifact set
        #[arg(long)]
        name: String,
        /// Output directory
        #[arg(long, default_value = "networks")]
        out: PathBuf,
        /// Also write the edges as GeoJSON
        #[arg(long)]
        geojson: bool,
    },
    /// Snap points to their nearest network node
    Snap {
        /// Network snapshot (.graph)
        snapshot: PathBuf,
        /// CSV of points with x/y (or lon/lat) columns
        points: PathBuf,
        /// Output CSV
        #[arg(long, default_value = "snapped.csv")]
        out: PathBuf,
    },
    /// Shortest-path cost matrix between node sets
    Od {
        /// Network snapshot (.graph)
        snapshot: PathBuf,
        /// Comma-separated origin node ids
        #[arg(long)]
        origins: String,
        /// Comma-separated destination node ids
        #[arg(long)]
        destinations: String,
        /// Cost field: time or length
        #[arg(long, default_value = "length")]
        field: CostField,
        /// Value written for unreachable pairs
        #[arg(long, default_value = "999999999")]
        fail_value: f64,
        /// Output CSV
        #[arg(long, default_value = "od.csv")]
        out: PathBuf,
    },
}

/// Provenance record written next to the extract artifacts.
#[derive(Serialize)]
struct RunManifest {
    created: String,
    tool_version: &'static str,
    input: String,
    input_sha256: String,
    aoi: Option<String>,
    accepted_classes: Vec<String>,
    nodes: usize,
    edges: usize,
    total_length_km: f64,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            input,
            name,
            out,
            aoi,
            classes,
            largest_component,
            geojson,
        } => cmd_extract(input, name, out, aoi, classes, largest_component, geojson),
        Commands::Clean {
            snapshot,
            measure_epsg,
            geom_epsg,
            junction_dist,
            max_ratio,
            largest_component,
            name,
            out,
            geojson,
        } => {
            let cfg = CleanConfig {
                measure_epsg,
                geom_epsg,
                junction_dist_m: junction_dist,
                max_ratio,
            };
            cmd_clean(snapshot, cfg, largest_component, name, out, geojson)
        }
        Commands::Info { snapshot, sample } => cmd_info(snapshot, sample),
        Commands::ToTime {
            snapshot,
            mode,
            factor,
            name,
            out,
            geojson,
        } => cmd_to_time(snapshot, mode, factor, name, out, geojson),
        Commands::Salt {
            snapshot,
            thresh,
            name,
            out,
            geojson,
        } => cmd_salt(snapshot, thresh, name, out, geojson),
        Commands::Snap {
            snapshot,
            points,
            out,
        } => cmd_snap(snapshot, points, out),
        Commands::Od {
            snapshot,
            origins,
            destinations,
            field,
            fail_value,
            out,
        } => cmd_od(snapshot, origins, destinations, field, fail_value, out),
    }
}

fn cmd_extract(
    input: PathBuf,
    name: String,
    out: PathBuf,
    aoi_path: Option<PathBuf>,
    class_list: Option<String>,
    largest_component: bool,
    geojson: bool,
) -> Result<()> {
    let start = Instant::now();

    println!("Reading OSM extract: {}", input.display());
    let (mut table, counts) = extract::read_osm(&input)?;
    println!(
        "  {} nodes, {} highway ways ({} dropped for missing nodes, {} degenerate)",
        counts.nodes, counts.highway_ways, counts.ways_missing_nodes, counts.ways_too_short
    );
    println!("Parsing took {:.2}s", start.elapsed().as_secs_f64());

    let accepted = match &class_list {
        Some(list) => classes::validate(list.split(','))?,
        None => classes::DEFAULT_ACCEPTED
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };
    println!("\nFiltering to {} road classes...", accepted.len());
    let dropped = table.filter_classes(&accepted);
    println!("  {} ways dropped, {} remain", dropped, table.len());
    if table.is_empty() {
        log::warn!("no ways left after the class filter; the output network will be empty");
    }

    println!("\nSplitting ways at shared junctions...");
    let mut table = table.segmentize();
    println!("  {} segments", table.len());

    if let Some(path) = &aoi_path {
        println!("\nClipping to AOI: {}", path.display());
        let polygon = aoi::load_aoi(path)?;
        let (clipped, stats) = aoi::clip_table(&table, &polygon);
        println!(
            "  kept {} whole, split {} into {} pieces, dropped {} outside",
            stats.kept_whole, stats.split, stats.pieces_added, stats.dropped
        );
        table = clipped;
        if table.is_empty() {
            log::warn!("the AOI clip removed every segment; the output network will be empty");
        }
    }

    println!("\nBuilding directed multigraph...");
    let mut graph = build_graph(&table);
    println!("  {} nodes, {} edges", graph.node_count(), graph.edge_count());

    if largest_component {
        let (nodes_removed, edges_removed) = graph.retain_largest_component();
        graph.renumber();
        println!(
            "  largest component kept: {} nodes, {} edges removed",
            nodes_removed, edges_removed
        );
    }

    for (class, length_m, n) in graph.class_lengths().iter().take(5) {
        println!("  {:>16}: {:>9.1} km over {} edges", class, length_m / 1000.0, n);
    }

    println!("\nSaving '{}' to {}...", name, out.display());
    let artifacts = formats::save_network(&graph, &name, &out, &SaveOptions { geojson })?;
    println!("✓ {}", artifacts.snapshot.display());

    let manifest = RunManifest {
        created: chrono::Utc::now().to_rfc3339(),
        tool_version: env!("CARGO_PKG_VERSION"),
        input: input.display().to_string(),
        input_sha256: extract::compute_file_sha256(&input)?,
        aoi: aoi_path.map(|p| p.display().to_string()),
        accepted_classes: accepted,
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        total_length_km: graph
            .class_lengths()
            .iter()
            .map(|(_, length_m, _)| length_m / 1000.0)
            .sum(),
    };
    let manifest_path = out.join(format!("{name}_manifest.json"));
    let file = std::fs::File::create(&manifest_path)
        .with_context(|| format!("Failed to create {}", manifest_path.display()))?;
    serde_json::to_writer_pretty(file, &manifest)?;
    println!("✓ {}", manifest_path.display());

    println!("\nTotal time: {:.2}s", start.elapsed().as_secs_f64());
    println!("✅ Network extraction complete!");
    Ok(())
}

fn cmd_clean(
    snapshot_path: PathBuf,
    cfg: CleanConfig,
    largest_component: bool,
    name: String,
    out: PathBuf,
    geojson: bool,
) -> Result<()> {
    let start = Instant::now();

    println!("Loading {}...", snapshot_path.display());
    let graph = snapshot::load(&snapshot_path)?;
    println!("  {} nodes, {} edges", graph.node_count(), graph.edge_count());

    println!();
    let (mut graph, report) = clean_network(graph, &cfg)?;
    println!("\n{report}");

    if largest_component {
        let (nodes_removed, edges_removed) = graph.retain_largest_component();
        graph.renumber();
        println!(
            "Largest component kept: {} nodes, {} edges removed",
            nodes_removed, edges_removed
        );
    }

    println!("Saving '{}' to {}...", name, out.display());
    let artifacts = formats::save_network(&graph, &name, &out, &SaveOptions { geojson })?;
    println!("✓ {}", artifacts.snapshot.display());

    println!("\nTotal time: {:.2}s", start.elapsed().as_secs_f64());
    println!("✅ Network cleaning complete!");
    Ok(())
}

fn cmd_info(snapshot_path: PathBuf, sample: usize) -> Result<()> {
    let info = snapshot::verify(&snapshot_path)?;
    println!("Snapshot: {}", snapshot_path.display());
    println!(
        "  version {}, {} nodes, {} edges, body {} bytes, checksum OK",
        info.version, info.node_count, info.edge_count, info.body_len
    );

    let graph = snapshot::load(&snapshot_path)?;
    println!("  {} strongly-connected components", graph.component_count());

    println!("\nRoad classes by length:");
    for (class, length_m, n) in graph.class_lengths().iter().take(10) {
        println!("  {:>16}: {:>9.1} km over {} edges", class, length_m / 1000.0, n);
    }

    println!("\nSample nodes:");
    for node in graph.sample_nodes(sample) {
        println!("  {:>8}  ({:.6}, {:.6})", node.id, node.lon, node.lat);
    }

    println!("\nSample edges:");
    for (u, v, edge) in graph.sample_edges(sample) {
        let time = match edge.time_s {
            Some(t) => format!(", {t:.1} s"),
            None => String::new(),
        };
        println!(
            "  {:>8} -> {:<8} {} {:.1} m{} [{}]",
            u, v, edge.infra_type, edge.length_m, time, edge.kind
        );
    }
    Ok(())
}

fn cmd_to_time(
    snapshot_path: PathBuf,
    mode: TravelMode,
    factor: f64,
    name: String,
    out: PathBuf,
    geojson: bool,
) -> Result<()> {
    println!("Loading {}...", snapshot_path.display());
    let mut graph = snapshot::load(&snapshot_path)?;

    println!("Converting to {mode} times (factor {factor})...");
    let stats = speed::convert_network_to_time(&mut graph, mode, factor, &speed::default_speeds());
    println!("  {} edges stamped", stats.edges_converted);
    if !stats.unknown_classes.is_empty() {
        log::warn!(
            "{} road classes missing from the speed table (fell back to {} km/h): {}",
            stats.unknown_classes.len(),
            speed::FALLBACK_DRIVE_KMH,
            stats.unknown_classes.join(", ")
        );
    }

    save_and_finish(&graph, &name, &out, geojson)
}

fn cmd_salt(
    snapshot_path: PathBuf,
    thresh: f64,
    name: String,
    out: PathBuf,
    geojson: bool,
) -> Result<()> {
    println!("Loading {}...", snapshot_path.display());
    let mut graph = snapshot::load(&snapshot_path)?;

    println!("Splitting edges longer than {thresh} m...");
    let stats = salt_long_lines(&mut graph, thresh);
    println!(
        "  {} edges split, {} nodes and {} edges added",
        stats.edges_split, stats.nodes_added, stats.edges_added
    );
    if stats.multi_part_skipped > 0 {
        log::warn!(
            "{} edges kept multi-part geometry and were not split",
            stats.multi_part_skipped
        );
    }
    graph.renumber();

    save_and_finish(&graph, &name, &out, geojson)
}

fn cmd_snap(snapshot_path: PathBuf, points_path: PathBuf, out: PathBuf) -> Result<()> {
    println!("Loading {}...", snapshot_path.display());
    let graph = snapshot::load(&snapshot_path)?;

    println!("Reading points from {}...", points_path.display());
    let points = snap::read_points_csv(&points_path)?;
    println!("  {} points", points.len());

    let start = Instant::now();
    let snapped = snap::snap_points(&graph, &points)?;
    println!("Snapped in {:.3}s", start.elapsed().as_secs_f64());

    snap::write_snapped_csv(&out, &points, &snapped)?;
    println!("✓ {}", out.display());
    Ok(())
}

fn cmd_od(
    snapshot_path: PathBuf,
    origins: String,
    destinations: String,
    field: CostField,
    fail_value: f64,
    out: PathBuf,
) -> Result<()> {
    println!("Loading {}...", snapshot_path.display());
    let graph = snapshot::load(&snapshot_path)?;

    let origins = parse_id_list(&origins)?;
    let destinations = parse_id_list(&destinations)?;
    println!(
        "Computing {} x {} {} matrix...",
        origins.len(),
        destinations.len(),
        field
    );

    let start = Instant::now();
    let matrix = calculate_od(&graph, &origins, &destinations, fail_value, field)?;
    println!("Computed in {:.3}s", start.elapsed().as_secs_f64());

    write_matrix_csv(&matrix, &out)?;
    println!("✓ {}", out.display());
    Ok(())
}

fn save_and_finish(graph: &RoadGraph, name: &str, out: &Path, geojson: bool) -> Result<()> {
    println!("Saving '{}' to {}...", name, out.display());
    let artifacts = formats::save_network(graph, name, out, &SaveOptions { geojson })?;
    println!("✓ {}", artifacts.snapshot.display());
    println!("✅ Done!");
    Ok(())
}

fn parse_id_list(s: &str) -> Result<Vec<u64>> {
    s.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<u64>()
                .with_context(|| format!("Bad node id '{part}'"))
        })
        .collect()
}
