pub mod geomath;
pub mod roads;
pub mod graph;
pub mod extract;
pub mod aoi;
pub mod formats;
pub mod simplify;
pub mod speed;
pub mod salt;
pub mod snap;
pub mod od;
pub mod cli;

pub use graph::{build_graph, RoadGraph};
pub use roads::RoadTable;
pub use simplify::{clean_network, CleanConfig};
