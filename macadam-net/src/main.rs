//! # macadam-net CLI
//!
//! Command-line interface for the macadam-net library.
//! Extracts, cleans, and measures road networks from OpenStreetMap data.

use log::error;

use macadam_net::cli;

fn main() {
    // Logging goes to stderr so piped output stays clean
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = cli::run() {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}
