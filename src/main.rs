//! # osm2mif CLI
//!
//! Command-line interface for the osm2mif library.
//! Converts an OpenStreetMap XML extract into a MapInfo MIF/MID pair.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use osm2mif::{run_convert, ConvertConfig, Error};
use std::ffi::OsString;
use std::path::PathBuf;

mod cli;

/// Command-line interface for osm2mif
#[derive(Parser, Debug)]
#[command(name = "osm2mif")]
#[command(about = "Convert OpenStreetMap XML extracts into MapInfo MIF/MID files")]
#[command(long_about = "Converts an OSM XML extract into <OUTPUT_BASE>.mif and <OUTPUT_BASE>.mid:
  osm2mif brussels.osm roads.rules out/brussels
  osm2mif brussels.osm roads.rules out/brussels --no-relations

Turn restrictions can be skipped with --no-relations, --no_relations or the
older single-dash -no_relations.

The rule file selects the tags that become columns, e.g.:
  mk=\"highway\" iv=\"residential\" iv=\"primary\" style=\"Pen(2,2,255)\"
  k=\"natural\" iv=\"water\" mif_type=\"Region\" break_up=\"no\"
  k=\"route\" ev=\"ferry\"")]
#[command(version = env!("OSM2MIF_VERSION"))]
struct Cli {
    /// OSM XML extract to convert
    input: PathBuf,

    /// Rule description file
    rules: PathBuf,

    /// Output base name; ".mif" and ".mid" are appended
    #[arg(value_name = "OUTPUT_BASE")]
    output: PathBuf,

    /// Ignore turn-restriction relations and omit the Restrictions column
    #[arg(long, alias = "no_relations")]
    no_relations: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = match Cli::try_parse_from(std::env::args_os().map(normalize_flag)) {
        Ok(cli) => cli,
        Err(e) => {
            // Missing or extra arguments only print the usage
            let _ = e.print();
            return;
        }
    };

    // Initialize logging to stderr
    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = run(cli) {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Cli) -> Result<()> {
    let config = ConvertConfig {
        input: args.input,
        rules: args.rules,
        output: args.output,
        relations: !args.no_relations,
    };

    info!(
        "🗺️ osm2mif v{} converting {}",
        env!("OSM2MIF_VERSION"),
        config.input.display()
    );

    let summary = match run_convert(&config) {
        Ok(summary) => summary,
        Err(e) => {
            let context = failure_context(&e, &config);
            return Err(e).context(context);
        }
    };

    print!("{}", cli::render_summary(&summary));
    Ok(())
}

/// Map the single-dash `-no_relations` spelling onto the long flag
fn normalize_flag(arg: OsString) -> OsString {
    if arg.to_str() == Some("-no_relations") {
        OsString::from("--no-relations")
    } else {
        arg
    }
}

/// Rule errors point at the rule file, everything else at the extract
fn failure_context(err: &Error, config: &ConvertConfig) -> String {
    if err.is_configuration() {
        format!("Invalid rule description {}", config.rules.display())
    } else {
        format!("Failed to convert {}", config.input.display())
    }
}
