pub mod charts;
pub mod dwg_version;
pub mod dxf_stats;
pub mod folder_stats;
pub mod geojson_stats;
pub mod stats;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarize entities per layer in a DXF drawing
    AnalyzeDxf {
        /// Path to the DXF file
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// Analyze features, geometry types and property fields of a GeoJSON file
    AnalyzeGeojson {
        /// Path to the GeoJSON file
        #[arg(value_name = "FILE")]
        path: PathBuf,
        /// Comma-separated property field paths to exclude (e.g. 'id,style,extra.id')
        #[arg(long, value_name = "FIELDS")]
        exclude: Option<String>,
        /// Comma-separated field paths to combine and count jointly
        #[arg(long, value_name = "FIELDS")]
        combination: Option<String>,
    },
    /// Build a combined per-file table over a folder of GeoJSON files
    AnalyzeGeojsonFolder {
        /// Path to the directory containing GeoJSON files
        #[arg(value_name = "DIR")]
        path: PathBuf,
        /// Field path whose value distribution becomes extra columns
        #[arg(long, value_name = "FIELD")]
        dump: Option<String>,
        /// Column separator for the output table
        #[arg(long, value_name = "CHAR", default_value_t = ',')]
        delimiter: char,
    },
    /// Print the release version recorded in a DWG file header
    DwgVersion {
        /// Path to the DWG file
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

fn split_fields(list: Option<&String>) -> Vec<String> {
    list.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::AnalyzeDxf { path } => dxf_stats::run_analyze_dxf(path),
        Commands::AnalyzeGeojson {
            path,
            exclude,
            combination,
        } => {
            let exclude = split_fields(exclude.as_ref());
            let combination = split_fields(combination.as_ref());
            geojson_stats::run_analyze_geojson(path, &exclude, &combination)
        }
        Commands::AnalyzeGeojsonFolder {
            path,
            dump,
            delimiter,
        } => folder_stats::run_analyze_folder(path, dump.as_deref(), *delimiter),
        Commands::DwgVersion { path } => dwg_version::run_dwg_version(path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
