use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::geojson_stats::{self, FileScan};

/// One analyzed file of the folder: display name, scan, and the per-field
/// presence counts derived from the scan.
struct FileRow {
    name: String,
    scan: FileScan,
    field_presence: HashMap<String, u64>,
}

impl FileRow {
    fn new(name: String, scan: FileScan) -> Self {
        let field_presence = scan
            .field_value_counts
            .iter()
            .map(|(field, values)| (field.clone(), values.values().sum()))
            .collect();
        Self { name, scan, field_presence }
    }
}

/// Quote a field the way delimited writers must: only when it contains the
/// separator, a quote, or a newline.
fn escape_field(text: &str, delimiter: char) -> String {
    if text.contains(delimiter) || text.contains('"') || text.contains('\n') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// Column names ordered by descending total count across files, ties
/// broken by name.
fn union_columns<'a, I>(maps: I) -> Vec<String>
where
    I: Iterator<Item = &'a HashMap<String, u64>>,
{
    let mut totals: HashMap<String, u64> = HashMap::new();
    for map in maps {
        for (key, count) in map {
            *totals.entry(key.clone()).or_insert(0) += count;
        }
    }
    let mut columns: Vec<(String, u64)> = totals.into_iter().collect();
    columns.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    columns.into_iter().map(|(name, _)| name).collect()
}

/// Value columns for the dump field, ordered by descending average
/// occurrence across files, ties broken by value.
fn dump_columns(rows: &[FileRow], dump_field: &str) -> Vec<String> {
    let mut totals: HashMap<String, u64> = HashMap::new();
    for row in rows {
        if let Some(values) = row.scan.field_value_counts.get(dump_field) {
            for (value, count) in values {
                *totals.entry(value.clone()).or_insert(0) += count;
            }
        }
    }
    let file_count = rows.len() as f64;
    let mut columns: Vec<(String, f64)> = totals
        .into_iter()
        .map(|(value, total)| (value, total as f64 / file_count))
        .collect();
    columns.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    columns.into_iter().map(|(value, _)| value).collect()
}

fn format_table(rows: &[FileRow], dump_field: Option<&str>, delimiter: char) -> String {
    let geometry_columns = union_columns(rows.iter().map(|row| &row.scan.geometry_counts));
    let field_columns = union_columns(rows.iter().map(|row| &row.field_presence));
    let value_columns = dump_field
        .map(|field| dump_columns(rows, field))
        .unwrap_or_default();

    let mut header: Vec<String> = vec!["file".to_string(), "features".to_string()];
    header.extend(geometry_columns.iter().cloned());
    header.extend(field_columns.iter().cloned());
    if let Some(field) = dump_field {
        header.extend(value_columns.iter().map(|value| format!("{field}={value}")));
    }

    let mut out = String::new();
    out.push_str(
        &header
            .iter()
            .map(|column| escape_field(column, delimiter))
            .collect::<Vec<_>>()
            .join(&delimiter.to_string()),
    );
    out.push('\n');

    for row in rows {
        let mut cells: Vec<String> = vec![
            escape_field(&row.name, delimiter),
            row.scan.feature_count.to_string(),
        ];
        for column in &geometry_columns {
            let count = row.scan.geometry_counts.get(column).copied().unwrap_or(0);
            cells.push(count.to_string());
        }
        for column in &field_columns {
            let count = row.field_presence.get(column).copied().unwrap_or(0);
            cells.push(count.to_string());
        }
        if let Some(field) = dump_field {
            let values = row.scan.field_value_counts.get(field);
            for column in &value_columns {
                let count = values
                    .and_then(|counts| counts.get(column))
                    .copied()
                    .unwrap_or(0);
                cells.push(count.to_string());
            }
        }
        out.push_str(&cells.join(&delimiter.to_string()));
        out.push('\n');
    }
    out
}

fn output_file_name(dir: &Path, dump_field: Option<&str>) -> String {
    let folder_name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "folder".to_string());
    match dump_field {
        Some(field) => format!(
            "{folder_name}_{}.csv",
            geojson_stats::sanitize_for_filename(field)
        ),
        None => format!("{folder_name}.csv"),
    }
}

pub fn run_analyze_folder(dir: &Path, dump_field: Option<&str>, delimiter: char) -> Result<()> {
    println!("Scanning directory for GeoJSON files: {:?}", dir);

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext == "geojson" || ext == "json")
        })
        .collect();
    files.sort();

    if files.is_empty() {
        bail!("no GeoJSON files found in {}", dir.display());
    }
    println!("Found {} GeoJSON files. Starting analysis...", files.len());

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .expect("Failed to set progress bar template")
            .progress_chars("#>-"),
    );

    // One file at a time; a bad file is skipped, not fatal.
    let mut rows: Vec<FileRow> = Vec::new();
    for path in &files {
        match geojson_stats::scan_file(path) {
            Ok(scan) => {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                rows.push(FileRow::new(name, scan));
            }
            Err(e) => pb.println(format!(
                "Skipping {:?}: {e:#}",
                path.file_name().unwrap_or(path.as_os_str())
            )),
        }
        pb.inc(1);
    }
    pb.finish_with_message("Finished processing all GeoJSON files.");

    if rows.is_empty() {
        bail!("no GeoJSON file in {} could be analyzed", dir.display());
    }

    if let Some(field) = dump_field {
        let observed = rows
            .iter()
            .any(|row| row.scan.field_value_counts.contains_key(field));
        if !observed {
            bail!("dump field '{field}' not present in any analyzed file");
        }
    }

    let table = format_table(&rows, dump_field, delimiter);
    let output_path = dir.join(output_file_name(dir, dump_field));
    fs::write(&output_path, &table)
        .with_context(|| format!("writing table to {}", output_path.display()))?;

    let all_geometries: Vec<geo_types::Geometry<f64>> = rows
        .iter()
        .flat_map(|row| row.scan.geometries.iter().cloned())
        .collect();
    let (bounding_box, centroid) = geojson_stats::bounds_and_centroid(&all_geometries);

    println!("\n--- Aggregate Geometry Stats ---");
    println!("Files analyzed: {}", rows.len());
    match bounding_box {
        Some(rect) => println!(
            "Bounding Box: {}",
            geojson_stats::format_bounding_box(&rect)
        ),
        None => println!("Bounding Box: (no geometries)"),
    }
    match centroid {
        Some(point) => println!("Centroid: ({}, {})", point.x(), point.y()),
        None => println!("Centroid: (no geometries)"),
    }
    println!("--------------------------------");
    println!("Output written to {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geojson_stats::scan_features;
    use geojson::GeoJson;
    use serde_json::json;
    use std::io::Write;

    fn row(name: &str, value: serde_json::Value) -> FileRow {
        let geojson: GeoJson = value.to_string().parse().expect("valid GeoJSON");
        let features = match geojson {
            GeoJson::FeatureCollection(collection) => collection.features,
            _ => panic!("expected a feature collection"),
        };
        FileRow::new(name.to_string(), scan_features(&features, &[], &[]))
    }

    fn point_feature(kind: &str) -> serde_json::Value {
        json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 1.0]},
            "properties": {"kind": kind}
        })
    }

    fn sample_rows() -> Vec<FileRow> {
        vec![
            row(
                "a.geojson",
                json!({
                    "type": "FeatureCollection",
                    "features": [point_feature("road"), point_feature("road"), point_feature("rail")]
                }),
            ),
            row(
                "b.geojson",
                json!({
                    "type": "FeatureCollection",
                    "features": [point_feature("rail")]
                }),
            ),
        ]
    }

    #[test]
    fn escape_field_quotes_only_when_needed() {
        assert_eq!(escape_field("plain", ','), "plain");
        assert_eq!(escape_field("a,b", ','), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\"", ','), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("a,b", '\t'), "a,b");
    }

    #[test]
    fn union_columns_order_by_total_then_name() {
        let mut first = HashMap::new();
        first.insert("Point".to_string(), 3u64);
        first.insert("Polygon".to_string(), 1u64);
        let mut second = HashMap::new();
        second.insert("LineString".to_string(), 3u64);
        second.insert("Point".to_string(), 1u64);
        let columns = union_columns([&first, &second].into_iter());
        assert_eq!(columns, vec!["Point", "LineString", "Polygon"]);
    }

    #[test]
    fn dump_columns_order_by_average_occurrence() {
        let rows = sample_rows();
        assert_eq!(dump_columns(&rows, "kind"), vec!["rail", "road"]);
    }

    #[test]
    fn table_has_union_columns_and_one_row_per_file() {
        let rows = sample_rows();
        let table = format_table(&rows, Some("kind"), ',');
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "file,features,Point,kind,kind=rail,kind=road");
        assert_eq!(lines[1], "a.geojson,3,3,3,1,2");
        assert_eq!(lines[2], "b.geojson,1,1,1,1,0");
    }

    #[test]
    fn table_without_dump_field_omits_value_columns() {
        let rows = sample_rows();
        let table = format_table(&rows, None, '\t');
        assert_eq!(table.lines().next().unwrap(), "file\tfeatures\tPoint\tkind");
    }

    #[test]
    fn output_name_includes_dump_field() {
        let dir = Path::new("/data/tiles");
        assert_eq!(output_file_name(dir, None), "tiles.csv");
        assert_eq!(output_file_name(dir, Some("kind")), "tiles_kind.csv");
    }

    #[test]
    fn folder_run_writes_combined_table_and_skips_bad_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let collection = json!({
            "type": "FeatureCollection",
            "features": [point_feature("road"), point_feature("rail")]
        });
        fs::write(dir.path().join("one.geojson"), collection.to_string()).unwrap();
        fs::write(
            dir.path().join("two.geojson"),
            json!({
                "type": "FeatureCollection",
                "features": [point_feature("road")]
            })
            .to_string(),
        )
        .unwrap();
        let mut broken = fs::File::create(dir.path().join("broken.json")).unwrap();
        broken.write_all(b"{ not geojson").unwrap();

        run_analyze_folder(dir.path(), Some("kind"), ',').unwrap();

        let folder_name = dir.path().file_name().unwrap().to_string_lossy();
        let table =
            fs::read_to_string(dir.path().join(format!("{folder_name}_kind.csv"))).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "file,features,Point,kind,kind=road,kind=rail");
        assert_eq!(lines[1], "one.geojson,2,2,2,1,1");
        assert_eq!(lines[2], "two.geojson,1,1,1,1,0");
    }

    #[test]
    fn folder_run_rejects_unknown_dump_field() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join("one.geojson"),
            json!({
                "type": "FeatureCollection",
                "features": [point_feature("road")]
            })
            .to_string(),
        )
        .unwrap();
        let error = run_analyze_folder(dir.path(), Some("nope"), ',').unwrap_err();
        assert!(error.to_string().contains("nope"));
    }

    #[test]
    fn empty_folder_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(run_analyze_folder(dir.path(), None, ',').is_err());
    }
}
