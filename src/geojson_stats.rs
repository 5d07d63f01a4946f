use anyhow::{Context, Result, bail};
use geo::{BoundingRect, Centroid};
use geojson::{Feature, GeoJson};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::charts;
use crate::stats;

/// Geometry-type bucket for features with no geometry, so that the
/// per-type counts always sum to the feature total.
pub const NO_GEOMETRY: &str = "(none)";

/// Rendering of a missing value in a combination tuple.
pub const MISSING_VALUE: &str = "None";

/// Value-distribution charts cap their bars so labels stay readable.
const MAX_CHART_BARS: usize = 20;

/// Everything collected in one pass over a GeoJSON document.
#[derive(Debug, Default)]
pub struct FileScan {
    pub feature_count: u64,
    /// Count per geometry type name, including [`NO_GEOMETRY`].
    pub geometry_counts: HashMap<String, u64>,
    /// Union of all flattened field paths, exclusions included.
    pub field_names: BTreeSet<String>,
    /// Per non-excluded field path, a value-frequency table.
    pub field_value_counts: HashMap<String, HashMap<String, u64>>,
    /// Frequency of joint value tuples for the combination fields.
    pub combination_counts: HashMap<Vec<String>, u64>,
    /// Numeric occurrences per field path, for mean/median/std.
    pub numeric_values: HashMap<String, Vec<f64>>,
    /// Geometries convertible by the geometry library, for bounds/centroid.
    pub geometries: Vec<geo_types::Geometry<f64>>,
}

/// Flattens nested property objects into dotted field paths; arrays and
/// scalars are leaves.
fn flatten_into<'a>(
    prefix: &str,
    object: &'a serde_json::Map<String, JsonValue>,
    out: &mut Vec<(String, &'a JsonValue)>,
) {
    for (key, value) in object {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            JsonValue::Object(inner) => flatten_into(&path, inner, out),
            _ => out.push((path, value)),
        }
    }
}

fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Path-aware prefix match: `extra` covers `extra` and `extra.category`,
/// but not `extras`.
fn matches_path_prefix(field: &str, prefix: &str) -> bool {
    field
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

fn is_excluded(field: &str, exclude: &[String]) -> bool {
    exclude
        .iter()
        .any(|prefix| matches_path_prefix(field, prefix))
}

/// Single counting pass over the features.
pub fn scan_features(features: &[Feature], exclude: &[String], combination: &[String]) -> FileScan {
    let mut scan = FileScan::default();

    for feature in features {
        scan.feature_count += 1;

        match &feature.geometry {
            Some(geometry) => {
                *scan
                    .geometry_counts
                    .entry(geometry.value.type_name().to_string())
                    .or_insert(0) += 1;
                match geo_types::Geometry::<f64>::try_from(geometry.value.clone()) {
                    Ok(converted) => scan.geometries.push(converted),
                    Err(e) => eprintln!("Skipping geometry for bounds/centroid: {e}"),
                }
            }
            None => {
                *scan
                    .geometry_counts
                    .entry(NO_GEOMETRY.to_string())
                    .or_insert(0) += 1;
            }
        }

        let mut flat = Vec::new();
        if let Some(properties) = &feature.properties {
            flatten_into("", properties, &mut flat);
        }

        for (path, value) in &flat {
            scan.field_names.insert(path.clone());
            if is_excluded(path, exclude) {
                continue;
            }
            *scan
                .field_value_counts
                .entry(path.clone())
                .or_default()
                .entry(render_value(value))
                .or_insert(0) += 1;
            if let JsonValue::Number(number) = value {
                if let Some(numeric) = number.as_f64() {
                    scan.numeric_values.entry(path.clone()).or_default().push(numeric);
                }
            }
        }

        if !combination.is_empty() {
            let lookup: HashMap<&str, &JsonValue> =
                flat.iter().map(|(path, value)| (path.as_str(), *value)).collect();
            let key: Vec<String> = combination
                .iter()
                .map(|field| {
                    lookup
                        .get(field.as_str())
                        .map(|value| render_value(value))
                        .unwrap_or_else(|| MISSING_VALUE.to_string())
                })
                .collect();
            *scan.combination_counts.entry(key).or_insert(0) += 1;
        }
    }

    scan
}

/// Caller-supplied field paths must exist in the data; anything that
/// matches nothing is an error, not a silent no-op.
pub fn validate_fields(scan: &FileScan, exclude: &[String], combination: &[String]) -> Result<()> {
    let mut unknown: Vec<&str> = Vec::new();
    for prefix in exclude {
        if !scan
            .field_names
            .iter()
            .any(|field| matches_path_prefix(field, prefix))
        {
            unknown.push(prefix.as_str());
        }
    }
    for field in combination {
        if !scan.field_names.contains(field.as_str()) {
            unknown.push(field.as_str());
        }
    }
    if !unknown.is_empty() {
        bail!("unknown property field path(s): {}", unknown.join(", "));
    }
    Ok(())
}

/// Count rows ordered by descending count, ties broken by key.
pub fn sorted_desc(counts: &HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut rows: Vec<(String, u64)> = counts
        .iter()
        .map(|(key, count)| (key.clone(), *count))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

/// Bounding box and centroid over all collected geometries.
pub fn bounds_and_centroid(
    geometries: &[geo_types::Geometry<f64>],
) -> (Option<geo_types::Rect<f64>>, Option<geo_types::Point<f64>>) {
    if geometries.is_empty() {
        return (None, None);
    }
    let collection = geo_types::GeometryCollection(geometries.to_vec());
    (collection.bounding_rect(), collection.centroid())
}

pub fn format_bounding_box(rect: &geo_types::Rect<f64>) -> String {
    format!(
        "({}, {}, {}, {})",
        rect.min().x,
        rect.min().y,
        rect.max().x,
        rect.max().y
    )
}

pub fn format_report(scan: &FileScan, combination: &[String]) -> String {
    let mut out = String::new();

    out.push_str(&format!("Number of features: {}\n", scan.feature_count));

    out.push_str("Number of features per geometry type:\n");
    for (geometry_type, count) in sorted_desc(&scan.geometry_counts) {
        out.push_str(&format!("  {geometry_type}: {count}\n"));
    }

    out.push_str("Aggregated list of all field names under 'properties':\n");
    for field in &scan.field_names {
        out.push_str(&format!("  {field}\n"));
    }

    out.push_str("Count of occurrences of each field under 'properties':\n");
    let mut reported_fields: Vec<&String> = scan.field_value_counts.keys().collect();
    reported_fields.sort();
    for field in &reported_fields {
        let values = sorted_desc(&scan.field_value_counts[*field]);
        let value_text = values
            .iter()
            .map(|(value, count)| format!("{value} ({count})"))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("  {field}: {value_text}\n"));
    }

    if !combination.is_empty() {
        out.push_str(&format!(
            "Count of occurrences of '{}' fields under 'properties':\n",
            combination.join(", ")
        ));
        let mut rows: Vec<(String, u64)> = scan
            .combination_counts
            .iter()
            .map(|(key, count)| (key.join(", "), *count))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (combined, count) in rows {
            out.push_str(&format!("  {combined} ({count})\n"));
        }
    }

    out.push_str("Numeric field statistics:\n");
    let mut numeric_fields: Vec<&String> = scan.numeric_values.keys().collect();
    numeric_fields.sort();
    for field in numeric_fields {
        let values = &scan.numeric_values[field];
        // mean/median/std_dev only return None on empty input, which
        // cannot happen for a field that made it into the map.
        let mean = stats::mean(values).unwrap_or(f64::NAN);
        let median = stats::median(values).unwrap_or(f64::NAN);
        let std = stats::std_dev(values).unwrap_or(f64::NAN);
        out.push_str(&format!(
            "  {field}: mean={mean}, median={median}, std={std}\n"
        ));
    }

    let (bounding_box, centroid) = bounds_and_centroid(&scan.geometries);
    if let Some(rect) = bounding_box {
        out.push_str(&format!("Bounding Box: {}\n", format_bounding_box(&rect)));
    }
    if let Some(point) = centroid {
        out.push_str(&format!("Centroid: ({}, {})\n", point.x(), point.y()));
    }

    out
}

/// Parses a GeoJSON document into its feature list. A bare Feature or
/// Geometry document is treated as a one-feature collection.
pub fn load_features(path: &Path) -> Result<Vec<Feature>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let geojson = contents
        .parse::<GeoJson>()
        .with_context(|| format!("parsing {} as GeoJSON", path.display()))?;
    Ok(match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    })
}

/// Load-and-scan used by both the single-file and the folder analyzer.
pub fn scan_file(path: &Path) -> Result<FileScan> {
    let features = load_features(path)?;
    Ok(scan_features(&features, &[], &[]))
}

/// Keeps field paths usable as part of a chart file name.
pub fn sanitize_for_filename(field: &str) -> String {
    field
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn render_chart(path: &Path, title: &str, mut rows: Vec<(String, u64)>) {
    rows.truncate(MAX_CHART_BARS);
    if rows.is_empty() {
        println!("No data to visualize for {title}.");
        return;
    }
    // Chart rendering is best-effort: a missing font or an unwritable
    // target must not fail the analysis.
    match charts::bar_chart(path, title, &rows) {
        Ok(()) => println!("Chart written to {}", path.display()),
        Err(e) => eprintln!("Could not render chart {}: {e}", path.display()),
    }
}

pub fn run_analyze_geojson(path: &Path, exclude: &[String], combination: &[String]) -> Result<()> {
    println!("Analyzing GeoJSON file: {:?}", path);
    let features = load_features(path)?;
    let scan = scan_features(&features, exclude, combination);
    validate_fields(&scan, exclude, combination)?;

    let report = format_report(&scan, combination);
    print!("{report}");

    let output_path = path.with_extension("txt");
    fs::write(&output_path, &report)
        .with_context(|| format!("writing report to {}", output_path.display()))?;
    println!("Output written to {}", output_path.display());

    let base = output_path.with_extension("");
    render_chart(
        &chart_path(&base, "geometry_distribution"),
        "Geometry Type Distribution",
        sorted_desc(&scan.geometry_counts),
    );
    let mut charted_fields: Vec<&String> = scan.field_value_counts.keys().collect();
    charted_fields.sort();
    for field in charted_fields {
        let suffix = format!("{}_value_distribution", sanitize_for_filename(field));
        render_chart(
            &chart_path(&base, &suffix),
            &format!("{field} Value Distribution"),
            sorted_desc(&scan.field_value_counts[field]),
        );
    }
    Ok(())
}

fn chart_path(base: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}_{suffix}.png", base.display()))
}
