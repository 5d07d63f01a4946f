use anyhow::{Context, Result, anyhow};
use dxf::Drawing;
use dxf::entities::EntityType;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Recognized entity-type categories, in report column order.
pub const ENTITY_CATEGORIES: [&str; 12] = [
    "POINT",
    "LINE",
    "POLYLINE",
    "LWPOLYLINE",
    "ARC",
    "CIRCLE",
    "ELLIPSE",
    "SPLINE",
    "TEXT",
    "MTEXT",
    "HATCH",
    "DIMENSION",
];

/// Bucket for entities carrying an empty layer attribute.
pub const UNSPECIFIED_LAYER: &str = "(unspecified)";

/// Per-layer entity tallies collected in a single pass over the drawing.
#[derive(Debug, Default)]
pub struct LayerStats {
    pub total: u64,
    pub categories: HashMap<&'static str, u64>,
    pub other: HashMap<String, u64>,
    pub inserts: u64,
    /// Referenced block names, de-duplicated, in first-seen order.
    pub blocks: Vec<String>,
}

enum EntityKind<'a> {
    Category(&'static str),
    Insert(&'a str),
    Other(&'static str),
}

fn classify(specific: &EntityType) -> EntityKind<'_> {
    match specific {
        EntityType::ModelPoint(_) => EntityKind::Category("POINT"),
        EntityType::Line(_) => EntityKind::Category("LINE"),
        EntityType::Polyline(_) => EntityKind::Category("POLYLINE"),
        EntityType::LwPolyline(_) => EntityKind::Category("LWPOLYLINE"),
        EntityType::Arc(_) => EntityKind::Category("ARC"),
        EntityType::Circle(_) => EntityKind::Category("CIRCLE"),
        EntityType::Ellipse(_) => EntityKind::Category("ELLIPSE"),
        EntityType::Spline(_) => EntityKind::Category("SPLINE"),
        EntityType::Text(_) => EntityKind::Category("TEXT"),
        EntityType::MText(_) => EntityKind::Category("MTEXT"),
        EntityType::RotatedDimension(_)
        | EntityType::RadialDimension(_)
        | EntityType::DiameterDimension(_)
        | EntityType::AngularThreePointDimension(_)
        | EntityType::OrdinateDimension(_) => EntityKind::Category("DIMENSION"),
        EntityType::Insert(insert) => EntityKind::Insert(&insert.name),
        other => EntityKind::Other(other_type_name(other)),
    }
}

/// Names for entity types outside the fixed category set.
fn other_type_name(specific: &EntityType) -> &'static str {
    match specific {
        EntityType::Attribute(_) => "ATTRIB",
        EntityType::AttributeDefinition(_) => "ATTDEF",
        EntityType::Body(_) => "BODY",
        EntityType::Face3D(_) => "3DFACE",
        EntityType::Image(_) => "IMAGE",
        EntityType::Leader(_) => "LEADER",
        EntityType::MLine(_) => "MLINE",
        EntityType::OleFrame(_) => "OLEFRAME",
        EntityType::Ole2Frame(_) => "OLE2FRAME",
        EntityType::ProxyEntity(_) => "ACAD_PROXY_ENTITY",
        EntityType::Ray(_) => "RAY",
        EntityType::Seqend(_) => "SEQEND",
        EntityType::Shape(_) => "SHAPE",
        EntityType::Solid(_) => "SOLID",
        EntityType::Tolerance(_) => "TOLERANCE",
        EntityType::Trace(_) => "TRACE",
        EntityType::Vertex(_) => "VERTEX",
        EntityType::Wipeout(_) => "WIPEOUT",
        EntityType::XLine(_) => "XLINE",
        _ => "UNKNOWN",
    }
}

/// Walks every entity once and tallies it into its layer's stats.
/// Entities without a layer land in the [`UNSPECIFIED_LAYER`] bucket.
pub fn aggregate(drawing: &Drawing) -> HashMap<String, LayerStats> {
    let mut layers: HashMap<String, LayerStats> = HashMap::new();

    for entity in drawing.entities() {
        let layer_name = if entity.common.layer.is_empty() {
            UNSPECIFIED_LAYER.to_string()
        } else {
            entity.common.layer.clone()
        };
        let stats = layers.entry(layer_name).or_default();
        stats.total += 1;

        match classify(&entity.specific) {
            EntityKind::Category(category) => {
                *stats.categories.entry(category).or_insert(0) += 1;
            }
            EntityKind::Insert(block_name) => {
                stats.inserts += 1;
                if !stats.blocks.iter().any(|name| name == block_name) {
                    stats.blocks.push(block_name.to_string());
                }
            }
            EntityKind::Other(type_name) => {
                *stats.other.entry(type_name.to_string()).or_insert(0) += 1;
            }
        }
    }

    layers
}

/// Layers ordered by descending total, ties broken by layer name.
pub fn sorted_layers(layers: &HashMap<String, LayerStats>) -> Vec<(&String, &LayerStats)> {
    let mut rows: Vec<_> = layers.iter().collect();
    rows.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(b.0)));
    rows
}

/// Formats the per-layer table, tab-separated, one row per layer.
pub fn format_report(layers: &HashMap<String, LayerStats>) -> String {
    let mut out = String::new();
    out.push_str("Layer Name\tTotal");
    for category in ENTITY_CATEGORIES {
        out.push_str(&format!("\t{category}"));
    }
    out.push_str("\tOther types\tINSERT\tBLOCKS\n");

    for (layer_name, stats) in sorted_layers(layers) {
        out.push_str(&format!("{layer_name}\t{}", stats.total));
        for category in ENTITY_CATEGORIES {
            let count = stats.categories.get(category).copied().unwrap_or(0);
            out.push_str(&format!("\t{count}"));
        }

        let mut other: Vec<(&String, &u64)> = stats.other.iter().collect();
        other.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let other_text = other
            .iter()
            .map(|(type_name, count)| format!("{type_name}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");

        out.push_str(&format!(
            "\t{other_text}\t{}\t{}\n",
            stats.inserts,
            stats.blocks.join(", ")
        ));
    }
    out
}

pub fn run_analyze_dxf(path: &Path) -> Result<()> {
    println!("Analyzing DXF file: {:?}", path);
    let raw_path = path.to_string_lossy().to_string();
    let drawing =
        Drawing::load_file(&raw_path).map_err(|e| anyhow!("loading {}: {e}", path.display()))?;

    let layers = aggregate(&drawing);
    let report = format_report(&layers);
    print!("{report}");

    let output_path = path.with_extension("txt");
    fs::write(&output_path, &report)
        .with_context(|| format!("writing report to {}", output_path.display()))?;
    println!("Output written to {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxf::entities::{Circle, Entity, Insert, Line, ModelPoint, Text, XLine};

    fn entity_on_layer(specific: EntityType, layer: &str) -> Entity {
        let mut entity = Entity::new(specific);
        entity.common.layer = layer.to_string();
        entity
    }

    fn sample_drawing() -> Drawing {
        let mut drawing = Drawing::new();
        drawing.add_entity(entity_on_layer(EntityType::Line(Line::default()), "walls"));
        drawing.add_entity(entity_on_layer(EntityType::Line(Line::default()), "walls"));
        drawing.add_entity(entity_on_layer(
            EntityType::Circle(Circle::default()),
            "walls",
        ));
        let mut door = Insert::default();
        door.name = "door".to_string();
        drawing.add_entity(entity_on_layer(EntityType::Insert(door), "walls"));
        let mut door_again = Insert::default();
        door_again.name = "door".to_string();
        drawing.add_entity(entity_on_layer(EntityType::Insert(door_again), "walls"));
        drawing.add_entity(entity_on_layer(EntityType::XLine(XLine::default()), "walls"));
        drawing.add_entity(entity_on_layer(
            EntityType::ModelPoint(ModelPoint::default()),
            "survey",
        ));
        drawing.add_entity(entity_on_layer(EntityType::Text(Text::default()), ""));
        drawing
    }

    #[test]
    fn tallies_entities_per_layer() {
        let layers = aggregate(&sample_drawing());

        let walls = &layers["walls"];
        assert_eq!(walls.total, 6);
        assert_eq!(walls.categories["LINE"], 2);
        assert_eq!(walls.categories["CIRCLE"], 1);
        assert_eq!(walls.inserts, 2);
        assert_eq!(walls.blocks, vec!["door".to_string()]);
        assert_eq!(walls.other["XLINE"], 1);

        let survey = &layers["survey"];
        assert_eq!(survey.total, 1);
        assert_eq!(survey.categories["POINT"], 1);
    }

    #[test]
    fn empty_layer_goes_to_unspecified_bucket() {
        let layers = aggregate(&sample_drawing());
        let unspecified = &layers[UNSPECIFIED_LAYER];
        assert_eq!(unspecified.total, 1);
        assert_eq!(unspecified.categories["TEXT"], 1);
    }

    #[test]
    fn category_counts_sum_to_layer_total() {
        let layers = aggregate(&sample_drawing());
        for stats in layers.values() {
            let category_sum: u64 = stats.categories.values().sum();
            let other_sum: u64 = stats.other.values().sum();
            assert_eq!(category_sum + other_sum + stats.inserts, stats.total);
        }
    }

    #[test]
    fn layers_sort_by_descending_total_then_name() {
        let layers = aggregate(&sample_drawing());
        let names: Vec<&str> = sorted_layers(&layers)
            .into_iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["walls", UNSPECIFIED_LAYER, "survey"]);
    }

    #[test]
    fn report_has_header_and_one_row_per_layer() {
        let layers = aggregate(&sample_drawing());
        let report = format_report(&layers);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Layer Name\tTotal\tPOINT\tLINE\tPOLYLINE\tLWPOLYLINE\tARC\tCIRCLE\tELLIPSE\tSPLINE\tTEXT\tMTEXT\tHATCH\tDIMENSION\tOther types\tINSERT\tBLOCKS"
        );
        assert!(lines[1].starts_with("walls\t6\t"));
        assert!(lines[1].contains("XLINE: 1"));
        assert!(lines[1].ends_with("\t2\tdoor"));
    }

    #[test]
    fn report_is_deterministic() {
        let layers = aggregate(&sample_drawing());
        assert_eq!(format_report(&layers), format_report(&layers));
    }

    #[test]
    fn empty_drawing_yields_header_only() {
        let layers = aggregate(&Drawing::new());
        let report = format_report(&layers);
        assert_eq!(report.lines().count(), 1);
    }
}
