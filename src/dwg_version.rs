use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Known DWG header tags and their human-readable release names.
const VERSION_MAP: &[(&str, &str)] = &[
    ("MC0.0", "DWG Release 1.1"),
    ("AC1.2", "DWG Release 1.2"),
    ("AC1.4", "DWG Release 1.4"),
    ("AC1.50", "DWG Release 2.0"),
    ("AC2.10", "DWG Release 2.10"),
    ("AC1002", "DWG Release 2.5"),
    ("AC1003", "DWG Release 2.6"),
    ("AC1004", "DWG Release 9"),
    ("AC1006", "DWG Release 10"),
    ("AC1009", "DWG Release 11/12 (LT R1/R2)"),
    ("AC1012", "DWG Release 13 (LT95)"),
    ("AC1014", "DWG Release 14, 14.01 (LT97/LT98)"),
    ("AC1015", "DWG AutoCAD 2000/2000i/2002"),
    ("AC1018", "DWG AutoCAD 2004/2005/2006"),
    ("AC1021", "DWG AutoCAD 2007/2008/2009"),
    ("AC1024", "DWG AutoCAD 2010/2011/2012"),
    ("AC1027", "DWG AutoCAD 2013/2014/2015/2016/2017"),
    ("AC1032", "DWG AutoCAD 2018/2019/2020/2021/2022"),
];

// The version tag lives in the first bytes of the header, terminated by NUL.
const HEADER_PROBE_LEN: u64 = 20;

/// Reads the DWG header tag and maps it to a release name. Unknown but
/// non-empty tags are returned as-is; an unrecognizable header yields
/// "Unknown".
pub fn parse_dwg_version(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut header = Vec::new();
    file.take(HEADER_PROBE_LEN)
        .read_to_end(&mut header)
        .with_context(|| format!("reading {}", path.display()))?;

    let end = header.iter().position(|&b| b == 0).unwrap_or(header.len());
    let tag = String::from_utf8_lossy(&header[..end]).trim().to_string();

    if let Some((_, release)) = VERSION_MAP.iter().find(|(known, _)| *known == tag) {
        return Ok((*release).to_string());
    }
    if tag.is_empty() {
        Ok("Unknown".to_string())
    } else {
        Ok(tag)
    }
}

pub fn run_dwg_version(path: &Path) -> Result<()> {
    let version = parse_dwg_version(path)?;
    println!("DWG Version: {}", version);
    Ok(())
}
