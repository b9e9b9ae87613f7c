/// Implementation of `pbf header`.
///
/// # Output format
///
/// ```text
/// Program:     osmium/1.16.0
/// Source:      https://www.openstreetmap.org/api/0.6
/// BBox:        left=7.4 right=7.44 top=43.75 bottom=43.72
/// Required:    OsmSchema-V0.6, DenseNodes
/// Optional:    Sort.Type_then_ID
/// Replication: seq=4242 at 1700000000 from https://planet.osm.org/replication/minute
/// ```
use std::fmt::Write as _;

use anyhow::{Context, Result};
use pbf_parser::{Parser, ParserConfig};
use pbf_types::Header;
use serde::Serialize;

use crate::HeaderArgs;

/// Run the `pbf header` command.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or its first block is
/// not a decodable header.
pub async fn run(args: &HeaderArgs, json: bool) -> Result<()> {
    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    let mut parser = Parser::new(file, ParserConfig::default());
    let header = parser
        .header()
        .await
        .with_context(|| format!("failed to read header of {}", args.file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&HeaderReport::from(header))?);
    } else {
        print!("{}", render(header));
    }
    Ok(())
}

/// JSON shape of a header.
#[derive(Serialize)]
pub(crate) struct HeaderReport<'a> {
    pub bbox: Option<[f64; 4]>,
    pub required_features: &'a [String],
    pub optional_features: &'a [String],
    pub writing_program: Option<&'a str>,
    pub source: Option<&'a str>,
    pub replication_timestamp: Option<i64>,
    pub replication_sequence: Option<i64>,
    pub replication_base_url: Option<&'a str>,
}

impl<'a> From<&'a Header> for HeaderReport<'a> {
    fn from(h: &'a Header) -> Self {
        Self {
            bbox: h.bbox.map(|b| [b.left, b.right, b.top, b.bottom]),
            required_features: &h.required_features,
            optional_features: &h.optional_features,
            writing_program: h.writing_program.as_deref(),
            source: h.source.as_deref(),
            replication_timestamp: h.replication_timestamp,
            replication_sequence: h.replication_sequence,
            replication_base_url: h.replication_base_url.as_deref(),
        }
    }
}

/// Human-readable rendering; absent fields are left out.
pub(crate) fn render(h: &Header) -> String {
    let mut out = String::new();
    if let Some(program) = &h.writing_program {
        let _ = writeln!(out, "Program:     {program}");
    }
    if let Some(source) = &h.source {
        let _ = writeln!(out, "Source:      {source}");
    }
    if let Some(b) = &h.bbox {
        let _ = writeln!(
            out,
            "BBox:        left={} right={} top={} bottom={}",
            b.left, b.right, b.top, b.bottom
        );
    }
    if h.required_features.is_empty() {
        out.push_str("Required:    (none)\n");
    } else {
        let _ = writeln!(out, "Required:    {}", h.required_features.join(", "));
    }
    if !h.optional_features.is_empty() {
        let _ = writeln!(out, "Optional:    {}", h.optional_features.join(", "));
    }
    if h.replication_sequence.is_some() || h.replication_timestamp.is_some() {
        let seq = h.replication_sequence.map_or_else(|| "-".to_owned(), |s| s.to_string());
        let ts = h.replication_timestamp.map_or_else(|| "-".to_owned(), |t| t.to_string());
        let _ = write!(out, "Replication: seq={seq} at {ts}");
        if let Some(url) = &h.replication_base_url {
            let _ = write!(out, " from {url}");
        }
        out.push('\n');
    }
    out
}
