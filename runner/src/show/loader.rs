//! Show loader with compression support.
//!
//! A show document holds the graph and its raw group list. It can arrive as:
//! - plain JSON (editor export)
//! - RON (hand-edited shows, files ending in `.ron`)
//! - packed: base64(gzip(JSON)), or "raw:" + base64(JSON) uncompressed
//!
//! The packed form is what the editor pushes over size-limited channels.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use showgraph_core::{normalize_group_list_with_report, GraphState, GroupIssue, NodeGroup};
use std::io::{Read, Write};
use std::path::Path;

pub const SHOW_FORMAT_VERSION: &str = "1.0";

/// Show document format (matches editor output).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowDocument {
    /// Version string
    #[serde(default = "default_version")]
    pub v: String,
    pub graph: GraphState,
    /// Group records as authored; normalized on load
    #[serde(default)]
    pub groups: Vec<Json>,
}

fn default_version() -> String {
    SHOW_FORMAT_VERSION.to_string()
}

/// A show ready to run.
#[derive(Debug, Clone)]
pub struct LoadedShow {
    pub version: String,
    pub graph: GraphState,
    pub groups: Vec<NodeGroup>,
    pub group_issues: Vec<GroupIssue>,
}

impl From<ShowDocument> for LoadedShow {
    fn from(document: ShowDocument) -> Self {
        if !document.v.starts_with("1.") {
            tracing::warn!(version = %document.v, "unknown show format version");
        }
        let normalized = normalize_group_list_with_report(&document.groups);
        for issue in &normalized.issues {
            tracing::warn!(%issue, "repaired group record");
        }
        LoadedShow {
            version: document.v,
            graph: document.graph,
            groups: normalized.groups,
            group_issues: normalized.issues,
        }
    }
}

/// Errors that can occur during show loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read show: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Show payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Decompress and parse a packed show.
///
/// Expected format: base64(gzip(JSON))
/// Or for uncompressed fallback: "raw:" + base64(JSON)
pub fn decompress_show(packed: &str) -> Result<LoadedShow, LoadError> {
    let packed = packed.trim();
    let json = if let Some(b64) = packed.strip_prefix("raw:") {
        String::from_utf8(BASE64.decode(b64)?)?
    } else {
        let compressed = BASE64.decode(packed)?;
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut json = String::new();
        decoder.read_to_string(&mut json)?;
        json
    };
    parse_show_json(&json)
}

pub fn parse_show_json(json: &str) -> Result<LoadedShow, LoadError> {
    let document: ShowDocument = serde_json::from_str(json)?;
    Ok(document.into())
}

pub fn parse_show_ron(text: &str) -> Result<LoadedShow, LoadError> {
    let document: ShowDocument = ron::from_str(text)?;
    Ok(document.into())
}

/// Load a show file, picking the format from the extension and content.
pub fn load_show_file(path: &Path) -> Result<LoadedShow, LoadError> {
    let text = std::fs::read_to_string(path)?;
    let is_ron = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ron"));

    let show = if is_ron {
        parse_show_ron(&text)?
    } else if text.trim_start().starts_with('{') {
        parse_show_json(&text)?
    } else {
        decompress_show(&text)?
    };

    tracing::info!(
        path = %path.display(),
        nodes = show.graph.nodes.len(),
        connections = show.graph.connections.len(),
        groups = show.groups.len(),
        "loaded show"
    );
    Ok(show)
}

/// Pack a show document as base64(gzip(JSON)).
pub fn pack_show(document: &ShowDocument) -> Result<String, LoadError> {
    let json = serde_json::to_vec(document)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(BASE64.encode(encoder.finish()?))
}
