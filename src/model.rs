//! Core data types (spec §3). Plain records — the Store is the single
//! source of truth for them; there is no runtime pointer graph to maintain.

use serde::{Deserialize, Serialize};

/// Sentinel depth used for tag-bounded sections (spec §3, §4.2).
pub const TAG_DEPTH: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    Headings,
    Tags,
    Mixed,
    Json,
    Shell,
    MultiFile,
    Opaque,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Headings => "headings",
            Shape::Tags => "tags",
            Shape::Mixed => "mixed",
            Shape::Json => "json",
            Shape::Shell => "shell",
            Shape::MultiFile => "multi-file",
            Shape::Opaque => "opaque",
        }
    }

    pub fn parse(s: &str) -> Option<Shape> {
        Some(match s {
            "headings" => Shape::Headings,
            "tags" => Shape::Tags,
            "mixed" => Shape::Mixed,
            "json" => Shape::Json,
            "shell" => Shape::Shell,
            "multi-file" => Shape::MultiFile,
            "opaque" => Shape::Opaque,
            _ => return None,
        })
    }
}

/// Closed enumeration of kinds an ingester may assign. The core treats this
/// as an opaque label (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    Guide,
    Command,
    Reference,
    Agent,
    Plugin,
    Hook,
    Config,
    OutputStyle,
    Script,
    Documentation,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Guide => "guide",
            Kind::Command => "command",
            Kind::Reference => "reference",
            Kind::Agent => "agent",
            Kind::Plugin => "plugin",
            Kind::Hook => "hook",
            Kind::Config => "config",
            Kind::OutputStyle => "output-style",
            Kind::Script => "script",
            Kind::Documentation => "documentation",
        }
    }

    pub fn parse(s: &str) -> Option<Kind> {
        Some(match s {
            "guide" => Kind::Guide,
            "command" => Kind::Command,
            "reference" => Kind::Reference,
            "agent" => Kind::Agent,
            "plugin" => Kind::Plugin,
            "hook" => Kind::Hook,
            "config" => Kind::Config,
            "output-style" => Kind::OutputStyle,
            "script" => Kind::Script,
            "documentation" => Kind::Documentation,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub kind: String,
    pub shape: Shape,
    #[serde(with = "serde_bytes_as_string")]
    pub header_blob: Vec<u8>,
    pub content_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub file_id: i64,
    pub parent_id: Option<i64>,
    pub depth: i64,
    pub title: String,
    #[serde(with = "serde_bytes_as_string")]
    pub body: Vec<u8>,
    pub order_index: i64,
    pub line_start: i64,
    pub line_end: i64,
    #[serde(with = "serde_bytes_as_string")]
    pub closing_suffix: Vec<u8>,
}

impl Section {
    pub fn is_tag_bounded(&self) -> bool {
        self.depth == TAG_DEPTH
    }
}

/// A nested view used by `tree()` (spec §4.7) — bodies elided to keep the
/// reply small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: i64,
    pub title: String,
    pub depth: i64,
    pub order_index: i64,
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub file_id: i64,
    pub section_id: i64,
    pub model_id: String,
    pub vector: Vec<f32>,
}

/// Sections' `body`/`closing_suffix` are raw bytes that are not necessarily
/// valid UTF-8 in the general case, but every ingested format this crate
/// targets is text, so we store/serialize them as lossy UTF-8 for JSON
/// consumers and keep the real `Vec<u8>` internally.
mod serde_bytes_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        Ok(s.into_bytes())
    }
}
