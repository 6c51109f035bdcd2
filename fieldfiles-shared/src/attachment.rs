use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// The style every uploaded attachment is stored under.
pub const ORIGINAL_STYLE: &str = "original";

/// Which family of tables an attachment lives in.
///
/// Files and images share the same row shape and lifecycle, they only
/// differ in where they're persisted.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    File,
    Image,
}

impl AttachmentKind {
    /// Entity table name
    pub fn table(&self) -> &'static str {
        match self {
            AttachmentKind::File => "files",
            AttachmentKind::Image => "images",
        }
    }

    /// Association (join) table name
    pub fn assoc_table(&self) -> &'static str {
        match self {
            AttachmentKind::File => "fileassocs",
            AttachmentKind::Image => "imageassocs",
        }
    }

    /// Column in the association table referencing the entity table
    pub fn assoc_column(&self) -> &'static str {
        match self {
            AttachmentKind::File => "fileId",
            AttachmentKind::Image => "imageId",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::File => "file",
            AttachmentKind::Image => "image",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" | "files" => Ok(AttachmentKind::File),
            "image" | "images" => Ok(AttachmentKind::Image),
            other => Err(format!("unknown attachment kind: {other}")),
        }
    }
}

/// Resolved URL per style name, persisted as a JSON object in the `urls` column.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleUrls(BTreeMap<String, String>);

impl StyleUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, style: &str) -> Option<&str> {
        self.0.get(style).map(String::as_str)
    }

    pub fn original(&self) -> Option<&str> {
        self.get(ORIGINAL_STYLE)
    }

    pub fn set(&mut self, style: impl Into<String>, url: impl Into<String>) {
        self.0.insert(style.into(), url.into());
    }

    pub fn remove(&mut self, style: &str) -> Option<String> {
        self.0.remove(style)
    }

    pub fn contains(&self, style: &str) -> bool {
        self.0.contains_key(style)
    }

    pub fn styles(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> String {
        // a map of strings always serializes
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse the stored column value. A corrupt blob is logged and read as
    /// an empty map instead of failing the whole row.
    pub fn from_json_lossy(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Option<BTreeMap<String, String>>>(raw) {
            Ok(val) => Self(val.unwrap_or_default()),
            Err(err) => {
                warn!(raw, "Failed to parse stored urls, treating as empty: {:?}", err);
                Self::default()
            }
        }
    }
}

impl FromIterator<(String, String)> for StyleUrls {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Free-form key/value data stored alongside an attachment.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExtraData {
    #[serde(rename = "Keys", default)]
    pub keys: BTreeMap<String, String>,
}

impl ExtraData {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Same degraded-read policy as [`StyleUrls::from_json_lossy`].
    pub fn from_json_lossy(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<Option<Self>>(raw) {
            Ok(val) => val,
            Err(err) => {
                warn!(raw, "Failed to parse stored extraData, ignoring: {:?}", err);
                None
            }
        }
    }
}
