use serde::{Deserialize, Serialize};

/// A named image variant, eg a thumbnail.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ImageStyle {
    /// Max width, 0 is unbounded
    #[serde(default)]
    pub width: u32,
    /// Max height, 0 is unbounded
    #[serde(default)]
    pub height: u32,
    /// Output format extension, eg `webp`. Empty keeps the source format.
    #[serde(default)]
    pub format: String,
}

impl ImageStyle {
    pub fn new(width: u32, height: u32, format: &str) -> Self {
        Self {
            width,
            height,
            format: format.to_string(),
        }
    }
}
