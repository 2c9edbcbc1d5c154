use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A configured evaluator. Lives in memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Slug identifier. Derived from `name` when left empty.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub criteria: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_threshold: Option<f64>,
}

/// Lowercase the input, collapse every run of non-alphanumeric characters
/// into a single `-`, and trim leading/trailing dashes. An input with no
/// usable characters yields a fresh UUID.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        return Uuid::new_v4().to_string();
    }
    slug
}
