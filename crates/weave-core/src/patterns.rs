use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named, categorised query or workflow template loaded from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    /// Backend type the pattern targets (sql, kv, ...).
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub related_patterns: Vec<String>,
    #[serde(default)]
    pub backend_function: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub best_practices: Vec<String>,
}

/// Wire representation served by the pattern endpoints. Conversion from
/// [`Pattern`] is field-lossless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternInfo {
    pub name: String,
    pub backend_type: String,
    pub category: String,
    pub description: String,
    pub parameters: Vec<String>,
    pub examples: Vec<String>,
    pub use_cases: Vec<String>,
    pub related_patterns: Vec<String>,
    pub backend_function: String,
    pub difficulty: String,
    pub best_practices: Vec<String>,
}

impl From<&Pattern> for PatternInfo {
    fn from(p: &Pattern) -> Self {
        Self {
            name: p.name.clone(),
            backend_type: p.domain.clone(),
            category: p.category.clone(),
            description: p.description.clone(),
            parameters: p.parameters.clone(),
            examples: p.examples.clone(),
            use_cases: p.use_cases.clone(),
            related_patterns: p.related_patterns.clone(),
            backend_function: p.backend_function.clone(),
            difficulty: p.difficulty.clone(),
            best_practices: p.best_practices.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("failed to read pattern directory {0}: {1}")]
    ReadDir(String, std::io::Error),

    #[error("failed to read pattern file {0}: {1}")]
    ReadFile(String, std::io::Error),

    #[error("invalid pattern file {0}: {1}")]
    Parse(String, serde_yaml::Error),
}

/// In-memory pattern registry for one agent.
#[derive(Debug, Default, Clone)]
pub struct PatternLibrary {
    patterns: HashMap<String, Pattern>,
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.yaml`/`.yml` file in `dir` as one pattern each.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, PatternError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| PatternError::ReadDir(dir.display().to_string(), e))?;

        let mut library = Self::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| PatternError::ReadFile(path.display().to_string(), e))?;
            let pattern: Pattern = serde_yaml::from_str(&content)
                .map_err(|e| PatternError::Parse(path.display().to_string(), e))?;
            library.insert(pattern);
        }
        Ok(library)
    }

    pub fn insert(&mut self, pattern: Pattern) {
        self.patterns.insert(pattern.name.clone(), pattern);
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.patterns.get(name)
    }

    pub fn list(&self) -> Vec<&Pattern> {
        let mut patterns: Vec<&Pattern> = self.patterns.values().collect();
        patterns.sort_by(|a, b| a.name.cmp(&b.name));
        patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_pattern() -> Pattern {
        Pattern {
            name: "top-n".to_string(),
            domain: "sql".to_string(),
            category: "analytics".to_string(),
            description: "Top N rows by metric".to_string(),
            parameters: vec!["metric".to_string(), "n".to_string()],
            examples: vec!["top 5 products by revenue".to_string()],
            use_cases: vec!["ranking".to_string()],
            related_patterns: vec!["window-rank".to_string()],
            backend_function: "rank()".to_string(),
            difficulty: "beginner".to_string(),
            best_practices: vec!["index the metric column".to_string()],
        }
    }

    #[test]
    fn conversion_is_lossless() {
        let pattern = sample_pattern();
        let info = PatternInfo::from(&pattern);
        assert_eq!(info.name, pattern.name);
        assert_eq!(info.backend_type, pattern.domain);
        assert_eq!(info.category, pattern.category);
        assert_eq!(info.description, pattern.description);
        assert_eq!(info.parameters, pattern.parameters);
        assert_eq!(info.examples, pattern.examples);
        assert_eq!(info.use_cases, pattern.use_cases);
        assert_eq!(info.related_patterns, pattern.related_patterns);
        assert_eq!(info.backend_function, pattern.backend_function);
        assert_eq!(info.difficulty, pattern.difficulty);
        assert_eq!(info.best_practices, pattern.best_practices);
    }

    #[test]
    fn load_dir_reads_yaml_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("top-n.yaml");
        let mut file = std::fs::File::create(&path).expect("create file");
        writeln!(file, "name: top-n\ndomain: sql\ncategory: analytics").expect("write");

        let library = PatternLibrary::load_dir(dir.path()).expect("load");
        assert_eq!(library.len(), 1);
        assert_eq!(library.get("top-n").expect("pattern").domain, "sql");
    }

    #[test]
    fn load_dir_fails_on_missing_directory() {
        assert!(PatternLibrary::load_dir("/nonexistent/patterns").is_err());
    }
}
