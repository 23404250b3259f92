use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub root_paths: Vec<String>,
    /// Root of the organized tree that migration targets live under.
    #[serde(default = "default_canonical_root")]
    pub canonical_root: String,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_scan_workers")]
    pub scan_workers: usize,
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
    #[serde(default = "default_execution_batch_size")]
    pub execution_batch_size: usize,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// Path prefixes that make a duplicate-group member the preferred copy.
    #[serde(default)]
    pub preferred_prefixes: Vec<String>,
    #[serde(default = "default_true")]
    pub fuzzy_matching: bool,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_classifier_timeout_secs")]
    pub classifier_timeout_secs: u64,
    #[serde(default)]
    pub classification: Vec<ClassificationRule>,
    #[serde(default)]
    pub extension_types: BTreeMap<String, String>,
    #[serde(default)]
    pub structure: StructureConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_paths: Vec::new(),
            canonical_root: default_canonical_root(),
            exclude_patterns: Vec::new(),
            follow_symlinks: false,
            scan_workers: default_scan_workers(),
            scan_batch_size: default_scan_batch_size(),
            execution_batch_size: default_execution_batch_size(),
            failure_threshold: default_failure_threshold(),
            preferred_prefixes: Vec::new(),
            fuzzy_matching: true,
            fuzzy_threshold: default_fuzzy_threshold(),
            confidence_floor: default_confidence_floor(),
            classifier_timeout_secs: default_classifier_timeout_secs(),
            classification: Vec::new(),
            extension_types: BTreeMap::new(),
            structure: StructureConfig::default(),
        }
    }
}

/// One filename-pattern classification rule, checked in order.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationRule {
    pub pattern: String,
    pub document_type: String,
}

/// Declarative mapping: document type → target path template.
/// Recognized placeholders: {YYYY}, {MM}, {type}, {filename}, and any
/// extracted-metadata key by name.
#[derive(Debug, Clone, Deserialize)]
pub struct StructureConfig {
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: String,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            templates: BTreeMap::new(),
            fallback_dir: default_fallback_dir(),
            archive_dir: default_archive_dir(),
        }
    }
}

fn default_scan_workers() -> usize {
    8
}

fn default_scan_batch_size() -> usize {
    500
}

fn default_execution_batch_size() -> usize {
    100
}

fn default_failure_threshold() -> f64 {
    0.5
}

fn default_fuzzy_threshold() -> f64 {
    0.85
}

fn default_confidence_floor() -> f64 {
    0.4
}

fn default_classifier_timeout_secs() -> u64 {
    30
}

fn default_canonical_root() -> String {
    "Organized".to_string()
}

fn default_fallback_dir() -> String {
    "Unsorted".to_string()
}

fn default_archive_dir() -> String {
    "Archive/Duplicates".to_string()
}

fn default_true() -> bool {
    true
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Shipshape").required(false))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for dir in dirs {
        let dir_path = Path::new(&dir);
        let mut should_add = true;
        let result_clone = result.clone();

        for res_dir in &result_clone {
            let res_dir_path = Path::new(res_dir);

            if dir_path.starts_with(res_dir_path) {
                should_add = false;
                break;
            }

            if res_dir_path.starts_with(dir_path) {
                result.retain(|x| x != res_dir);
                break;
            }
        }

        if should_add {
            result.push(dir);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_overlapping_no_overlap() {
        let dirs = vec![
            "/home/user/photos".to_string(),
            "/home/user/docs".to_string(),
            "/var/data".to_string(),
        ];
        let result = non_overlapping_directories(dirs);
        assert_eq!(result.len(), 3);
        assert!(result.contains(&"/home/user/photos".to_string()));
        assert!(result.contains(&"/home/user/docs".to_string()));
        assert!(result.contains(&"/var/data".to_string()));
    }

    #[test]
    fn test_non_overlapping_with_subdirectory() {
        let dirs = vec![
            "/home/user".to_string(),
            "/home/user/docs".to_string(),
            "/var/data".to_string(),
        ];
        let result = non_overlapping_directories(dirs);
        assert_eq!(result.len(), 2);
        assert!(result.contains(&"/home/user".to_string()));
        assert!(result.contains(&"/var/data".to_string()));
        // /home/user/docs should be removed as it's under /home/user
        assert!(!result.contains(&"/home/user/docs".to_string()));
    }

    #[test]
    fn test_structure_config_defaults() {
        let structure = StructureConfig::default();
        assert_eq!(structure.fallback_dir, "Unsorted");
        assert!(structure.templates.is_empty());
    }
}
