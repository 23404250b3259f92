use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

/// Declares a string-backed enum with rusqlite conversions.
/// The registry stores every state column as TEXT; these enums keep the
/// Rust side typed while the SQL side stays readable.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant)),+,
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                Self::parse(text).ok_or(FromSqlError::InvalidType)
            }
        }
    };
}

string_enum!(FileState {
    Pending => "pending",
    Classified => "classified",
    Organized => "organized",
    Duplicate => "duplicate",
    Missing => "missing",
    Error => "error",
    Review => "review",
});

string_enum!(ClassificationMethod {
    MlModel => "ml_model",
    Pattern => "pattern",
    Manual => "manual",
    Extension => "extension",
});

string_enum!(DetectionMethod {
    QuickHashPrefilter => "quick_hash_prefilter",
    FullHashVerified => "full_hash_verified",
    FuzzyFilename => "fuzzy_filename",
});

string_enum!(PlanStatus {
    Pending => "pending",
    Approved => "approved",
    Executing => "executing",
    Completed => "completed",
    Failed => "failed",
    RolledBack => "rolled_back",
});

string_enum!(ActionType {
    Move => "move",
    Copy => "copy",
    Archive => "archive",
    Delete => "delete",
});

string_enum!(ActionStatus {
    Pending => "pending",
    Done => "done",
    Failed => "failed",
    Skipped => "skipped",
});

/// One entry per distinct physical file ever seen. Records are never
/// deleted; superseded copies are marked via `state`, not removed.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub original_path: String,
    pub file_name: String,
    pub extension: String,
    pub size_bytes: i64,
    pub quick_hash: Option<String>,
    pub content_hash: Option<String>,
    pub state: FileState,
    pub document_type: Option<String>,
    pub confidence: Option<f64>,
    pub classification_method: Option<ClassificationMethod>,
    /// Extracted entities (JSON object), supplied by the metadata collaborator.
    pub metadata: Option<String>,
    pub is_duplicate: bool,
    pub duplicate_of: Option<i64>,
    pub canonical_path: Option<String>,
    pub move_count: i64,
    pub last_moved_at: Option<String>,
    pub last_modified: i64,
    pub last_accessed: Option<i64>,
    pub first_seen_at: String,
    pub requires_review: bool,
}

impl FileRecord {
    /// Where the file lives right now: canonical location once organized,
    /// otherwise wherever it was scanned.
    pub fn current_path(&self) -> &str {
        self.canonical_path
            .as_deref()
            .unwrap_or(&self.original_path)
    }
}

/// Draft produced by the scanner before a record exists.
#[derive(Debug, Clone)]
pub struct FileDraft {
    pub original_path: String,
    pub file_name: String,
    pub extension: String,
    pub size_bytes: i64,
    pub quick_hash: Option<String>,
    pub last_modified: i64,
    pub last_accessed: Option<i64>,
}

/// A cluster of records sharing identical full content hash, with the
/// canonical member already chosen. Recomputed fresh each analyzer run.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub id: i64,
    pub content_hash: String,
    pub canonical_file_id: i64,
    pub detection_method: DetectionMethod,
    pub file_count: i64,
    pub wasted_bytes: i64,
    pub created_at: String,
}

/// Analyzer output, ready to be applied to the registry in one transaction.
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    pub content_hash: String,
    pub file_size: i64,
    pub canonical_file_id: i64,
    pub member_ids: Vec<i64>,
    pub detection_method: DetectionMethod,
}

#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub id: i64,
    pub created_at: String,
    pub approved: bool,
    pub status: PlanStatus,
}

#[derive(Debug, Clone)]
pub struct MigrationAction {
    pub id: i64,
    pub plan_id: i64,
    pub seq: i64,
    pub file_id: i64,
    pub source_path: String,
    pub target_path: String,
    pub action_type: ActionType,
    pub reason: String,
    pub expected_hash: Option<String>,
    pub requires_review: bool,
    pub status: ActionStatus,
    pub error: Option<String>,
}

/// Planner output before persistence; seq is assigned on insert.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub file_id: i64,
    pub source_path: String,
    pub target_path: String,
    pub action_type: ActionType,
    pub reason: String,
    pub expected_hash: Option<String>,
    pub requires_review: bool,
}

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub id: i64,
    pub plan_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct CheckpointEntry {
    pub id: i64,
    pub checkpoint_id: i64,
    pub file_id: i64,
    pub canonical_path: Option<String>,
    pub state: FileState,
    pub content_hash: Option<String>,
    pub document_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MoveEvent {
    pub id: i64,
    pub file_id: i64,
    pub moved_at: String,
    pub from_path: String,
    pub to_path: String,
    pub plan_id: Option<i64>,
    pub external: bool,
}

#[derive(Debug, Clone)]
pub struct Correction {
    pub id: i64,
    pub file_id: i64,
    pub corrected_at: String,
    pub old_type: Option<String>,
    pub new_type: String,
    pub reason: String,
}

/// A fuzzy-filename suggestion. Review-only; never merged automatically.
#[derive(Debug, Clone)]
pub struct NearDuplicate {
    pub id: i64,
    pub file_id_a: i64,
    pub file_id_b: i64,
    pub similarity: f64,
    pub reason: String,
    pub created_at: String,
}
