use crate::context::AppContext;
use crate::error::Error;
use crate::registry::models::{ClassificationMethod, FileRecord, FileState};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Validated classifier output. Collaborators hand back loosely-shaped
/// results; this is the typed form the registry accepts.
#[derive(Debug, Clone)]
pub struct Classification {
    pub document_type: String,
    pub confidence: f64,
    pub method: ClassificationMethod,
}

impl Classification {
    pub fn validate(self) -> Result<Self, Error> {
        if self.document_type.trim().is_empty() {
            return Err(Error::Other("classifier returned empty document type".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::Other(format!(
                "classifier confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(self)
    }
}

/// The classification collaborator boundary. An ML model, a rule engine,
/// anything — the core only sees this trait.
pub trait Classifier: Send + Sync {
    fn classify(&self, path: &Path) -> Result<Classification, Error>;
}

/// Built-in collaborator: filename patterns first, extension fallback.
pub struct PatternClassifier {
    rules: Vec<(String, String)>,
    extension_types: Vec<(String, String)>,
}

impl PatternClassifier {
    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self {
            rules: config
                .classification
                .iter()
                .map(|r| (r.pattern.to_lowercase(), r.document_type.clone()))
                .collect(),
            extension_types: config
                .extension_types
                .iter()
                .map(|(ext, ty)| (ext.to_lowercase(), ty.clone()))
                .collect(),
        }
    }
}

impl Classifier for PatternClassifier {
    fn classify(&self, path: &Path) -> Result<Classification, Error> {
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        for (pattern, document_type) in &self.rules {
            if file_name.contains(pattern.as_str()) {
                return Ok(Classification {
                    document_type: document_type.clone(),
                    confidence: 0.75,
                    method: ClassificationMethod::Pattern,
                });
            }
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        for (ext, document_type) in &self.extension_types {
            if *ext == extension {
                return Ok(Classification {
                    document_type: document_type.clone(),
                    confidence: 0.5,
                    method: ClassificationMethod::Extension,
                });
            }
        }

        Err(Error::Other(format!("no rule matches '{file_name}'")))
    }
}

#[derive(Debug, Default)]
pub struct ClassifyReport {
    pub classified: usize,
    pub sent_to_review: usize,
    pub failed: usize,
    pub timed_out: usize,
}

/// Classify every pending record. The collaborator call runs on its own
/// thread behind a timeout so a hung classifier cannot stall the pipeline;
/// failures and timeouts leave the record pending for the next pass.
pub fn run_classification_pass(
    ctx: &AppContext,
    classifier: Arc<dyn Classifier>,
) -> Result<ClassifyReport, Error> {
    let timeout = Duration::from_secs(ctx.config.classifier_timeout_secs.max(1));
    let pending = ctx.db.pending_classification(i64::MAX)?;
    info!("Classifying {} pending files", pending.len());

    let mut report = ClassifyReport::default();
    for record in &pending {
        let path = PathBuf::from(record.current_path());
        match classify_with_timeout(classifier.clone(), path, timeout) {
            Ok(classification) => match classification.validate() {
                Ok(c) => {
                    let needs_review = c.confidence < ctx.config.confidence_floor;
                    let state = if needs_review {
                        FileState::Review
                    } else {
                        FileState::Classified
                    };
                    ctx.db.set_classification(
                        record.id,
                        &c.document_type,
                        c.confidence,
                        c.method,
                        state,
                        needs_review,
                    )?;
                    if needs_review {
                        report.sent_to_review += 1;
                    } else {
                        report.classified += 1;
                    }
                }
                Err(e) => {
                    warn!("File {}: invalid classifier result: {}", record.id, e);
                    report.failed += 1;
                }
            },
            Err(TimeoutOrError::TimedOut) => {
                warn!(
                    "File {}: classifier timed out after {:?}; will retry",
                    record.id, timeout
                );
                report.timed_out += 1;
            }
            Err(TimeoutOrError::Failed(e)) => {
                debug!("File {}: classification failed: {}; will retry", record.id, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Classification pass: {} classified, {} to review, {} failed, {} timed out",
        report.classified, report.sent_to_review, report.failed, report.timed_out
    );
    Ok(report)
}

enum TimeoutOrError {
    TimedOut,
    Failed(Error),
}

fn classify_with_timeout(
    classifier: Arc<dyn Classifier>,
    path: PathBuf,
    timeout: Duration,
) -> Result<Classification, TimeoutOrError> {
    let (tx, rx) = mpsc::channel();
    // Detached worker: if the collaborator hangs, the thread is abandoned
    // and the send into a dropped channel is discarded.
    thread::spawn(move || {
        let _ = tx.send(classifier.classify(&path));
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(classification)) => Ok(classification),
        Ok(Err(e)) => Err(TimeoutOrError::Failed(e)),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(TimeoutOrError::TimedOut),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(TimeoutOrError::Failed(Error::Other(
            "classifier thread died".into(),
        ))),
    }
}

/// Manual correction: retype a record, append the audit entry, and make it
/// eligible for the next reorganization pass. The file is not moved here.
pub fn correct(
    ctx: &AppContext,
    file_id: i64,
    new_type: &str,
    reason: &str,
) -> Result<FileRecord, Error> {
    if new_type.trim().is_empty() {
        return Err(Error::Other("correction requires a document type".into()));
    }
    ctx.db.record_correction(file_id, new_type, reason)?;
    let record = ctx.db.get_file(file_id)?;
    info!(
        "File {} corrected to '{}' ({})",
        file_id, new_type, reason
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassificationRule;

    fn classifier() -> PatternClassifier {
        let mut config = crate::config::AppConfig {
            classification: vec![ClassificationRule {
                pattern: "invoice".into(),
                document_type: "financial_invoice".into(),
            }],
            ..Default::default()
        };
        config
            .extension_types
            .insert("pdf".into(), "document".into());
        PatternClassifier::from_config(&config)
    }

    #[test]
    fn pattern_rule_wins_over_extension() {
        let c = classifier();
        let result = c.classify(Path::new("/in/Invoice_march.pdf")).unwrap();
        assert_eq!(result.document_type, "financial_invoice");
        assert_eq!(result.method, ClassificationMethod::Pattern);
    }

    #[test]
    fn extension_fallback_applies() {
        let c = classifier();
        let result = c.classify(Path::new("/in/notes.pdf")).unwrap();
        assert_eq!(result.document_type, "document");
        assert_eq!(result.method, ClassificationMethod::Extension);
    }

    #[test]
    fn unmatched_file_is_an_error() {
        let c = classifier();
        assert!(c.classify(Path::new("/in/mystery.xyz")).is_err());
    }

    #[test]
    fn validation_rejects_bad_confidence() {
        let c = Classification {
            document_type: "x".into(),
            confidence: 1.5,
            method: ClassificationMethod::Manual,
        };
        assert!(c.validate().is_err());
    }
}
