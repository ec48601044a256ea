use chrono::{DateTime, Utc};
use sequencing_core::Classification;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::batch::{BatchClassifier, BatchOutcome};
use crate::error::Result;
use crate::validators_app::ValidatorDirectory;

/// On-disk classification table consumed by dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationFile {
    pub generated_at: DateTime<Utc>,
    pub classifications: BTreeMap<String, Classification>,
}

impl ClassificationFile {
    pub fn from_outcome(outcome: &BatchOutcome, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            classifications: outcome.classifications.clone(),
        }
    }

    pub fn count(&self, label: Classification) -> usize {
        self.classifications.values().filter(|&&l| l == label).count()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Classifies every staked validator running `software_client` and writes
/// the labels to `output`.
pub async fn run(
    classifier: &BatchClassifier,
    directory: &ValidatorDirectory,
    software_client: &str,
    output: &Path,
) -> Result<ClassificationFile> {
    let snapshot = directory.snapshot().await;
    let identities: Vec<String> = snapshot
        .accounts_with_client(software_client)
        .map(|v| v.account.clone())
        .collect();

    if identities.is_empty() {
        warn!(software_client, "no validators found for software client");
    } else {
        info!(software_client, count = identities.len(), "classifying validators");
    }

    let outcome = classifier.classify_all(identities).await;
    let file = ClassificationFile::from_outcome(&outcome, Utc::now());
    file.write(output)?;
    info!(path = %output.display(), "classifications written");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_generated_at_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("classifications.json");

        let mut outcome = BatchOutcome::default();
        outcome
            .classifications
            .insert("a".into(), Classification::SecondHalfDominant);
        outcome.classifications.insert("b".into(), Classification::Other);

        let file = ClassificationFile::from_outcome(&outcome, Utc::now());
        file.write(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json["generatedAt"].is_string());
        assert_eq!(json["classifications"]["a"], "Rev");
        assert_eq!(json["classifications"]["b"], "Vanilla");
        assert_eq!(file.count(Classification::SecondHalfDominant), 1);
    }
}
