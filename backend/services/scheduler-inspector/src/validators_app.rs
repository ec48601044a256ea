//! Validator metadata from validators.app and the BAM explorer.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::StatusCode;
use sequencing_core::validators::{RawValidator, ValidatorSnapshot};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{InspectorError, Result};
use crate::metrics::MetricsRecorder;

const VALIDATORS_APP_PAGE_SIZE: usize = 1000;

#[async_trait]
pub trait ValidatorSource: Send + Sync {
    async fn fetch_validators(&self) -> Result<Vec<RawValidator>>;

    /// Identities confirmed to run BAM.
    async fn fetch_bam_validators(&self) -> Result<HashSet<String>>;
}

#[derive(Deserialize)]
struct BamValidator {
    validator_pubkey: String,
}

pub struct HttpValidatorSource {
    client: reqwest::Client,
    validators_app_url: String,
    token: Option<String>,
    bam_url: String,
}

impl HttpValidatorSource {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self {
            client,
            validators_app_url: config.validators_app_url.clone(),
            token: config.validators_app_token.clone(),
            bam_url: config.bam_validators_url.clone(),
        })
    }
}

#[async_trait]
impl ValidatorSource for HttpValidatorSource {
    /// Walks every page until a short page or a rate limit. Pages fetched
    /// before an error are kept.
    async fn fetch_validators(&self) -> Result<Vec<RawValidator>> {
        let Some(token) = self.token.as_deref() else {
            return Err(InspectorError::Config("validators.app token not set".into()));
        };

        let mut validators = Vec::new();
        let mut page = 1usize;
        loop {
            let response = self
                .client
                .get(&self.validators_app_url)
                .query(&[("limit", VALIDATORS_APP_PAGE_SIZE), ("page", page)])
                .header("Token", token)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) if validators.is_empty() => return Err(e.into()),
                Err(e) => {
                    warn!(page, error = %e, "validators.app request failed, keeping earlier pages");
                    break;
                }
            };

            match response.status() {
                StatusCode::TOO_MANY_REQUESTS => {
                    warn!(page, "validators.app rate limited");
                    break;
                }
                status if !status.is_success() => {
                    if validators.is_empty() {
                        return Err(InspectorError::UpstreamStatus(format!("validators.app returned {status}")));
                    }
                    warn!(page, %status, "validators.app error, keeping earlier pages");
                    break;
                }
                _ => {}
            }

            let batch: Vec<RawValidator> = response.json().await?;
            let fetched = batch.len();
            validators.extend(batch);
            if fetched < VALIDATORS_APP_PAGE_SIZE {
                break;
            }
            page += 1;
        }

        Ok(validators)
    }

    async fn fetch_bam_validators(&self) -> Result<HashSet<String>> {
        let response = self.client.get(&self.bam_url).send().await?;
        if !response.status().is_success() {
            return Err(InspectorError::UpstreamStatus(format!(
                "BAM explorer returned {}",
                response.status()
            )));
        }
        let validators: Vec<BamValidator> = response.json().await?;
        Ok(validators.into_iter().map(|v| v.validator_pubkey).collect())
    }
}

/// Holds the current [`ValidatorSnapshot`] and rebuilds it once it is older
/// than the TTL. Upstream failures yield an emptier snapshot, never an error.
pub struct ValidatorDirectory {
    source: Arc<dyn ValidatorSource>,
    ttl: chrono::Duration,
    current: RwLock<Option<Arc<ValidatorSnapshot>>>,
    refresh: Mutex<()>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl ValidatorDirectory {
    pub fn new(source: Arc<dyn ValidatorSource>, ttl: std::time::Duration) -> Self {
        Self {
            source,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(30)),
            current: RwLock::new(None),
            refresh: Mutex::new(()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn fresh(&self) -> Option<Arc<ValidatorSnapshot>> {
        self.current
            .read()
            .as_ref()
            .filter(|s| s.is_fresh(Utc::now(), self.ttl))
            .cloned()
    }

    pub async fn snapshot(&self) -> Arc<ValidatorSnapshot> {
        if let Some(snapshot) = self.fresh() {
            return snapshot;
        }

        let _guard = self.refresh.lock().await;
        // another caller may have refreshed while we waited
        if let Some(snapshot) = self.fresh() {
            return snapshot;
        }

        let snapshot = Arc::new(self.build().await);
        *self.current.write() = Some(snapshot.clone());
        snapshot
    }

    async fn build(&self) -> ValidatorSnapshot {
        let (validators, bam) = tokio::join!(
            self.source.fetch_validators(),
            self.source.fetch_bam_validators()
        );

        let validators = validators.unwrap_or_else(|e| {
            warn!(error = %e, "validator list unavailable");
            self.record_upstream_error("validators_app");
            Vec::new()
        });
        let bam = bam.unwrap_or_else(|e| {
            warn!(error = %e, "BAM validator list unavailable");
            self.record_upstream_error("bam_explorer");
            HashSet::new()
        });

        let snapshot = ValidatorSnapshot::build(Utc::now(), validators, &bam);
        info!(
            validators = snapshot.validators.len(),
            named = snapshot.names.len(),
            bam = bam.len(),
            "validator snapshot refreshed"
        );
        snapshot
    }

    fn record_upstream_error(&self, upstream: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_upstream_error(upstream);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequencing_core::validators::{AGAVE_BAM, HARMONIC};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeSource {
        calls: AtomicUsize,
        bam_fails: bool,
    }

    #[async_trait]
    impl ValidatorSource for FakeSource {
        async fn fetch_validators(&self) -> Result<Vec<RawValidator>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                RawValidator {
                    account: "bam".into(),
                    name: Some("Bam Node".into()),
                    active_stake: Some(10),
                    software_client: Some("JitoLabs".into()),
                },
                RawValidator {
                    account: "quiet".into(),
                    name: None,
                    active_stake: Some(5),
                    software_client: None,
                },
            ])
        }

        async fn fetch_bam_validators(&self) -> Result<HashSet<String>> {
            if self.bam_fails {
                return Err(InspectorError::UpstreamStatus("down".into()));
            }
            Ok(["bam".to_string()].into_iter().collect())
        }
    }

    fn directory(bam_fails: bool, ttl: Duration) -> (Arc<FakeSource>, ValidatorDirectory) {
        let source = Arc::new(FakeSource {
            calls: AtomicUsize::new(0),
            bam_fails,
        });
        let directory = ValidatorDirectory::new(source.clone(), ttl);
        (source, directory)
    }

    #[tokio::test]
    async fn caches_within_ttl() {
        let (source, directory) = directory(false, Duration::from_secs(1800));
        let first = directory.snapshot().await;
        let second = directory.snapshot().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.software_client("bam"), AGAVE_BAM);
        assert_eq!(second.software_client("quiet"), HARMONIC);
    }

    #[tokio::test]
    async fn refreshes_after_ttl() {
        let (source, directory) = directory(false, Duration::from_secs(0));
        directory.snapshot().await;
        directory.snapshot().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bam_outage_degrades_overrides() {
        let (_, directory) = directory(true, Duration::from_secs(1800));
        let snapshot = directory.snapshot().await;
        assert_eq!(snapshot.software_client("bam"), "JitoLabs");
        assert_eq!(snapshot.validators.len(), 2);
    }
}
