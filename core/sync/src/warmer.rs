//! Cache warmer for session start.
//!
//! Runs a configured list of prefetch jobs through the gateway so that
//! frequently-read collections are already cached before connectivity is
//! lost. Job failures are isolated; one unreachable collection never
//! aborts the rest of the pass.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use outpost_common::Result;

use crate::gateway::Gateway;

/// How a warm job scopes the rows it prefetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum WarmScope {
    /// Fetch the whole collection into its list view.
    All,
    /// Fetch only the current user's rows, filtered on the given field.
    ByUser { field: String },
}

/// A single collection to prefetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmJob {
    pub collection: String,
    #[serde(flatten)]
    pub scope: WarmScope,
}

impl WarmJob {
    pub fn all(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            scope: WarmScope::All,
        }
    }

    pub fn by_user(collection: &str, field: &str) -> Self {
        Self {
            collection: collection.to_string(),
            scope: WarmScope::ByUser {
                field: field.to_string(),
            },
        }
    }
}

/// Configuration for a warming pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarmerConfig {
    pub jobs: Vec<WarmJob>,
}

/// Outcome of a warming pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmReport {
    /// Collections successfully prefetched.
    pub warmed: Vec<String>,
    /// Collections that could not be fetched, with the error text.
    pub failed: Vec<(String, String)>,
}

/// Prefetches configured collections through the gateway.
pub struct Warmer {
    gateway: Arc<Gateway>,
    config: WarmerConfig,
}

impl Warmer {
    pub fn new(gateway: Arc<Gateway>, config: WarmerConfig) -> Self {
        Self { gateway, config }
    }

    /// Run every configured job, scoping user-bound jobs to `user_id`.
    ///
    /// User-scoped jobs are skipped when no user id is given. Always
    /// returns a report; per-job failures are collected, not propagated.
    pub async fn warm(&self, user_id: Option<&str>) -> Result<WarmReport> {
        let mut report = WarmReport {
            warmed: Vec::new(),
            failed: Vec::new(),
        };

        for job in &self.config.jobs {
            let filter = match &job.scope {
                WarmScope::All => None,
                WarmScope::ByUser { field } => match user_id {
                    Some(id) => {
                        let mut criteria = Map::new();
                        criteria.insert(field.clone(), Value::String(id.to_string()));
                        Some(Value::Object(criteria))
                    }
                    None => {
                        debug!(
                            collection = %job.collection,
                            "Skipping user-scoped warm job without a user"
                        );
                        continue;
                    }
                },
            };

            match self.gateway.select(&job.collection, filter).await {
                Ok(response) => {
                    debug!(
                        collection = %job.collection,
                        offline = response.offline,
                        "Warmed collection"
                    );
                    report.warmed.push(job.collection.clone());
                }
                Err(e) => {
                    warn!(collection = %job.collection, "Warm job failed: {}", e);
                    report.failed.push((job.collection.clone(), e.to_string()));
                }
            }
        }

        info!(
            warmed = report.warmed.len(),
            failed = report.failed.len(),
            "Cache warming pass finished"
        );
        Ok(report)
    }
}
