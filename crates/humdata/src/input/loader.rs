//! Source loader: reads extracts from disk or HTTP, with bounded retries.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::outcome::{LoadError, LoadOutcome};
use super::parser::Parser;
use super::source::{Location, SourceDescriptor};

/// Timeout and retry settings for source loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadPolicy {
    /// Upper bound for one attempt, in seconds.
    pub timeout_secs: u64,
    /// Extra attempts after the first for transient failures.
    pub retries: u32,
    /// Base delay between attempts, doubled each time, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 2,
            backoff_ms: 250,
        }
    }
}

impl LoadPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Delay before attempt `attempt` (1-based retry count), with up to 20%
    /// random jitter so parallel retries do not align.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
        let jitter = if base > 0 { fastrand::u64(0..=base / 5) } else { 0 };
        Duration::from_millis(base + jitter)
    }
}

/// Loads source extracts.
///
/// Cloning is cheap; clones share the organisation registry.
#[derive(Debug, Clone)]
pub struct SourceLoader {
    organizations: Arc<IndexMap<String, String>>,
    policy: LoadPolicy,
}

impl SourceLoader {
    /// Create a loader with default policy and no organisation registry.
    pub fn new() -> Self {
        Self::with_policy(IndexMap::new(), LoadPolicy::default())
    }

    /// Create a loader with an organisation registry (source_key → org) used
    /// when a provenance header omits `source_org`.
    pub fn with_policy(organizations: IndexMap<String, String>, policy: LoadPolicy) -> Self {
        Self {
            organizations: Arc::new(organizations),
            policy,
        }
    }

    pub fn policy(&self) -> &LoadPolicy {
        &self.policy
    }

    /// Load one source with a single blocking attempt.
    ///
    /// Remote reads are bounded by the policy timeout through the HTTP
    /// client. Never fails: problems are reported inside the outcome.
    pub fn load(&self, descriptor: &SourceDescriptor) -> LoadOutcome {
        self.attempt(descriptor, 1)
    }

    fn attempt(&self, descriptor: &SourceDescriptor, attempts: u32) -> LoadOutcome {
        let bytes = match self.fetch(&descriptor.location, attempts) {
            Ok(bytes) => bytes,
            Err(error) => return LoadOutcome::failed(descriptor.clone(), error, attempts),
        };
        let fingerprint = Some(fingerprint(&bytes));

        let parser = Parser::new(descriptor, &self.organizations);
        match parser.parse_bytes(&bytes) {
            Ok(parsed) => {
                log::debug!(
                    "loaded source '{}': {} row(s), provenance: {}",
                    descriptor.name,
                    parsed.table.row_count(),
                    parsed.provenance.is_some()
                );
                LoadOutcome {
                    descriptor: descriptor.clone(),
                    result: Ok(parsed.table),
                    provenance: parsed.provenance,
                    fingerprint,
                    attempts,
                }
            }
            Err(error) => LoadOutcome {
                fingerprint,
                ..LoadOutcome::failed(descriptor.clone(), error, attempts)
            },
        }
    }

    fn fetch(&self, location: &Location, attempts: u32) -> Result<Vec<u8>, LoadError> {
        match location {
            Location::Path(path) => read_file(path),
            Location::Url(url) => self.fetch_url(url, attempts),
        }
    }

    fn fetch_url(&self, url: &str, attempts: u32) -> Result<Vec<u8>, LoadError> {
        // Built per call so the blocking client is created and dropped on the
        // worker thread, never inside the async runtime.
        let client = Client::builder()
            .timeout(self.policy.timeout())
            .build()
            .map_err(|e| LoadError::Unavailable {
                reason: e.to_string(),
            })?;

        let response = client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                LoadError::TimedOut {
                    attempts,
                    timeout: self.policy.timeout(),
                }
            } else {
                LoadError::Unavailable {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Err(LoadError::ResourceNotFound {
                location: url.to_string(),
                reason: status.to_string(),
            });
        }
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(LoadError::Unavailable {
                reason: status.to_string(),
            });
        }
        if !status.is_success() {
            return Err(LoadError::ResourceNotFound {
                location: url.to_string(),
                reason: status.to_string(),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| LoadError::Unavailable {
                reason: e.to_string(),
            })
    }

    /// Load every source in parallel on the tokio runtime.
    ///
    /// Each attempt runs on a blocking worker bounded by the policy timeout;
    /// transient failures are retried with jittered exponential backoff.
    /// Outcomes are returned in descriptor order.
    pub async fn load_all(&self, descriptors: &[SourceDescriptor]) -> Vec<LoadOutcome> {
        let handles: Vec<_> = descriptors
            .iter()
            .cloned()
            .map(|descriptor| {
                let loader = self.clone();
                tokio::spawn(async move { loader.load_with_retry(descriptor).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, descriptor) in handles.into_iter().zip(descriptors) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => LoadOutcome::failed(
                    descriptor.clone(),
                    LoadError::corrupt(format!("loader task failed: {}", e)),
                    0,
                ),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn load_with_retry(&self, descriptor: SourceDescriptor) -> LoadOutcome {
        let timeout = self.policy.timeout();
        let max_attempts = self.policy.retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let loader = self.clone();
            let task_descriptor = descriptor.clone();
            let task = tokio::task::spawn_blocking(move || loader.attempt(&task_descriptor, attempt));

            let outcome = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => LoadOutcome::failed(
                    descriptor.clone(),
                    LoadError::corrupt(format!("loader task failed: {}", e)),
                    attempt,
                ),
                Err(_) => LoadOutcome::failed(
                    descriptor.clone(),
                    LoadError::TimedOut {
                        attempts: attempt,
                        timeout,
                    },
                    attempt,
                ),
            };

            let retry = outcome.error().is_some_and(LoadError::is_transient) && attempt < max_attempts;
            if !retry {
                if let Some(error) = outcome.error() {
                    log::warn!(
                        "source '{}' unavailable after {} attempt(s): {}",
                        descriptor.name,
                        attempt,
                        error
                    );
                }
                return outcome;
            }

            let delay = self.policy.backoff(attempt);
            log::debug!(
                "retrying source '{}' in {:?} (attempt {} of {})",
                descriptor.name,
                delay,
                attempt + 1,
                max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for SourceLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => LoadError::ResourceNotFound {
            location: path.display().to_string(),
            reason: e.to_string(),
        },
        ErrorKind::TimedOut | ErrorKind::Interrupted | ErrorKind::WouldBlock => {
            LoadError::Unavailable {
                reason: e.to_string(),
            }
        }
        _ => LoadError::corrupt(format!("cannot read {}: {}", path.display(), e)),
    })
}

/// SHA-256 of the extract bytes, prefixed with the algorithm.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}
