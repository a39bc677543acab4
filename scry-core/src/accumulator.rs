//! Per-request result accumulation, diagnostics and merging.
//!
//! An [`Accumulator`] is created for each backend run, filled by
//! [`Accumulator::record`], merged with its peers into one aggregate and
//! finally consumed by [`Accumulator::render`]. It owns the temporary
//! artifacts its results point at, so dropping or rendering it releases
//! them.

use std::future::Future;

use tokio::time::Instant;

use crate::artifact::{ArtifactSet, TempArtifact};
use crate::error::BackendError;
use crate::rank::{compare_details, compare_similarity, rank_results};
use crate::task::Task;
use crate::types::{Detail, ResultItem};

/// What a single backend run produces: results plus the artifacts they use.
#[derive(Debug, Default)]
pub struct Harvest {
    /// Candidate results in backend order.
    pub results: Vec<ResultItem>,
    /// Thumbnails or media the results reference.
    pub artifacts: ArtifactSet,
}

impl Harvest {
    /// Creates an empty harvest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a result and, if present, the artifact backing its thumbnail.
    pub fn push(&mut self, item: ResultItem, artifact: Option<TempArtifact>) {
        self.results.push(item);
        if let Some(artifact) = artifact {
            self.artifacts.push(artifact);
        }
    }

    /// Number of results collected.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Limits applied by the most recent [`Accumulator::merge`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeLimits {
    /// Minimum similarity for uncertain results.
    pub min_similarity: f64,
    /// Maximum number of results kept.
    pub max_count: usize,
}

/// Mutable per-request state collecting results, diagnostics and artifacts.
#[derive(Debug, Default)]
pub struct Accumulator {
    results: Vec<ResultItem>,
    details: Vec<Detail>,
    artifacts: ArtifactSet,
    errors: Vec<BackendError>,
    limits: Option<MergeLimits>,
}

impl Accumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a prepared task and records its outcome in a fresh accumulator.
    pub async fn run(task: Task<Harvest>) -> Self {
        let mut acc = Self::new();
        let label = task.label().to_owned();
        acc.record(&label, task.execute()).await;
        acc
    }

    /// Records an error without aborting anything.
    pub fn capture(&mut self, error: BackendError) {
        tracing::debug!(error = %error, "backend error captured");
        self.errors.push(error);
    }

    /// Times `work`, folds its harvest in or captures its error, and
    /// appends a diagnostic record for `name`.
    ///
    /// Results are re-sorted by similarity (descending) afterwards.
    pub async fn record<F>(&mut self, name: &str, work: F)
    where
        F: Future<Output = Result<Harvest, BackendError>>,
    {
        let started = Instant::now();
        tracing::debug!(engine = name, "backend started");

        match work.await {
            Ok(mut harvest) => {
                self.results.append(&mut harvest.results);
                self.artifacts.append(&mut harvest.artifacts);
            }
            Err(err) => {
                tracing::warn!(engine = name, error = %err, "backend failed");
                self.capture(err);
            }
        }

        let elapsed = started.elapsed();
        self.results.sort_by(compare_similarity);

        let count = self.results.len();
        let text = match self.errors.last() {
            Some(err) => format!("{name}: {err}"),
            None => format!("{name}: Got {count} result(s)"),
        };
        tracing::debug!(
            engine = name,
            count,
            elapsed_ms = elapsed.as_millis() as u64,
            "backend finished"
        );
        self.details.push(Detail {
            name: name.to_owned(),
            count,
            elapsed,
            text,
            failed: !self.errors.is_empty(),
        });
    }

    /// Combines this accumulator with `others`.
    ///
    /// 1. Concatenate results, details, errors and artifacts
    /// 2. Sort results by (mark rank, similarity) descending
    /// 3. Sort details by elapsed time ascending
    /// 4. Drop rejected results and uncertain ones below `min_similarity`
    /// 5. Truncate to `max_count`
    ///
    /// The output does not depend on the order of `others`.
    #[must_use]
    pub fn merge(mut self, others: Vec<Accumulator>, min_similarity: f64, max_count: usize) -> Self {
        for mut other in others {
            self.results.append(&mut other.results);
            self.details.append(&mut other.details);
            self.errors.append(&mut other.errors);
            self.artifacts.append(&mut other.artifacts);
        }

        rank_results(&mut self.results, min_similarity, max_count);
        self.details.sort_by(compare_details);
        self.limits = Some(MergeLimits {
            min_similarity,
            max_count,
        });
        self
    }

    /// Merges a list of accumulators. Returns an empty accumulator for an
    /// empty list.
    #[must_use]
    pub fn merge_all(mut all: Vec<Accumulator>, min_similarity: f64, max_count: usize) -> Self {
        let base = all.pop().unwrap_or_default();
        base.merge(all, min_similarity, max_count)
    }

    /// Current results.
    pub fn results(&self) -> &[ResultItem] {
        &self.results
    }

    /// Mutable access for post-merge annotation (e.g. preview flags).
    pub fn results_mut(&mut self) -> &mut [ResultItem] {
        &mut self.results
    }

    /// Current diagnostic records.
    pub fn details(&self) -> &[Detail] {
        &self.details
    }

    /// Errors captured so far.
    pub fn errors(&self) -> &[BackendError] {
        &self.errors
    }

    /// Artifacts owned by this accumulator.
    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    /// Limits from the last merge, if any.
    pub fn limits(&self) -> Option<MergeLimits> {
        self.limits
    }
}
