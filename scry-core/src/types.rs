//! Core types for aggregated results and per-backend diagnostics.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Backend-assigned trust level for a single result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    /// The backend vouches for the match (exact hash hit, curated index).
    Confirmed,
    /// Plausible match; subject to the similarity threshold.
    Uncertain,
    /// The backend flagged the match as wrong. Never surfaced after merge.
    Rejected,
}

impl Mark {
    /// Sort rank: confirmed (3) > uncertain (2) > rejected (1).
    pub fn rank(self) -> u8 {
        match self {
            Self::Confirmed => 3,
            Self::Uncertain => 2,
            Self::Rejected => 1,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Confirmed => "confirmed",
            Self::Uncertain => "uncertain",
            Self::Rejected => "rejected",
        })
    }
}

/// How closely a result matches the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Similarity {
    /// Sentinel for an exact match; ranks above every numeric score.
    Exact,
    /// Numeric similarity. Larger is closer; the scale is backend-defined.
    Score(f64),
}

impl Similarity {
    /// Numeric value used for ordering and threshold checks.
    ///
    /// `Exact` maps to `+inf`; `NaN` scores map to `-inf` so a broken
    /// comparison never floats a result to the top.
    pub fn value(self) -> f64 {
        match self {
            Self::Exact => f64::INFINITY,
            Self::Score(v) if v.is_nan() => f64::NEG_INFINITY,
            Self::Score(v) => v,
        }
    }

    /// Returns `true` if this similarity meets `min`.
    pub fn meets(self, min: f64) -> bool {
        self.value() >= min
    }

    /// Total ordering over similarities (ascending).
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.value().total_cmp(&other.value())
    }

    /// Rounded to two decimals for display; `Exact` stays exact.
    pub fn rounded(self) -> Self {
        match self {
            Self::Score(v) => Self::Score((v * 100.0).round() / 100.0),
            Self::Exact => Self::Exact,
        }
    }
}

impl From<f64> for Similarity {
    fn from(value: f64) -> Self {
        Self::Score(value)
    }
}

impl Serialize for Similarity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Exact => serializer.serialize_str("exact"),
            Self::Score(v) => serializer.serialize_f64(*v),
        }
    }
}

/// One candidate result produced by a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultItem {
    /// Source page of the match.
    pub url: String,
    /// Thumbnail reference, usually a `file://` URL of a [`crate::TempArtifact`].
    pub thumbnail: String,
    /// Descriptive text (title, file name, episode).
    pub text: String,
    /// Similarity to the query.
    pub similarity: Similarity,
    /// Name of the backend that produced the result.
    pub engine: String,
    /// Icon URL of the backend.
    pub engine_icon: String,
    /// Backend-assigned trust level.
    pub mark: Mark,
    /// Whether the source URL can be handed to the link previewer.
    pub previewable: bool,
}

impl ResultItem {
    /// Creates an uncertain, non-previewable result.
    pub fn new(
        url: impl Into<String>,
        engine: impl Into<String>,
        similarity: impl Into<Similarity>,
    ) -> Self {
        Self {
            url: url.into(),
            thumbnail: String::new(),
            text: String::new(),
            similarity: similarity.into(),
            engine: engine.into(),
            engine_icon: String::new(),
            mark: Mark::Uncertain,
            previewable: false,
        }
    }

    /// Sets the thumbnail reference.
    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = thumbnail.into();
        self
    }

    /// Sets the descriptive text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Sets the engine icon URL.
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.engine_icon = icon.into();
        self
    }

    /// Sets the confidence mark.
    #[must_use]
    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.mark = mark;
        self
    }
}

/// Diagnostic record for one backend run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detail {
    /// Backend name.
    pub name: String,
    /// Number of results held after the run.
    pub count: usize,
    /// Wall-clock time spent in the backend.
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Success summary or the last captured error message.
    pub text: String,
    /// Whether the run captured at least one error.
    pub failed: bool,
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}
