//! Strategies selecting which findings count toward evaluation.

use std::fmt::Debug;
use std::sync::Arc;

use super::finding::Finding;
use super::misuse::Misuse;

/// Decides whether a finding is scored.
pub trait FindingsFilter: Debug + Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns true if the finding should be evaluated.
    fn applies(&self, finding: &Finding) -> bool;

    /// Keeps the applicable findings, preserving order.
    fn filter(&self, findings: Vec<Finding>) -> Vec<Finding> {
        findings.into_iter().filter(|f| self.applies(f)).collect()
    }
}

/// Accepts every finding.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFindings;

impl FindingsFilter for AllFindings {
    fn name(&self) -> &str {
        "all"
    }

    fn applies(&self, _finding: &Finding) -> bool {
        true
    }
}

/// Accepts findings at or above a confidence threshold.
///
/// Findings without a confidence are accepted.
#[derive(Debug, Clone, Copy)]
pub struct MinConfidence(pub f64);

impl FindingsFilter for MinConfidence {
    fn name(&self) -> &str {
        "min-confidence"
    }

    fn applies(&self, finding: &Finding) -> bool {
        finding.confidence.map_or(true, |c| c >= self.0)
    }
}

/// Accepts findings located in a file that contains a known misuse.
#[derive(Debug, Clone)]
pub struct PotentialHits {
    files: Vec<String>,
}

impl PotentialHits {
    pub fn new(misuses: &[Arc<Misuse>]) -> Self {
        Self {
            files: misuses.iter().map(|m| m.location.file.clone()).collect(),
        }
    }
}

impl FindingsFilter for PotentialHits {
    fn name(&self) -> &str {
        "potential-hits"
    }

    fn applies(&self, finding: &Finding) -> bool {
        self.files.iter().any(|file| same_file(&finding.file, file))
    }
}

/// Accepts findings that every member filter accepts.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn FindingsFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl FindingsFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl FindingsFilter for FilterChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn applies(&self, finding: &Finding) -> bool {
        self.filters.iter().all(|f| f.applies(finding))
    }
}

/// Builds the filter for one execution from the configured options.
pub fn build_filter(
    min_confidence: Option<f64>,
    potential_hits: bool,
    misuses: &[Arc<Misuse>],
) -> Arc<dyn FindingsFilter> {
    let mut chain = FilterChain::new();
    if let Some(threshold) = min_confidence {
        chain = chain.with(MinConfidence(threshold));
    }
    if potential_hits {
        chain = chain.with(PotentialHits::new(misuses));
    }

    if chain.is_empty() {
        Arc::new(AllFindings)
    } else {
        Arc::new(chain)
    }
}

/// Compares source paths reported relative to different roots.
///
/// `src/main/java/a/B.java` and `a/B.java` name the same file; `xa/B.java`
/// and `a/B.java` do not.
pub fn same_file(left: &str, right: &str) -> bool {
    let left = left.replace('\\', "/");
    let right = right.replace('\\', "/");
    let left = left.trim_start_matches("./");
    let right = right.trim_start_matches("./");
    if left.is_empty() || right.is_empty() {
        return false;
    }

    let (long, short) = if left.len() >= right.len() {
        (left, right)
    } else {
        (right, left)
    };
    long == short || long.ends_with(&format!("/{short}"))
}
