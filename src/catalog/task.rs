//! Task model for SWE-bench style bug-fix instances.
//!
//! A task describes one reproducible bug: the repository and commit it lives
//! at, the problem statement shown to the participant agent, and the test
//! sets the harness replays to judge a candidate patch.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Known SWE-bench dataset variants hosted on HuggingFace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    /// SWE-bench_Lite, the small curated subset.
    Lite,
    /// SWE-bench_Verified, human-validated instances.
    Verified,
    /// The full SWE-bench test split.
    Full,
}

impl Dataset {
    /// HuggingFace dataset identifier for this variant.
    pub fn hf_name(&self) -> &'static str {
        match self {
            Dataset::Lite => "princeton-nlp/SWE-bench_Lite",
            Dataset::Verified => "princeton-nlp/SWE-bench_Verified",
            Dataset::Full => "princeton-nlp/SWE-bench",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Lite => write!(f, "lite"),
            Dataset::Verified => write!(f, "verified"),
            Dataset::Full => write!(f, "full"),
        }
    }
}

impl FromStr for Dataset {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lite" => Ok(Dataset::Lite),
            "verified" => Ok(Dataset::Verified),
            "full" => Ok(Dataset::Full),
            other => Err(CatalogError::UnknownDataset(other.to_string())),
        }
    }
}

/// A single bug-fix task drawn from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique instance identifier, e.g. "django__django-11099".
    pub task_id: String,
    /// Repository in "owner/name" form.
    pub repo: String,
    /// Commit the bug reproduces at. None means the default branch head.
    #[serde(default)]
    pub base_commit: Option<String>,
    /// Problem statement shown to the participant agent.
    pub problem_statement: String,
    /// Optional hints text from the issue discussion.
    #[serde(default)]
    pub hints: Option<String>,
    /// Tests that must flip from failing to passing.
    #[serde(default)]
    pub fail_to_pass: Vec<String>,
    /// Tests that must keep passing.
    #[serde(default)]
    pub pass_to_pass: Vec<String>,
    /// Dataset version tag, when known.
    #[serde(default)]
    pub version: Option<String>,
    /// Environment setup commit, when the dataset provides one.
    #[serde(default)]
    pub environment_setup_commit: Option<String>,
}

impl Task {
    /// Union of both test sets, deduplicated and sorted.
    ///
    /// This is the denominator for per-task test counts: every test the
    /// harness is expected to report on, whether or not it ran.
    pub fn expected_tests(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .fail_to_pass
            .iter()
            .chain(self.pass_to_pass.iter())
            .map(String::as_str)
            .collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Abbreviated base commit for display and prompts.
    ///
    /// Returns the first 12 characters of the commit SHA, or "latest" when
    /// the task has no pinned commit.
    pub fn short_base_commit(&self) -> &str {
        match &self.base_commit {
            Some(commit) => commit.get(..12).unwrap_or(commit),
            None => "latest",
        }
    }
}
