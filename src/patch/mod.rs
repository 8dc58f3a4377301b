//! Patch extraction from free-form agent replies.
//!
//! Participant agents answer with arbitrary text and are asked to wrap their
//! candidate fix in a `<patch>...</patch>` region. This module finds that
//! region and turns it into a typed [`Patch`], or reports that the reply
//! contains no usable patch. Absence of a patch is a value, not an error:
//! the scheduler maps it to an apply failure for that job.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Tag name delimiting the patch region in an agent reply.
pub const PATCH_TAG: &str = "patch";

/// Markers that identify unified-diff content.
const DIFF_MARKERS: [&str; 4] = ["diff --git", "--- ", "+++ ", "@@ "];

/// Where a candidate patch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchSource {
    /// Extracted from a participant agent reply.
    Agent,
    /// Supplied directly, e.g. a gold patch or a test fixture.
    Fixture,
}

impl fmt::Display for PatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchSource::Agent => write!(f, "agent"),
            PatchSource::Fixture => write!(f, "fixture"),
        }
    }
}

/// A candidate unified-diff patch with its provenance.
///
/// The diff text is opaque to the orchestrator; only the harness judges
/// whether it applies. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Task this patch targets.
    pub task_id: String,
    /// Unified-diff text, trimmed of surrounding whitespace.
    pub content: String,
    /// Provenance of the diff text.
    pub source: PatchSource,
}

impl Patch {
    /// Wrap a directly supplied diff, bypassing extraction.
    pub fn fixture(task_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            content: content.into(),
            source: PatchSource::Fixture,
        }
    }
}

/// Extract a candidate patch from a raw agent reply.
///
/// Only the first `<patch>` region is considered; later regions are ignored
/// so that a rambling reply cannot change the verdict depending on scan
/// order. Returns `None` when the reply has no region, the region is empty,
/// or its content does not look like a diff.
pub fn extract(task_id: &str, raw: &str) -> Option<Patch> {
    let content = extract_tagged(raw, PATCH_TAG)?;
    if !looks_like_diff(&content) {
        return None;
    }
    Some(Patch {
        task_id: task_id.to_string(),
        content,
        source: PatchSource::Agent,
    })
}

/// Extract the first `<tag>...</tag>` region from text.
///
/// The region may span lines. Content is trimmed; a whitespace-only region
/// yields `None`. `tag` must be a plain identifier.
pub fn extract_tagged(text: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!(r"<{tag}>([\s\S]*?)</{tag}>")).ok()?;
    let caps = re.captures(text)?;
    let content = caps.get(1)?.as_str().trim();
    if content.is_empty() {
        return None;
    }
    Some(content.to_string())
}

/// Whether the text carries any unified-diff marker.
pub fn looks_like_diff(text: &str) -> bool {
    DIFF_MARKERS.iter().any(|marker| text.contains(marker))
}
