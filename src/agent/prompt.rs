//! Prompt construction for participant agents.
//!
//! The prompt is byte-stable for a given task: repeated runs send the
//! identical message, so differences in agent replies are attributable to
//! the agent, not to us.

use crate::catalog::Task;

/// Instructions appended to every task prompt.
const PATCH_INSTRUCTIONS: &str = "
Please analyze this issue and provide a fix as a unified diff patch.
Wrap your patch in <patch>...</patch> tags.

Example format:
<patch>
diff --git a/path/to/file.py b/path/to/file.py
--- a/path/to/file.py
+++ b/path/to/file.py
@@ -10,6 +10,7 @@
 existing line
+new line to fix the bug
 another existing line
</patch>
";

/// Render the outbound message for one task.
///
/// Task fields are embedded in tagged blocks mirroring the reply grammar:
/// `<task_id>`, `<repository>`, `<base_commit>` (abbreviated to 12
/// characters, or `latest` when the task pins no commit),
/// `<problem_statement>`, and `<hints>` when the dataset carries hints.
pub fn build_task_prompt(task: &Task) -> String {
    let mut prompt = format!(
        "You are a software engineer tasked with fixing a bug in an open source project.\n\n\
<task_id>{}</task_id>\n\n\
<repository>{}</repository>\n\n\
<base_commit>{}</base_commit>\n\n\
<problem_statement>\n{}\n</problem_statement>\n",
        task.task_id,
        task.repo,
        task.short_base_commit(),
        task.problem_statement
    );

    if let Some(hints) = &task.hints {
        prompt.push_str(&format!("\n<hints>\n{}\n</hints>\n", hints));
    }

    prompt.push_str(PATCH_INSTRUCTIONS);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::extract_tagged;

    fn sample_task() -> Task {
        Task {
            task_id: "sympy__sympy-20590".to_string(),
            repo: "sympy/sympy".to_string(),
            base_commit: Some("cffd4e0f86fefd4802349a9f9b19ed70934ea354".to_string()),
            problem_statement: "Symbol instances have a __dict__ since 1.7".to_string(),
            hints: None,
            fail_to_pass: vec!["test_immutable".to_string()],
            pass_to_pass: Vec::new(),
            version: None,
            environment_setup_commit: None,
        }
    }

    #[test]
    fn test_prompt_structure() {
        let prompt = build_task_prompt(&sample_task());

        assert!(prompt.starts_with(
            "You are a software engineer tasked with fixing a bug in an open source project."
        ));
        assert_eq!(
            extract_tagged(&prompt, "task_id").as_deref(),
            Some("sympy__sympy-20590")
        );
        assert_eq!(
            extract_tagged(&prompt, "repository").as_deref(),
            Some("sympy/sympy")
        );
        assert_eq!(
            extract_tagged(&prompt, "base_commit").as_deref(),
            Some("cffd4e0f86fe")
        );
        assert!(prompt.contains("<problem_statement>\nSymbol instances have a __dict__ since 1.7\n</problem_statement>"));
        assert!(prompt.contains("Wrap your patch in <patch>...</patch> tags."));
    }

    #[test]
    fn test_prompt_omits_hints_when_absent() {
        let prompt = build_task_prompt(&sample_task());
        assert!(!prompt.contains("<hints>"));
    }

    #[test]
    fn test_prompt_includes_hints_when_present() {
        let mut task = sample_task();
        task.hints = Some("Check Basic.__slots__".to_string());
        let prompt = build_task_prompt(&task);
        assert_eq!(
            extract_tagged(&prompt, "hints").as_deref(),
            Some("Check Basic.__slots__")
        );
    }

    #[test]
    fn test_prompt_unpinned_commit_reads_latest() {
        let mut task = sample_task();
        task.base_commit = None;
        let prompt = build_task_prompt(&task);
        assert_eq!(extract_tagged(&prompt, "base_commit").as_deref(), Some("latest"));
    }

    #[test]
    fn test_prompt_is_byte_stable() {
        let task = sample_task();
        assert_eq!(build_task_prompt(&task), build_task_prompt(&task));
    }
}
