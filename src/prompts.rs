//! Prompt fragments appended to the caller's segmentation prompt.
//!
//! The caller owns the task description ("find every derivation and
//! question"). This module only adds what the pipeline itself is responsible
//! for: how to read the page markers, and how to shape the answer so it
//! decodes into the caller's unit type.

use crate::geometry::Anchor;

/// Explain the circled page markers for the given anchor corner.
///
/// Markers show 0-based indices while ranges are reported 1-based, so the
/// instruction spells out the +1.
pub fn page_index_instructions(anchor: Anchor) -> String {
    format!(
        "Page indexing:\n\
         - Every page is annotated with a circled number in the {} corner.\n\
         - The circled number is the zero-based page index: the first page shows 0.\n\
         - Use the circled number as the authoritative page reference.\n\
         - Report page ranges as 1-based page numbers: start_page and end_page are \
           the circled numbers plus one, both inclusive.",
        anchor.as_str().replace('-', " ")
    )
}

/// Output contract for JSON-speaking oracles.
pub const JSON_OUTPUT_INSTRUCTIONS: &str = r#"Output format:
- Respond with a single JSON object of the form {"items": [ ... ]}.
- Each item must include "page_range": {"start_page": <int>, "end_page": <int>}.
- List items in the order they appear in the document.
- Output ONLY the JSON object. Do NOT add commentary or markdown fences."#;

/// Full user prompt: caller task, marker explanation, output contract.
pub fn build_segmentation_prompt(task: &str, anchor: Anchor) -> String {
    format!(
        "{}\n\n{}\n\n{}",
        task.trim(),
        page_index_instructions(anchor),
        JSON_OUTPUT_INSTRUCTIONS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_name_the_corner() {
        let s = page_index_instructions(Anchor::BottomLeft);
        assert!(s.contains("bottom left corner"));
        assert!(s.contains("plus one"));
    }

    #[test]
    fn prompt_keeps_task_first() {
        let p = build_segmentation_prompt("  Find the questions.  ", Anchor::TopRight);
        assert!(p.starts_with("Find the questions."));
        assert!(p.contains("top right"));
        assert!(p.ends_with("markdown fences."));
    }
}
