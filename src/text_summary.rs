//! Text summary builder for CLI output.
//!
//! This module formats a rendered preview as aligned, human-readable lines for text mode.

use crate::render::{PreviewView, RowView};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn action_text(row: &RowView) -> &str {
    row.action.as_ref().map(|(_, a)| a.as_str()).unwrap_or("-")
}

/// Build a text summary from a rendered preview.
pub(crate) fn build_text_summary(view: &PreviewView) -> TextSummary {
    let mut lines = Vec::new();

    let summary = view
        .summary
        .fields()
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("  ");
    lines.push(summary);

    if view.rows.is_empty() {
        let note = if view.is_empty() {
            "(no preview)"
        } else {
            "(nothing to create)"
        };
        lines.push(note.into());
        return TextSummary { lines };
    }

    let folder_w = view
        .rows
        .iter()
        .map(|r| r.folder_name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Folder".len());
    let action_w = view
        .rows
        .iter()
        .map(|r| action_text(r).chars().count())
        .max()
        .unwrap_or(0)
        .max("Action".len());

    lines.push(format!(
        "{:<5}  {:<10}  {:<folder_w$}  {:<action_w$}  Path",
        "Kind", "Date", "Folder", "Action"
    ));
    for row in &view.rows {
        lines.push(format!(
            "{:<5}  {:<10}  {:<folder_w$}  {:<action_w$}  {}",
            row.kind.label(),
            row.date,
            row.folder_name,
            action_text(row),
            row.full_path
        ));
    }

    TextSummary { lines }
}
