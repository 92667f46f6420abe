//! Pure mapping from backend plan items to display rows.

use crate::model::{PlanItem, Summary};
use serde::Serialize;

pub const PLACEHOLDER: &str = "-";

/// Folder level of a row. Kinds the client does not know are shown as sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Year,
    Month,
    Day,
    Other(String),
}

impl ItemKind {
    pub fn label(&self) -> &str {
        match self {
            ItemKind::Year => "Year",
            ItemKind::Month => "Month",
            ItemKind::Day => "Day",
            ItemKind::Other(s) => s,
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "Year" => ItemKind::Year,
            "Month" => ItemKind::Month,
            "Day" => ItemKind::Day,
            other => ItemKind::Other(other.to_string()),
        }
    }

    /// Infer the kind from the legacy free-text result column.
    fn infer(result: &str) -> Self {
        if result.contains("Year") {
            ItemKind::Year
        } else if result.contains("Month") {
            ItemKind::Month
        } else {
            ItemKind::Day
        }
    }
}

impl Serialize for ItemKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Badge {
    Create,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowView {
    pub kind: ItemKind,
    pub date: String,
    pub folder_name: String,
    /// Badge style plus the action text shown in it.
    pub action: Option<(Badge, String)>,
    pub full_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub days: String,
    pub total: String,
    pub create: String,
    pub skip: String,
}

impl SummaryView {
    pub fn placeholder() -> Self {
        Self {
            days: PLACEHOLDER.into(),
            total: PLACEHOLDER.into(),
            create: PLACEHOLDER.into(),
            skip: PLACEHOLDER.into(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder()
    }

    pub fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("days", self.days.as_str()),
            ("total", self.total.as_str()),
            ("create", self.create.as_str()),
            ("skip", self.skip.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewView {
    pub rows: Vec<RowView>,
    pub summary: SummaryView,
}

impl Default for PreviewView {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            summary: SummaryView::placeholder(),
        }
    }
}

impl PreviewView {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.summary.is_placeholder()
    }
}

/// First ten characters of the backend date, i.e. `YYYY-MM-DD` out of an ISO timestamp.
fn day_text(date: &str) -> String {
    date.chars().take(10).collect()
}

fn action_of(item: &PlanItem) -> Option<String> {
    if let Some(a) = item.action.as_deref().filter(|a| !a.is_empty()) {
        return Some(a.to_string());
    }
    let result = item.result.as_deref().unwrap_or("");
    if result.starts_with("Created") {
        Some("Create".into())
    } else if result.starts_with("Skipped") {
        Some("Skip".into())
    } else {
        None
    }
}

pub fn render_row(item: &PlanItem) -> RowView {
    let kind = item
        .kind
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(ItemKind::parse)
        .unwrap_or_else(|| ItemKind::infer(item.result.as_deref().unwrap_or("")));
    let action = action_of(item).map(|a| {
        let badge = if a == "Create" {
            Badge::Create
        } else {
            Badge::Skip
        };
        (badge, a)
    });
    RowView {
        kind,
        date: item.date.as_deref().map(day_text).unwrap_or_default(),
        folder_name: item.folder_name.clone().unwrap_or_default(),
        action,
        full_path: item.full_path.clone().unwrap_or_default(),
    }
}

pub fn render_summary(summary: Option<&Summary>) -> SummaryView {
    match summary {
        None => SummaryView::placeholder(),
        Some(s) => SummaryView {
            days: s
                .days
                .map(|d| d.to_string())
                .unwrap_or_else(|| PLACEHOLDER.into()),
            total: s.total.to_string(),
            create: s.create.to_string(),
            skip: s.skip.to_string(),
        },
    }
}

/// Build the whole view. No items and no summary yields the placeholder view.
pub fn render_view(items: &[PlanItem], summary: Option<&Summary>) -> PreviewView {
    PreviewView {
        rows: items.iter().map(render_row).collect(),
        summary: render_summary(summary),
    }
}
