//! Form state, payload snapshots and pre-flight validation.

use crate::model::{FormPayload, Mode};
use time::macros::format_description;
use time::Date;

/// Raw text of every input field, exactly as the user typed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub base_path: String,
    pub mode: Mode,
    pub start_date: String,
    pub end_date: String,
    pub days_to_make: String,
    pub folders_per_day: String,
    pub first_day_start_index: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    BasePath,
    Mode,
    StartDate,
    EndDate,
    DaysToMake,
    FoldersPerDay,
    FirstDayStartIndex,
}

impl FormField {
    pub fn label(self) -> &'static str {
        match self {
            FormField::BasePath => "Base path",
            FormField::Mode => "Mode",
            FormField::StartDate => "Start date",
            FormField::EndDate => "End date",
            FormField::DaysToMake => "Days",
            FormField::FoldersPerDay => "Folders per day",
            FormField::FirstDayStartIndex => "First-day start index",
        }
    }
}

/// Format a date the way the date inputs and the backend expect it.
pub fn iso_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

impl FormState {
    /// Range mode from `today` to two days later, five folders per day starting at 1.
    pub fn with_defaults(today: Date) -> Self {
        let end = today.saturating_add(time::Duration::days(2));
        Self {
            base_path: String::new(),
            mode: Mode::Range,
            start_date: iso_date(today),
            end_date: iso_date(end),
            days_to_make: "3".into(),
            folders_per_day: "5".into(),
            first_day_start_index: "1".into(),
        }
    }

    /// Fields shown for the current mode, in display order.
    pub fn visible_fields(&self) -> Vec<FormField> {
        let mut fields = vec![FormField::BasePath, FormField::Mode, FormField::StartDate];
        match self.mode {
            Mode::Range => fields.push(FormField::EndDate),
            Mode::Days => fields.push(FormField::DaysToMake),
        }
        fields.push(FormField::FoldersPerDay);
        fields.push(FormField::FirstDayStartIndex);
        fields
    }

    pub fn text(&self, field: FormField) -> &str {
        match field {
            FormField::BasePath => &self.base_path,
            FormField::Mode => self.mode.label(),
            FormField::StartDate => &self.start_date,
            FormField::EndDate => &self.end_date,
            FormField::DaysToMake => &self.days_to_make,
            FormField::FoldersPerDay => &self.folders_per_day,
            FormField::FirstDayStartIndex => &self.first_day_start_index,
        }
    }

    /// Editable text behind a field; the mode toggle has none.
    pub fn text_mut(&mut self, field: FormField) -> Option<&mut String> {
        match field {
            FormField::BasePath => Some(&mut self.base_path),
            FormField::Mode => None,
            FormField::StartDate => Some(&mut self.start_date),
            FormField::EndDate => Some(&mut self.end_date),
            FormField::DaysToMake => Some(&mut self.days_to_make),
            FormField::FoldersPerDay => Some(&mut self.folders_per_day),
            FormField::FirstDayStartIndex => Some(&mut self.first_day_start_index),
        }
    }

    /// Snapshot the form into a request payload. Never fails.
    pub fn read_payload(&self) -> FormPayload {
        let end_date = self.end_date.trim();
        FormPayload {
            base_path: self.base_path.trim().to_string(),
            mode: self.mode,
            start_date: self.start_date.trim().to_string(),
            end_date: (!end_date.is_empty()).then(|| end_date.to_string()),
            days_to_make: parse_leading_int(&self.days_to_make),
            folders_per_day: parse_leading_int(&self.folders_per_day),
            first_day_start_index: parse_leading_int(&self.first_day_start_index),
        }
    }
}

/// Parse an optional sign followed by leading decimal digits, ignoring trailing text.
///
/// `"12abc"` is 12; `""`, `"abc"` and `"-"` are `None`.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Violation {
    MissingBasePath,
    MissingStartDate,
    MissingEndDate,
    InvalidDayCount,
    InvalidFoldersPerDay,
    InvalidStartIndex,
}

impl Violation {
    fn message(self) -> &'static str {
        match self {
            Violation::MissingBasePath => "Enter a base path",
            Violation::MissingStartDate => "Enter a start date",
            Violation::MissingEndDate => "Enter an end date",
            Violation::InvalidDayCount => "Day count must be 1 or greater",
            Violation::InvalidFoldersPerDay => "Folders per day must be 1 or greater",
            Violation::InvalidStartIndex => "First-day start index must be 1 or greater",
        }
    }
}

fn at_least_one(v: Option<i64>) -> bool {
    matches!(v, Some(n) if n >= 1)
}

fn violations(p: &FormPayload) -> impl Iterator<Item = Violation> + '_ {
    let checks: [(Violation, fn(&FormPayload) -> bool); 6] = [
        (Violation::MissingBasePath, |p| p.base_path.is_empty()),
        (Violation::MissingStartDate, |p| p.start_date.is_empty()),
        (Violation::MissingEndDate, |p| {
            p.mode == Mode::Range && p.end_date.is_none()
        }),
        (Violation::InvalidDayCount, |p| {
            p.mode == Mode::Days && !at_least_one(p.days_to_make)
        }),
        (Violation::InvalidFoldersPerDay, |p| {
            !at_least_one(p.folders_per_day)
        }),
        (Violation::InvalidStartIndex, |p| {
            !at_least_one(p.first_day_start_index)
        }),
    ];
    checks
        .into_iter()
        .filter(move |(_, violated)| violated(p))
        .map(|(v, _)| v)
}

/// Messages for every violated payload invariant. Empty means the payload may be sent.
pub fn validate(payload: &FormPayload) -> Vec<String> {
    violations(payload).map(|v| v.message().to_string()).collect()
}

/// Whether an automatic preview may fire. Same checks as [`validate`], no messages.
pub fn can_auto_preview(payload: &FormPayload) -> bool {
    violations(payload).next().is_none()
}
