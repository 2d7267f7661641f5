use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::records::{MissingFieldError, RecordError};

pub const NOTICE_CODE_MISSING_REQUIRED_FIELD: &str = "missing_required_field";
pub const NOTICE_CODE_INVALID_FIELD_VALUE: &str = "invalid_field_value";
pub const NOTICE_CODE_FOREIGN_KEY_VIOLATION: &str = "foreign_key_violation";
pub const NOTICE_CODE_DUPLICATE_KEY: &str = "duplicate_key";
pub const NOTICE_CODE_MALFORMED_ROW: &str = "malformed_row";
pub const NOTICE_CODE_DEFAULT_APPLIED: &str = "default_value_applied";

/// Notices kept per file before further ones are only counted.
pub const MAX_NOTICES_PER_FILE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportNotice {
    pub code: String,
    pub severity: NoticeSeverity,
    pub message: String,
    pub file: Option<String>,
    pub row: Option<u64>,
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
}

impl ImportNotice {
    pub fn new(
        code: impl Into<String>,
        severity: NoticeSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            file: None,
            row: None,
            field: None,
            context: BTreeMap::new(),
        }
    }

    pub fn missing_field(error: &MissingFieldError) -> Self {
        ImportNotice::new(
            NOTICE_CODE_MISSING_REQUIRED_FIELD,
            NoticeSeverity::Warning,
            "required field is empty, row skipped",
        )
        .with_location(error.file, error.field, error.row)
    }

    pub fn from_record_error(file: &str, error: &RecordError) -> Self {
        match error {
            RecordError::MissingField(missing) => Self::missing_field(missing),
            RecordError::Malformed { row, message } => {
                let mut notice = ImportNotice::new(
                    NOTICE_CODE_MALFORMED_ROW,
                    NoticeSeverity::Warning,
                    "row could not be decoded, row skipped",
                );
                notice.file = Some(file.to_string());
                notice.row = Some(*row);
                notice.insert_context_field("message", message);
                notice
            }
        }
    }

    pub fn invalid_value(file: &str, field: &str, row: u64, value: &str) -> Self {
        ImportNotice::new(
            NOTICE_CODE_INVALID_FIELD_VALUE,
            NoticeSeverity::Warning,
            format!("invalid value for {field}, row skipped"),
        )
        .with_location(file, field, row)
        .with_context_field("fieldValue", value)
    }

    pub fn foreign_key(file: &str, field: &str, row: u64, key: &str) -> Self {
        ImportNotice::new(
            NOTICE_CODE_FOREIGN_KEY_VIOLATION,
            NoticeSeverity::Warning,
            format!("{field} '{key}' does not resolve, row skipped"),
        )
        .with_location(file, field, row)
        .with_context_field("fieldValue", key)
    }

    pub fn duplicate_key(file: &str, field: &str, row: u64, key: &str) -> Self {
        ImportNotice::new(
            NOTICE_CODE_DUPLICATE_KEY,
            NoticeSeverity::Warning,
            format!("duplicate {field} '{key}', row skipped"),
        )
        .with_location(file, field, row)
        .with_context_field("fieldValue", key)
    }

    pub fn default_applied(file: &str, field: &str, row: u64, value: &str, default: &str) -> Self {
        ImportNotice::new(
            NOTICE_CODE_DEFAULT_APPLIED,
            NoticeSeverity::Info,
            format!("invalid value for {field}, using {default}"),
        )
        .with_location(file, field, row)
        .with_context_field("fieldValue", value)
        .with_context_field("defaultValue", default)
    }

    pub fn insert_context_field<V: Serialize>(&mut self, name: impl Into<String>, value: V) {
        let serialized = serde_json::to_value(value).unwrap_or(Value::Null);
        self.context.insert(name.into(), serialized);
    }

    pub fn with_context_field<V: Serialize>(mut self, name: impl Into<String>, value: V) -> Self {
        self.insert_context_field(name, value);
        self
    }

    pub fn with_location(
        mut self,
        file: impl Into<String>,
        field: impl Into<String>,
        row: u64,
    ) -> Self {
        self.file = Some(file.into());
        self.field = Some(field.into());
        self.row = Some(row);
        self
    }

    pub fn is_row_skip(&self) -> bool {
        self.severity != NoticeSeverity::Info
    }
}

impl From<MissingFieldError> for ImportNotice {
    fn from(error: MissingFieldError) -> Self {
        ImportNotice::missing_field(&error)
    }
}

/// Notices of one import, bounded per file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NoticeContainer {
    notices: Vec<ImportNotice>,
    #[serde(skip)]
    per_file: BTreeMap<String, usize>,
    suppressed: usize,
}

impl NoticeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the notice was dropped because its file reached
    /// the cap.
    pub fn push(&mut self, notice: ImportNotice) -> bool {
        let key = notice.file.clone().unwrap_or_default();
        let count = self.per_file.entry(key).or_insert(0);
        if *count >= MAX_NOTICES_PER_FILE {
            self.suppressed += 1;
            return false;
        }
        *count += 1;
        self.notices.push(notice);
        true
    }

    pub fn merge(&mut self, other: NoticeContainer) {
        self.suppressed += other.suppressed;
        for notice in other.notices {
            self.push(notice);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportNotice> {
        self.notices.iter()
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }

    /// Notices dropped after their file reached [`MAX_NOTICES_PER_FILE`].
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    pub fn count_by_code(&self, code: &str) -> usize {
        self.notices.iter().filter(|notice| notice.code == code).count()
    }

    pub fn into_vec(self) -> Vec<ImportNotice> {
        self.notices
    }
}
