//! CSV export of a distribution batch.
//!
//! Layout: a `field,value` summary block, then one row per match line under its
//! own header row. Rows have different widths, so the writer is flexible.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::manager::BatchDetail;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub delimiter: u8,
    pub include_lines: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            include_lines: true,
        }
    }
}

impl ReportConfig {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_lines(mut self, include_lines: bool) -> Self {
        self.include_lines = include_lines;
        self
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv flush failed: {0}")]
    Flush(String),

    #[error("report is not valid utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

const LINE_HEADER: [&str; 11] = [
    "match_id",
    "need_id",
    "requester",
    "item_id",
    "item_name",
    "requested_quantity",
    "allocated_quantity",
    "outcome",
    "allocated_at",
    "allocated_by",
    "note",
];

fn or_empty<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn render_batch_report(detail: &BatchDetail, config: &ReportConfig) -> Result<String, ReportError> {
    let batch = &detail.batch;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .flexible(true)
        .from_writer(Vec::new());

    let summary = [
        ("batch_id", batch.id_typed().to_string()),
        ("distribution_date", or_empty(batch.distribution_date())),
        ("status", batch.status().as_str().to_string()),
        ("case_count", batch.case_count().to_string()),
        ("total_supply_items", batch.total_supply_items().to_string()),
        ("created_by", or_empty(batch.created_by())),
        ("created_at", or_empty(batch.created_at().map(|t| t.to_rfc3339()))),
        ("approved_by", or_empty(batch.approved_by())),
        ("approved_at", or_empty(batch.approved_at().map(|t| t.to_rfc3339()))),
        ("notes", batch.notes().to_string()),
    ];

    writer.write_record(["field", "value"])?;
    for (field, value) in &summary {
        writer.write_record([*field, value.as_str()])?;
    }

    if config.include_lines {
        writer.write_record(LINE_HEADER)?;
        for line in &detail.lines {
            writer.write_record([
                line.match_id.to_string(),
                line.need_id.to_string(),
                line.requester.clone().unwrap_or_default(),
                line.item_id.to_string(),
                line.item_name.clone().unwrap_or_default(),
                line.requested_quantity.to_string(),
                line.allocated_quantity.to_string(),
                line.outcome.as_str().to_string(),
                line.allocated_at.to_rfc3339(),
                line.allocated_by.to_string(),
                line.note.clone(),
            ])?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Flush(e.error().to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
