/// Task export rendering
///
/// The task service supplies the rows; a [`TaskExporter`] turns them into
/// bytes. Both formats carry the same columns:
///
/// `ID, Name, Description, Category, Due Date, Status`
///
/// # Example
///
/// ```
/// use taskledger_shared::export::ExportFormat;
///
/// let format: ExportFormat = "csv".parse().unwrap();
/// let bytes = format.exporter().render(&[]).unwrap();
/// assert_eq!(bytes, b"ID,Name,Description,Category,Due Date,Status\r\n");
/// ```

use chrono::SecondsFormat;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::task::TaskView;

const COLUMNS: [&str; 6] = ["ID", "Name", "Description", "Category", "Due Date", "Status"];

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    /// Suggested download file name
    pub fn file_name(&self) -> String {
        format!("tasks.{}", self.as_str())
    }

    pub fn exporter(&self) -> Box<dyn TaskExporter> {
        match self {
            ExportFormat::Csv => Box::new(CsvExporter),
            ExportFormat::Json => Box::new(JsonExporter),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ServiceError::invalid(
                "format",
                format!("Unsupported export format: {}", other),
            )),
        }
    }
}

/// Renders a task list into an export document
pub trait TaskExporter: Send + Sync {
    fn render(&self, tasks: &[TaskView]) -> ServiceResult<Vec<u8>>;
}

fn due_date(task: &TaskView) -> String {
    task.due_date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// RFC 4180 CSV with a header row and CRLF line endings
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter;

impl CsvExporter {
    fn escape(field: &str) -> String {
        if field.contains([',', '"', '\r', '\n']) {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn write_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
        let row: Vec<String> = fields.into_iter().map(Self::escape).collect();
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
}

impl TaskExporter for CsvExporter {
    fn render(&self, tasks: &[TaskView]) -> ServiceResult<Vec<u8>> {
        let mut out = String::new();
        Self::write_row(&mut out, COLUMNS);

        for task in tasks {
            let id = task.id.to_string();
            let due = due_date(task);
            Self::write_row(
                &mut out,
                [
                    id.as_str(),
                    task.name.as_str(),
                    task.description.as_deref().unwrap_or(""),
                    task.category.as_deref().unwrap_or(""),
                    due.as_str(),
                    task.status.as_str(),
                ],
            );
        }

        Ok(out.into_bytes())
    }
}

#[derive(Serialize)]
struct JsonRow<'a> {
    #[serde(rename = "ID")]
    id: Uuid,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Description")]
    description: Option<&'a str>,
    #[serde(rename = "Category")]
    category: Option<&'a str>,
    #[serde(rename = "Due Date")]
    due_date: String,
    #[serde(rename = "Status")]
    status: &'a str,
}

/// Pretty-printed JSON array, one object per task
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter;

impl TaskExporter for JsonExporter {
    fn render(&self, tasks: &[TaskView]) -> ServiceResult<Vec<u8>> {
        let rows: Vec<JsonRow<'_>> = tasks
            .iter()
            .map(|task| JsonRow {
                id: task.id,
                name: &task.name,
                description: task.description.as_deref(),
                category: task.category.as_deref(),
                due_date: due_date(task),
                status: &task.status,
            })
            .collect();

        Ok(serde_json::to_vec_pretty(&rows)?)
    }
}
