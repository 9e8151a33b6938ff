//! Read-only reports over the inventory store.

mod export;
mod render;

pub use export::export_content;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use crate::inventory::ItemKind;
use crate::inventory_store::{InventoryStore, ItemFilter, StoreResult, StoreSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Csv,
    Json,
    Html,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Table => "txt",
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
            ReportFormat::Html => "html",
        }
    }
}

/// One inventory record as it appears in a report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub kind: ItemKind,
    pub id: String,
    pub display_name: String,
    pub has_content: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub assignments: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryReport {
    pub generated_at: DateTime<Utc>,
    pub summary: StoreSummary,
    pub rows: Vec<ReportRow>,
}

impl InventoryReport {
    /// Collects every record of every kind, with its assignment labels.
    pub fn build(store: &dyn InventoryStore) -> StoreResult<Self> {
        let mut rows = Vec::new();
        for kind in ItemKind::ALL {
            for record in store.list(kind, &ItemFilter::default())? {
                let assignments = store
                    .list_assignments(kind, &record.id)?
                    .iter()
                    .map(|a| a.target_label())
                    .collect();
                rows.push(ReportRow {
                    kind,
                    id: record.id,
                    display_name: record.display_name,
                    has_content: record.has_content,
                    last_updated: record.last_updated,
                    assignments,
                });
            }
        }

        Ok(Self {
            generated_at: Utc::now(),
            summary: store.summary()?,
            rows,
        })
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Table => Ok(render::table(self)),
            ReportFormat::Csv => Ok(render::csv(self)),
            ReportFormat::Json => {
                serde_json::to_string_pretty(self).context("Failed to serialize report")
            }
            ReportFormat::Html => Ok(render::html(self)),
        }
    }

    /// `inventory-report-<timestamp>.<ext>`
    pub fn file_name(&self, format: ReportFormat) -> String {
        format!(
            "inventory-report-{}.{}",
            self.generated_at.format("%Y%m%d-%H%M%S"),
            format.extension()
        )
    }
}

/// Renders `report` and saves it in `dir`. Returns the written path.
pub fn write_report(report: &InventoryReport, format: ReportFormat, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(report.file_name(format));
    let rendered = report.render(format)?;
    fs::write(&path, rendered).with_context(|| format!("Failed to write report {:?}", path))?;
    info!("Wrote {} report with {} rows to {:?}", format.extension(), report.rows.len(), path);
    Ok(path)
}
