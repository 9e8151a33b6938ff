use std::fmt::Write as _;

use super::InventoryReport;
use crate::cli_style::TableBuilder;

const CSV_HEADER: [&str; 6] = [
    "kind",
    "id",
    "display_name",
    "has_content",
    "last_updated",
    "assignments",
];

fn last_updated(row: &super::ReportRow) -> String {
    row.last_updated
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

pub(super) fn table(report: &InventoryReport) -> String {
    let mut table = TableBuilder::new(vec!["Kind", "Id", "Name", "Content", "Assignments"]);
    for row in &report.rows {
        table.add_row(vec![
            row.kind.to_string(),
            row.id.clone(),
            row.display_name.clone(),
            if row.has_content { "yes" } else { "no" }.to_string(),
            row.assignments.join(", "),
        ]);
    }

    let mut out = format!(
        "Inventory report generated {}\n\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    out.push_str(&table.render());

    let summary = &report.summary;
    let _ = writeln!(out);
    for (kind, counts) in &summary.collections {
        let _ = writeln!(
            out,
            "{}: {} record(s), {} with content, {} assignment(s)",
            kind, counts.records, counts.with_content, counts.assignments
        );
    }
    if summary.orphaned_assignments > 0 || summary.orphaned_history_entries > 0 {
        let _ = writeln!(
            out,
            "Orphaned rows: {} assignment(s), {} history entries",
            summary.orphaned_assignments, summary.orphaned_history_entries
        );
    }
    out
}

/// Quotes a field when it holds a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub(super) fn csv(report: &InventoryReport) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push_str("\r\n");
    for row in &report.rows {
        let fields = [
            row.kind.as_str().to_string(),
            row.id.clone(),
            row.display_name.clone(),
            row.has_content.to_string(),
            last_updated(row),
            row.assignments.join("; "),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub(super) fn html(report: &InventoryReport) -> String {
    let generated = report.generated_at.format("%Y-%m-%d %H:%M:%S UTC");
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html lang=\"en\">");
    let _ = writeln!(out, "<head>");
    let _ = writeln!(out, "<meta charset=\"utf-8\">");
    let _ = writeln!(out, "<title>Inventory report {}</title>", generated);
    let _ = writeln!(
        out,
        "<style>body{{font-family:sans-serif}}table{{border-collapse:collapse}}\
         th,td{{border:1px solid #ccc;padding:4px 8px;text-align:left}}</style>"
    );
    let _ = writeln!(out, "</head>");
    let _ = writeln!(out, "<body>");
    let _ = writeln!(out, "<h1>Inventory report</h1>");
    let _ = writeln!(out, "<p>Generated {}</p>", generated);

    let _ = writeln!(out, "<table>");
    let _ = writeln!(
        out,
        "<tr><th>Kind</th><th>Id</th><th>Name</th><th>Content</th><th>Last updated</th><th>Assignments</th></tr>"
    );
    for row in &report.rows {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            row.kind,
            escape_html(&row.id),
            escape_html(&row.display_name),
            if row.has_content { "yes" } else { "no" },
            last_updated(row),
            row.assignments
                .iter()
                .map(|a| escape_html(a))
                .collect::<Vec<_>>()
                .join("<br>")
        );
    }
    let _ = writeln!(out, "</table>");

    let _ = writeln!(out, "<ul>");
    for (kind, counts) in &report.summary.collections {
        let _ = writeln!(
            out,
            "<li>{}: {} record(s), {} with content, {} assignment(s)</li>",
            kind, counts.records, counts.with_content, counts.assignments
        );
    }
    let _ = writeln!(out, "</ul>");
    let _ = writeln!(out, "</body>");
    let _ = writeln!(out, "</html>");
    out
}
