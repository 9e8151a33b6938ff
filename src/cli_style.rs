use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;
use crossterm::style::Stylize;
use unicode_width::UnicodeWidthStr;

// ═══════════════════════════════════════════════════════════════════════════════
// Clap Styles
// ═══════════════════════════════════════════════════════════════════════════════

pub fn get_styles() -> Styles {
    clap::builder::Styles::styled()
        .usage(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Blue))),
        )
        .header(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Blue))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Box Drawing
// ═══════════════════════════════════════════════════════════════════════════════

mod box_chars {
    pub const HORIZONTAL: &str = "─";
    pub const VERTICAL: &str = "│";
    pub const TOP_LEFT: &str = "┌";
    pub const TOP_RIGHT: &str = "┐";
    pub const BOTTOM_LEFT: &str = "└";
    pub const BOTTOM_RIGHT: &str = "┘";
    pub const T_TOP: &str = "┬";
    pub const T_BOTTOM: &str = "┴";
    pub const T_LEFT: &str = "├";
    pub const T_RIGHT: &str = "┤";
    pub const CROSS: &str = "┼";
    pub const CHECK: &str = "✓";
    pub const CROSS_MARK: &str = "✗";
    pub const BULLET: &str = "•";
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status Indicators
// ═══════════════════════════════════════════════════════════════════════════════

pub fn print_success(message: &str) {
    println!(" {} {}", box_chars::CHECK.green().bold(), message.green());
}

pub fn print_error(message: &str) {
    eprintln!(" {} {}", box_chars::CROSS_MARK.red().bold(), message.red());
}

pub fn print_warning(message: &str) {
    println!(" {} {}", "⚠".yellow().bold(), message.yellow());
}

pub fn print_section_header(title: &str) {
    let width: usize = 60;
    let fill = width.saturating_sub(title.width() + 2);
    println!();
    println!(
        "{} {} {}",
        box_chars::HORIZONTAL.repeat(2).cyan(),
        title.cyan().bold(),
        box_chars::HORIZONTAL.repeat(fill).cyan()
    );
}

pub fn print_key_value(key: &str, value: &str) {
    println!(
        "  {} {} {}",
        box_chars::BULLET.magenta(),
        format!("{}:", key).dim(),
        value
    );
}

pub fn print_empty_list(message: &str) {
    println!("  {}", message.dim().italic());
}

// ═══════════════════════════════════════════════════════════════════════════════
// Table Display
// ═══════════════════════════════════════════════════════════════════════════════

/// Box-drawn text table. Renders plain text so it can go to a file as well
/// as to the terminal.
pub struct TableBuilder {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    col_widths: Vec<usize>,
}

impl TableBuilder {
    pub fn new(headers: Vec<&str>) -> Self {
        let col_widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
        TableBuilder {
            headers: headers.into_iter().map(String::from).collect(),
            rows: Vec::new(),
            col_widths,
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        for (i, cell) in row.iter().enumerate() {
            if i < self.col_widths.len() {
                self.col_widths[i] = self.col_widths[i].max(cell.width());
            }
        }
        self.rows.push(row);
    }

    fn border(&self, left: &str, middle: &str, right: &str) -> String {
        let segments: Vec<String> = self
            .col_widths
            .iter()
            .map(|w| box_chars::HORIZONTAL.repeat(w + 2))
            .collect();
        format!("{}{}{}\n", left, segments.join(middle), right)
    }

    fn line(&self, cells: &[String]) -> String {
        let mut line = String::from(box_chars::VERTICAL);
        for (i, width) in self.col_widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let padding = width.saturating_sub(cell.width());
            line.push_str(&format!(" {}{} {}", cell, " ".repeat(padding), box_chars::VERTICAL));
        }
        line.push('\n');
        line
    }

    pub fn render(&self) -> String {
        let mut out = self.border(box_chars::TOP_LEFT, box_chars::T_TOP, box_chars::TOP_RIGHT);
        out.push_str(&self.line(&self.headers));
        out.push_str(&self.border(box_chars::T_LEFT, box_chars::CROSS, box_chars::T_RIGHT));
        for row in &self.rows {
            out.push_str(&self.line(row));
        }
        out.push_str(&self.border(
            box_chars::BOTTOM_LEFT,
            box_chars::T_BOTTOM,
            box_chars::BOTTOM_RIGHT,
        ));
        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}
