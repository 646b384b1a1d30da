//! Result rendering: tab-separated rows by default, pretty JSON with `--json`.

use std::io::{self, Write};

use serde::Serialize;

use tabbridge::commands::{Bookmark, Download, Extension, HistoryItem, Tab, Window};

/// Accumulates rows and writes them tab-separated, one row per line.
#[derive(Debug, Default)]
pub struct TablePrinter {
    rows: Vec<Vec<String>>,
    current: Vec<String>,
}

impl TablePrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tabs and line breaks inside a field would break the row layout.
    pub fn add_field(&mut self, field: impl AsRef<str>) -> &mut Self {
        let field = field.as_ref().replace(['\t', '\n', '\r'], " ");
        self.current.push(field);
        self
    }

    pub fn end_row(&mut self) {
        self.rows.push(std::mem::take(&mut self.current));
    }

    pub fn render<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if !self.current.is_empty() {
            self.end_row();
        }
        for row in self.rows.drain(..) {
            writeln!(out, "{}", row.join("\t"))?;
        }
        Ok(())
    }
}

/// Something that can be shown as table rows.
pub trait Rows {
    fn rows(&self, table: &mut TablePrinter);
}

impl Rows for Tab {
    fn rows(&self, table: &mut TablePrinter) {
        table
            .add_field(self.id.to_string())
            .add_field(&self.title)
            .add_field(&self.url);
        table.end_row();
    }
}

impl Rows for Window {
    fn rows(&self, table: &mut TablePrinter) {
        let tabs = self.tabs.as_ref().map_or(0, Vec::len);
        table
            .add_field(self.id.to_string())
            .add_field(&self.state)
            .add_field(&self.window_type)
            .add_field(if self.focused { "focused" } else { "" })
            .add_field(format!("{tabs} tabs"));
        table.end_row();
    }
}

impl Rows for Extension {
    fn rows(&self, table: &mut TablePrinter) {
        table
            .add_field(&self.id)
            .add_field(&self.name)
            .add_field(&self.version)
            .add_field(if self.enabled { "enabled" } else { "disabled" });
        table.end_row();
    }
}

/// Bookmarks print as an indented tree; folders have no URL.
impl Rows for Bookmark {
    fn rows(&self, table: &mut TablePrinter) {
        for (depth, node) in self.walk() {
            table
                .add_field(&node.id)
                .add_field(format!("{}{}", "  ".repeat(depth), node.title))
                .add_field(node.url.as_deref().unwrap_or(""));
            table.end_row();
        }
    }
}

impl Rows for Download {
    fn rows(&self, table: &mut TablePrinter) {
        table
            .add_field(self.id.to_string())
            .add_field(&self.state)
            .add_field(&self.filename)
            .add_field(&self.url);
        table.end_row();
    }
}

impl Rows for HistoryItem {
    fn rows(&self, table: &mut TablePrinter) {
        table
            .add_field(&self.id)
            .add_field(self.visit_count.to_string())
            .add_field(&self.title)
            .add_field(&self.url);
        table.end_row();
    }
}

impl<T: Rows> Rows for Vec<T> {
    fn rows(&self, table: &mut TablePrinter) {
        for item in self {
            item.rows(table);
        }
    }
}

/// Where command results go.
pub struct Output<W> {
    out: W,
    json: bool,
}

impl<W: Write> Output<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    /// Table rows, or JSON when `--json` was given.
    pub fn show<T: Rows + Serialize>(&mut self, value: &T) -> io::Result<()> {
        if self.json {
            return self.json(value);
        }
        let mut table = TablePrinter::new();
        value.rows(&mut table);
        table.render(&mut self.out)
    }

    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, value)?;
        writeln!(self.out)
    }

    /// A single line of text (a URL, a selection).
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }

    /// Text exactly as received, e.g. page source.
    pub fn raw(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
