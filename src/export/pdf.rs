use std::cmp::Reverse;

use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Polygon, Rgb,
};

use crate::accessors::summarize;
use crate::config::DisplayPolicy;
use crate::errors::{AppError, AppResult};
use crate::export::record_id;
use crate::history::normalize;
use crate::listing::DisplayRecord;

const PAGE_WIDTH_PT: f32 = 595.28;
const PAGE_HEIGHT_PT: f32 = 841.89;
const LEFT: f32 = 40.0;
const TOP: f32 = 40.0;
const LINE_HEIGHT_FACTOR: f32 = 1.15;
/// Average Helvetica glyph advance, as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

const SUMMARY_VALUE_X: f32 = LEFT + 160.0;
const SUMMARY_VALUE_WIDTH: f32 = 380.0;
const SUMMARY_PAGE_LIMIT: f32 = 750.0;

const COL_TIMESTAMP_X: f32 = LEFT;
const COL_LOCATION_X: f32 = LEFT + 240.0;
const COL_DIRECTION_X: f32 = LEFT + 420.0;
const COL_TIMESTAMP_WIDTH: f32 = 200.0;
const COL_LOCATION_WIDTH: f32 = 160.0;
const ROW_LINE_HEIGHT: f32 = 16.0;
const TABLE_WIDTH: f32 = 520.0;
const HEADER_HEIGHT: f32 = 18.0;
const HISTORY_PAGE_LIMIT: f32 = 720.0;

const ACCENT: (u8, u8, u8) = (11, 95, 255);
const INK: (u8, u8, u8) = (34, 41, 47);
const MUTED: (u8, u8, u8) = (88, 100, 121);
const HEADER_INK: (u8, u8, u8) = (80, 90, 100);
const VALUE_INK: (u8, u8, u8) = (20, 28, 36);
const HEADER_FILL: (u8, u8, u8) = (245, 247, 255);

/// Renders one record as an A4 PDF: title, EPC, summary block and the
/// history table, most recent first.
pub fn render(record: &DisplayRecord, policy: &DisplayPolicy) -> AppResult<Vec<u8>> {
    lay_out(record, policy)?.finish()
}

fn lay_out(record: &DisplayRecord, policy: &DisplayPolicy) -> AppResult<PageWriter> {
    let summary = summarize(&record_id(record), &record.record, policy.epoch_threshold);
    let mut page = PageWriter::new(&policy.record_label)?;

    page.text(&policy.record_label, LEFT, 20.0, ACCENT);
    page.advance(28.0);
    page.text(&format!("EPC: {}", summary.epc), LEFT, 12.0, INK);
    page.advance(18.0);

    page.advance(6.0);
    let rows = [
        ("ID", summary.id.as_str()),
        ("Item Name", summary.item_name.as_str()),
        ("Last Location", summary.last_location.as_str()),
        ("Last Direction", summary.last_direction.as_str()),
        ("Last Seen", summary.last_seen.as_str()),
    ];
    for (field, value) in rows {
        page.text(field, LEFT, 11.0, MUTED);
        let lines = wrap_text(value, SUMMARY_VALUE_WIDTH, 11.0);
        page.lines(&lines, SUMMARY_VALUE_X, 11.0, VALUE_INK);
        page.advance(lines.len() as f32 * 14.0 + 8.0);
        page.break_past(SUMMARY_PAGE_LIMIT);
    }

    page.advance(6.0);
    page.text("History (most recent first)", LEFT, 13.0, ACCENT);
    page.advance(18.0);

    page.band(LEFT - 6.0, TABLE_WIDTH, HEADER_HEIGHT, HEADER_FILL);
    page.text("Timestamp", COL_TIMESTAMP_X, 11.0, HEADER_INK);
    page.text("Location", COL_LOCATION_X, 11.0, HEADER_INK);
    page.text("Direction", COL_DIRECTION_X, 11.0, HEADER_INK);
    page.advance(HEADER_HEIGHT + 6.0);

    let mut history = normalize(&record.record);
    history.sort_by_key(|entry| Reverse(entry.timestamp_millis));
    for entry in &history {
        let timestamp = wrap_text(&entry.label(), COL_TIMESTAMP_WIDTH, 11.0);
        let location = wrap_text(&entry.location_text(), COL_LOCATION_WIDTH, 11.0);
        page.lines(&timestamp, COL_TIMESTAMP_X, 11.0, INK);
        page.lines(&location, COL_LOCATION_X, 11.0, INK);
        page.text(&entry.direction_text(), COL_DIRECTION_X, 11.0, INK);
        let tallest = timestamp.len().max(location.len());
        page.advance(tallest as f32 * ROW_LINE_HEIGHT + 10.0);
        page.break_past(HISTORY_PAGE_LIMIT);
    }

    Ok(page)
}

/// Top-down cursor over a growing document. `y` is measured in points from
/// the top edge; printpdf measures from the bottom.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    y: f32,
    pages: usize,
    bands: usize,
}

impl PageWriter {
    fn new(title: &str) -> AppResult<Self> {
        let (doc, page, layer) = PdfDocument::new(
            title,
            pt(PAGE_WIDTH_PT),
            pt(PAGE_HEIGHT_PT),
            "Page 1",
        );
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|err| AppError::Pdf(format!("{err:?}")))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            font,
            y: TOP,
            pages: 1,
            bands: 0,
        })
    }

    fn text(&self, text: &str, x: f32, size: f32, color: (u8, u8, u8)) {
        self.text_at(text, x, self.y, size, color);
    }

    fn lines(&self, lines: &[String], x: f32, size: f32, color: (u8, u8, u8)) {
        for (index, line) in lines.iter().enumerate() {
            let y = self.y + index as f32 * size * LINE_HEIGHT_FACTOR;
            self.text_at(line, x, y, size, color);
        }
    }

    fn text_at(&self, text: &str, x: f32, y: f32, size: f32, color: (u8, u8, u8)) {
        self.layer.set_fill_color(rgb(color));
        self.layer
            .use_text(text, size, pt(x), pt(PAGE_HEIGHT_PT - y), &self.font);
    }

    /// Filled strip behind the current text line; its top sits 12 pt above
    /// the baseline.
    fn band(&mut self, x: f32, width: f32, height: f32, color: (u8, u8, u8)) {
        let top = self.y - 12.0;
        let corners = [
            (x, top),
            (x + width, top),
            (x + width, top + height),
            (x, top + height),
        ];
        self.layer.set_fill_color(rgb(color));
        self.layer.add_polygon(Polygon {
            rings: vec![corners
                .iter()
                .map(|&(cx, cy)| (Point::new(pt(cx), pt(PAGE_HEIGHT_PT - cy)), false))
                .collect()],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        });
        self.bands += 1;
    }

    fn advance(&mut self, by: f32) {
        self.y += by;
    }

    fn break_past(&mut self, limit: f32) {
        if self.y > limit {
            self.pages += 1;
            let (page, layer) = self.doc.add_page(
                pt(PAGE_WIDTH_PT),
                pt(PAGE_HEIGHT_PT),
                format!("Page {}", self.pages),
            );
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
        }
    }

    fn finish(self) -> AppResult<Vec<u8>> {
        tracing::debug!(target: "export", pages = self.pages, "pdf laid out");
        self.doc
            .save_to_bytes()
            .map_err(|err| AppError::Pdf(format!("{err:?}")))
    }
}

fn pt(points: f32) -> Mm {
    Mm(points * 25.4 / 72.0)
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ))
}

/// Greedy word wrap using an average glyph width. Words longer than a line
/// are split.
fn wrap_text(text: &str, width: f32, size: f32) -> Vec<String> {
    let max_chars = ((width / (size * AVG_GLYPH_WIDTH)) as usize).max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed =
                current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::listing::assemble;

    fn record(snapshot: Value) -> DisplayRecord {
        assemble(&snapshot, 0, &DisplayPolicy::default())
            .records
            .remove(0)
    }

    #[test]
    fn renders_a_pdf_document() {
        let tag = record(json!({ "TAG1": {
            "itemname": "Badge07",
            "timestamp": {
                "2025-01-01 09:00:00": { "Location": "Gate A", "InOutState": "IN" },
                "2025-01-01 17:30:00": { "Location": "Gate A", "InOutState": "OUT" }
            }
        }}));
        let bytes = render(&tag, &DisplayPolicy::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let page = lay_out(&tag, &DisplayPolicy::default()).unwrap();
        assert_eq!(page.bands, 1);
        assert_eq!(page.pages, 1);
    }

    #[test]
    fn long_histories_paginate() {
        let events: Vec<Value> = (0..120)
            .map(|i| json!({ "location": format!("Dock {i}"), "dir": "IN", "ts": 1_000 + i }))
            .collect();
        let tag = record(json!({ "T": { "events": events } }));
        let page = lay_out(&tag, &DisplayPolicy::default()).unwrap();
        assert!(page.pages >= 3);
        assert!(page.y <= HISTORY_PAGE_LIMIT);
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap_text("alpha beta gamma", 50.0, 10.0);
        assert_eq!(lines, vec!["alpha beta", "gamma"]);
    }

    #[test]
    fn splits_words_longer_than_a_line() {
        let lines = wrap_text("abcdefghijkl", 25.0, 10.0);
        assert_eq!(lines, vec!["abcde", "fghij", "kl"]);
        assert_eq!(wrap_text("", 25.0, 10.0), vec![String::new()]);
    }
}
