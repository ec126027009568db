//! CSV ingestion and field-reconciliation pipeline.
//!
//! Three stages, consumed in sequence: the tabular parser turns raw
//! delimited text into header-keyed rows, the schema reconciler maps raw
//! columns onto the fixed target fields and coerces cell values, and the
//! upsert merge folds the resulting records into the stored collection by
//! identity (URL first, then normalized title).
//!
//! Bad input never fails mid-pipeline: empty files yield empty output,
//! unmapped columns fall back to defaults, and unparseable cells coerce to
//! 0 (counts) or pass through verbatim (dates). Only the storage flush,
//! owned by the caller, can fail the batch.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ccp_core::{ContentRecord, ImportRecord, Status};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CRATE_NAME: &str = "ccp-import";

/// Downloadable starter document matching the native column layout.
pub const TEMPLATE_CSV: &str = "\
title,status,dueDate,views,likes,comments,shares,category,tiktokUrl,instagramUrl,hashtags,summary
My garden tour,posted,2026-02-15,12000,850,42,10,Garden,https://tiktok.com/video/111,,#garden #spring,Spring walkthrough of the balcony garden
";

/// The ten fields an import can populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetField {
    Title,
    Views,
    Likes,
    Comments,
    Shares,
    DueDate,
    TiktokUrl,
    InstagramUrl,
    Hashtags,
    Category,
}

impl TargetField {
    pub const ALL: [TargetField; 10] = [
        TargetField::Title,
        TargetField::Views,
        TargetField::Likes,
        TargetField::Comments,
        TargetField::Shares,
        TargetField::DueDate,
        TargetField::TiktokUrl,
        TargetField::InstagramUrl,
        TargetField::Hashtags,
        TargetField::Category,
    ];
}

/// One target field plus the lowercase aliases that may name it in an
/// export. Alias order is the tie-break: the first alias that matches any
/// header wins the column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub target: TargetField,
    pub label: String,
    pub aliases: Vec<String>,
}

/// Immutable column-mapping configuration passed into the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSchema {
    pub fields: Vec<FieldSpec>,
}

impl Default for ImportSchema {
    fn default() -> Self {
        fn spec(target: TargetField, label: &str, aliases: &[&str]) -> FieldSpec {
            FieldSpec {
                target,
                label: label.to_string(),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
            }
        }

        Self {
            fields: vec![
                spec(
                    TargetField::Title,
                    "Title",
                    &["title", "video title", "name", "content", "caption"],
                ),
                spec(
                    TargetField::Views,
                    "Views",
                    &["views", "video views", "view count", "impressions", "reach", "plays"],
                ),
                spec(
                    TargetField::Likes,
                    "Likes",
                    &["likes", "like count", "hearts", "total likes"],
                ),
                spec(
                    TargetField::Comments,
                    "Comments",
                    &["comments", "comment count", "total comments"],
                ),
                spec(
                    TargetField::Shares,
                    "Shares",
                    &["shares", "share count", "reposts", "saves"],
                ),
                spec(
                    TargetField::DueDate,
                    "Date",
                    &[
                        "duedate",
                        "due date",
                        "date",
                        "post date",
                        "publish date",
                        "video create time",
                        "create time",
                        "posted",
                    ],
                ),
                spec(
                    TargetField::TiktokUrl,
                    "TikTok URL",
                    &["tiktokurl", "tiktok url", "tiktok link", "share url", "video link", "url", "link"],
                ),
                spec(
                    TargetField::InstagramUrl,
                    "Instagram URL",
                    &["instagramurl", "instagram url", "instagram link", "ig link", "permalink"],
                ),
                spec(TargetField::Hashtags, "Hashtags", &["hashtags", "tags"]),
                spec(
                    TargetField::Category,
                    "Category",
                    &["category", "type", "pillar", "content type"],
                ),
            ],
        }
    }
}

impl ImportSchema {
    /// Load a custom alias table from YAML. The default table covers the
    /// common TikTok/Instagram exports; a custom file swaps it wholesale.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn label_for(&self, target: TargetField) -> &str {
        self.fields
            .iter()
            .find(|f| f.target == target)
            .map(|f| f.label.as_str())
            .unwrap_or("")
    }

    /// Resolve which raw header feeds each target field.
    ///
    /// First-match-wins over the declared alias order; comparison is exact
    /// equality on lowercased, trimmed strings, never substring or fuzzy.
    /// The result records the header's original casing so the preview can
    /// echo the user's own column names back.
    pub fn map_columns(&self, headers: &[String]) -> FieldMapping {
        let lowered: Vec<String> = headers
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let mut sources = HashMap::new();
        for field in &self.fields {
            let matched = field.aliases.iter().find_map(|alias| {
                lowered
                    .iter()
                    .position(|h| h == alias)
                    .map(|idx| headers[idx].clone())
            });
            if let Some(header) = matched {
                sources.insert(field.target, header);
            }
        }
        FieldMapping { sources }
    }

    /// Apply the column mapping to every parsed row, dropping rows that
    /// carry no signal (no title and no views).
    pub fn reconcile(&self, table: &ParsedTable) -> Vec<ImportRecord> {
        let mapping = self.map_columns(&table.headers);
        table
            .rows
            .iter()
            .map(|row| mapping.build_record(row))
            .filter(ImportRecord::has_signal)
            .collect()
    }
}

/// Which raw header, if any, was matched for each target field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    sources: HashMap<TargetField, String>,
}

impl FieldMapping {
    pub fn source_for(&self, target: TargetField) -> Option<&str> {
        self.sources.get(&target).map(String::as_str)
    }

    fn cell<'a>(&self, row: &'a RawRow, target: TargetField) -> Option<&'a str> {
        self.source_for(target).and_then(|header| row.get(header))
    }

    fn text(&self, row: &RawRow, target: TargetField) -> String {
        self.cell(row, target).unwrap_or("").trim().to_string()
    }

    fn count(&self, row: &RawRow, target: TargetField) -> Option<u64> {
        self.cell(row, target).map(parse_count)
    }

    /// Coerce one raw row into a typed record. Never fails: bad counts
    /// become 0, bad dates pass through verbatim.
    pub fn build_record(&self, row: &RawRow) -> ImportRecord {
        ImportRecord {
            title: self.text(row, TargetField::Title),
            views: self.count(row, TargetField::Views),
            likes: self.count(row, TargetField::Likes),
            comments: self.count(row, TargetField::Comments),
            shares: self.count(row, TargetField::Shares),
            due_date: normalize_date(&self.text(row, TargetField::DueDate)),
            tiktok_url: self.text(row, TargetField::TiktokUrl),
            instagram_url: self.text(row, TargetField::InstagramUrl),
            hashtags: self.text(row, TargetField::Hashtags),
            category: self.text(row, TargetField::Category),
        }
    }
}

/// One data row, keyed by the header row's cell names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    cells: HashMap<String, String>,
}

impl RawRow {
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells.get(header).map(String::as_str)
    }
}

/// Parsed delimited text: the trimmed header cells plus one `RawRow` per
/// non-empty data line.
#[derive(Debug, Clone, Default)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Parse raw delimited text.
///
/// Tolerates both `\n` and `\r\n` line endings. A `"` toggles quoted mode,
/// inside which `,` is literal text; the quote character itself is never
/// emitted. Doubled quotes are NOT an escape for a literal quote, a known
/// limitation of the format this mirrors, kept deliberately. Fewer than two
/// lines (no header or no data) parses to an empty table.
pub fn parse_table(text: &str) -> ParsedTable {
    let lines: Vec<&str> = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).collect();
    if lines.len() < 2 {
        return ParsedTable::default();
    }

    let headers: Vec<String> = split_cells(lines[0])
        .into_iter()
        .map(|c| c.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for line in &lines[1..] {
        if line.trim().is_empty() {
            continue;
        }
        let cells = split_cells(line);
        let mut row = RawRow::default();
        for (idx, header) in headers.iter().enumerate() {
            // Short rows pad with empty strings; extra cells are dropped.
            let value = cells.get(idx).map(|c| c.trim().to_string()).unwrap_or_default();
            row.cells.insert(header.clone(), value);
        }
        rows.push(row);
    }

    ParsedTable { headers, rows }
}

fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                cells.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    cells.push(current);
    cells
}

/// Strip thousands-separator commas and parse; empty or unparseable cells
/// coerce to 0. Never negative, never fractional.
pub fn parse_count(raw: &str) -> u64 {
    raw.trim().replace(',', "").parse().unwrap_or(0)
}

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Canonicalize a date cell to `YYYY-MM-DD`, or pass the raw string
/// through unchanged when no known format matches. Downstream consumers
/// treat a non-canonical value as display-only text.
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return dt.date().format("%Y-%m-%d").to_string();
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    raw.to_string()
}

/// Best-effort guess at which platform exported the file. Advisory only:
/// it feeds a banner in the preview, never the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourcePlatform {
    Tiktok,
    Instagram,
    Custom,
}

impl SourcePlatform {
    pub fn label(&self) -> &'static str {
        match self {
            SourcePlatform::Tiktok => "TikTok export",
            SourcePlatform::Instagram => "Instagram export",
            SourcePlatform::Custom => "Custom CSV",
        }
    }
}

const PLATFORM_SIGNATURES: [(&str, SourcePlatform); 7] = [
    ("video create time", SourcePlatform::Tiktok),
    ("video views", SourcePlatform::Tiktok),
    ("share url", SourcePlatform::Tiktok),
    ("tiktok", SourcePlatform::Tiktok),
    ("permalink", SourcePlatform::Instagram),
    ("impressions", SourcePlatform::Instagram),
    ("reach", SourcePlatform::Instagram),
];

pub fn detect_platform(headers: &[String]) -> SourcePlatform {
    let joined = headers.join(" ").to_lowercase();
    PLATFORM_SIGNATURES
        .iter()
        .find(|(needle, _)| joined.contains(needle))
        .map(|(_, platform)| *platform)
        .unwrap_or(SourcePlatform::Custom)
}

/// Pre-merge preview returned to the caller before anything is written.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub platform: SourcePlatform,
    pub platform_label: String,
    pub mapping: Vec<MappingEntry>,
    pub sample: Vec<ImportRecord>,
    pub importable: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub field: TargetField,
    pub label: String,
    pub source: String,
}

const PREVIEW_SAMPLE_SIZE: usize = 5;

/// Parse + reconcile without touching storage: platform banner, resolved
/// column mapping, the first records, and the importable count.
pub fn preview(text: &str, schema: &ImportSchema) -> ImportPreview {
    let table = parse_table(text);
    let mapping = schema.map_columns(&table.headers);
    let records = schema.reconcile(&table);
    let platform = detect_platform(&table.headers);

    let entries = TargetField::ALL
        .iter()
        .map(|&field| MappingEntry {
            field,
            label: schema.label_for(field).to_string(),
            source: mapping
                .source_for(field)
                .map(str::to_string)
                .unwrap_or_else(|| "not found".to_string()),
        })
        .collect();

    ImportPreview {
        platform,
        platform_label: platform.label().to_string(),
        mapping: entries,
        importable: records.len(),
        sample: records.into_iter().take(PREVIEW_SAMPLE_SIZE).collect(),
    }
}

/// Aggregate outcome of one upsert batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub created: usize,
    pub updated: usize,
    pub total: usize,
}

/// Fold import records into the existing collection, in memory.
///
/// Identity precedence per import record: exact `tiktok_url` match, then
/// exact `instagram_url` match, then case-insensitive trimmed title. The
/// caller owns persisting the merged collection in a single batch write;
/// nothing here is committed until that flush succeeds. `now` is injected
/// so the operation is a pure function of its inputs.
pub fn merge_into(
    existing: &mut Vec<ContentRecord>,
    imports: &[ImportRecord],
    now: DateTime<Utc>,
) -> MergeSummary {
    let mut created = 0;
    let mut updated = 0;

    for item in imports {
        match existing.iter_mut().find(|record| matches_identity(record, item)) {
            Some(record) => {
                apply_import(record, item, now);
                updated += 1;
            }
            None => {
                existing.push(record_from_import(item, now));
                created += 1;
            }
        }
    }

    debug!(created, updated, total = imports.len(), "merged import batch");
    MergeSummary {
        created,
        updated,
        total: imports.len(),
    }
}

fn matches_identity(record: &ContentRecord, item: &ImportRecord) -> bool {
    if !item.tiktok_url.is_empty()
        && !record.tiktok_url.is_empty()
        && record.tiktok_url == item.tiktok_url
    {
        return true;
    }
    if !item.instagram_url.is_empty()
        && !record.instagram_url.is_empty()
        && record.instagram_url == item.instagram_url
    {
        return true;
    }
    !item.title.is_empty()
        && !record.title.is_empty()
        && record.title.trim().to_lowercase() == item.title.trim().to_lowercase()
}

fn apply_import(record: &mut ContentRecord, item: &ImportRecord, now: DateTime<Utc>) {
    // A present-but-zero count overwrites; an unmapped column preserves.
    if let Some(views) = item.views {
        record.views = views;
    }
    if let Some(likes) = item.likes {
        record.likes = likes;
    }
    if let Some(comments) = item.comments {
        record.comments = comments;
    }
    if let Some(shares) = item.shares {
        record.shares = shares;
    }
    if !item.tiktok_url.is_empty() {
        record.tiktok_url = item.tiktok_url.clone();
    }
    if !item.instagram_url.is_empty() {
        record.instagram_url = item.instagram_url.clone();
    }
    if !item.due_date.is_empty() {
        record.due_date = item.due_date.clone();
    }
    record.last_imported = Some(now);
}

fn record_from_import(item: &ImportRecord, now: DateTime<Utc>) -> ContentRecord {
    let title = if item.title.is_empty() {
        "Untitled".to_string()
    } else {
        item.title.clone()
    };
    let mut record = ContentRecord::new(ccp_core::new_record_id(), title);
    record.status = if item.views.unwrap_or(0) > 0 {
        Status::Posted
    } else {
        Status::Idea
    };
    record.due_date = item.due_date.clone();
    record.created_date = if item.due_date.is_empty() {
        now.date_naive().format("%Y-%m-%d").to_string()
    } else {
        item.due_date.clone()
    };
    record.tiktok_url = item.tiktok_url.clone();
    record.instagram_url = item.instagram_url.clone();
    record.hashtags = item.hashtags.clone();
    record.category = item.category.clone();
    record.views = item.views.unwrap_or(0);
    record.likes = item.likes.unwrap_or(0);
    record.comments = item.comments.unwrap_or(0);
    record.shares = item.shares.unwrap_or(0);
    record.last_imported = Some(now);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn header_only_or_empty_input_parses_to_nothing() {
        assert!(parse_table("").rows.is_empty());
        assert!(parse_table("title,views").rows.is_empty());
        assert!(parse_table("title,views").headers.is_empty());
    }

    #[test]
    fn quoted_commas_stay_inside_the_cell() {
        let table = parse_table("title,views\n\"tour, part one\",42\n");
        assert_eq!(table.rows[0].get("title"), Some("tour, part one"));
        assert_eq!(table.rows[0].get("views"), Some("42"));
    }

    #[test]
    fn quote_characters_are_never_emitted() {
        let table = parse_table("title\n\"say \"\"hi\"\"\"\n");
        // Doubled quotes are not an escape in this format; the quote chars
        // just vanish.
        assert_eq!(table.rows[0].get("title"), Some("say hi"));
    }

    #[test]
    fn crlf_blank_lines_short_and_long_rows() {
        let text = "title,views,likes\r\nfirst,10\r\n   \r\nsecond,20,30,EXTRA\r\n";
        let table = parse_table(text);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("likes"), Some(""));
        assert_eq!(table.rows[1].get("likes"), Some("30"));
        assert_eq!(table.rows[1].cells.len(), 3);
    }

    #[test]
    fn column_matching_is_case_insensitive_and_alias_order_sensitive() {
        let schema = ImportSchema {
            fields: vec![FieldSpec {
                target: TargetField::Views,
                label: "Views".into(),
                aliases: vec!["views".into(), "video views".into()],
            }],
        };
        let headers = vec!["Video Views".to_string(), "Views".to_string()];
        let mapping = schema.map_columns(&headers);
        // "views" is declared first, so the plain "Views" header wins even
        // though "Video Views" appears earlier in the file.
        assert_eq!(mapping.source_for(TargetField::Views), Some("Views"));

        let reversed = ImportSchema {
            fields: vec![FieldSpec {
                target: TargetField::Views,
                label: "Views".into(),
                aliases: vec!["video views".into(), "views".into()],
            }],
        };
        let mapping = reversed.map_columns(&headers);
        assert_eq!(mapping.source_for(TargetField::Views), Some("Video Views"));
    }

    #[test]
    fn unmatched_fields_map_to_nothing() {
        let schema = ImportSchema::default();
        let mapping = schema.map_columns(&["Title".to_string()]);
        assert_eq!(mapping.source_for(TargetField::Title), Some("Title"));
        assert_eq!(mapping.source_for(TargetField::InstagramUrl), None);
    }

    #[test]
    fn numeric_coercion_defaults_and_strips_thousands_commas() {
        assert_eq!(parse_count("12,345"), 12345);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("abc"), 0);
        assert_eq!(parse_count(" 900 "), 900);
        assert_eq!(parse_count("-5"), 0);
    }

    #[test]
    fn dates_canonicalize_or_pass_through() {
        assert_eq!(normalize_date("2026-02-15"), "2026-02-15");
        assert_eq!(normalize_date("02/15/2026"), "2026-02-15");
        assert_eq!(normalize_date("2026-02-15 14:30:22"), "2026-02-15");
        assert_eq!(normalize_date("Feb 15, 2026"), "2026-02-15");
        assert_eq!(normalize_date("sometime in spring"), "sometime in spring");
        assert_eq!(normalize_date(""), "");
    }

    #[test]
    fn rows_without_title_or_views_are_dropped() {
        let schema = ImportSchema::default();
        let table = parse_table("title,views\n,0\n,10\nkept,0\n");
        let records = schema.reconcile(&table);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "");
        assert_eq!(records[0].views, Some(10));
        assert_eq!(records[1].title, "kept");
    }

    #[test]
    fn unmapped_numeric_columns_reconcile_to_none() {
        let schema = ImportSchema::default();
        let table = parse_table("title\nonly a title\n");
        let records = schema.reconcile(&table);
        assert_eq!(records[0].views, None);
        assert_eq!(records[0].likes, None);
    }

    #[test]
    fn platform_detection_is_first_signature_wins_with_custom_fallback() {
        let tiktok = vec!["Video Title".into(), "Video Create Time".into()];
        assert_eq!(detect_platform(&tiktok), SourcePlatform::Tiktok);

        let instagram = vec!["Description".into(), "Permalink".into(), "Reach".into()];
        assert_eq!(detect_platform(&instagram), SourcePlatform::Instagram);

        let custom = vec!["colA".into(), "colB".into()];
        assert_eq!(detect_platform(&custom), SourcePlatform::Custom);
    }

    #[test]
    fn preview_is_bounded_and_reports_unmapped_columns() {
        let mut text = String::from("title,views\n");
        for i in 0..8 {
            text.push_str(&format!("video {i},{i}\n"));
        }
        let preview = preview(&text, &ImportSchema::default());
        assert_eq!(preview.importable, 8);
        assert_eq!(preview.sample.len(), 5);
        let hashtags = preview
            .mapping
            .iter()
            .find(|e| e.field == TargetField::Hashtags)
            .unwrap();
        assert_eq!(hashtags.source, "not found");
        let title = preview
            .mapping
            .iter()
            .find(|e| e.field == TargetField::Title)
            .unwrap();
        assert_eq!(title.source, "title");
    }

    #[test]
    fn url_identity_wins_over_title_mismatch() {
        let mut existing = vec![{
            let mut r = ContentRecord::new("1".into(), "Old title".into());
            r.tiktok_url = "https://tiktok.com/video/1".into();
            r.views = 5;
            r
        }];
        let import = ImportRecord {
            title: "Completely different title".into(),
            views: Some(900),
            tiktok_url: "https://tiktok.com/video/1".into(),
            ..ImportRecord::default()
        };
        let summary = merge_into(&mut existing, &[import], fixed_now());
        assert_eq!((summary.created, summary.updated), (0, 1));
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].views, 900);
        assert_eq!(existing[0].title, "Old title");
    }

    #[test]
    fn title_identity_is_case_insensitive_and_trimmed() {
        let mut existing = vec![ContentRecord::new("1".into(), "Garden Tour".into())];
        let import = ImportRecord {
            title: "  garden tour ".into(),
            likes: Some(3),
            ..ImportRecord::default()
        };
        let summary = merge_into(&mut existing, &[import], fixed_now());
        assert_eq!((summary.created, summary.updated), (0, 1));
        assert_eq!(existing[0].likes, 3);
    }

    #[test]
    fn present_zero_overwrites_but_absent_preserves() {
        let mut existing = vec![{
            let mut r = ContentRecord::new("1".into(), "Garden tour".into());
            r.views = 500;
            r.likes = 40;
            r.due_date = "2026-01-01".into();
            r
        }];
        let import = ImportRecord {
            title: "Garden tour".into(),
            views: Some(0),
            likes: None,
            due_date: String::new(),
            ..ImportRecord::default()
        };
        merge_into(&mut existing, &[import], fixed_now());
        assert_eq!(existing[0].views, 0);
        assert_eq!(existing[0].likes, 40);
        assert_eq!(existing[0].due_date, "2026-01-01");
        assert_eq!(existing[0].last_imported, Some(fixed_now()));
    }

    #[test]
    fn new_records_default_status_by_views() {
        let mut existing = Vec::new();
        let imports = [
            ImportRecord {
                title: "Posted already".into(),
                views: Some(100),
                due_date: "2026-02-15".into(),
                ..ImportRecord::default()
            },
            ImportRecord {
                title: "Still an idea".into(),
                ..ImportRecord::default()
            },
        ];
        let summary = merge_into(&mut existing, &imports, fixed_now());
        assert_eq!((summary.created, summary.updated, summary.total), (2, 0, 2));
        assert_eq!(existing[0].status, Status::Posted);
        assert_eq!(existing[0].created_date, "2026-02-15");
        assert_eq!(existing[1].status, Status::Idea);
        assert_eq!(existing[1].created_date, "2026-03-01");
        assert_ne!(existing[0].id, existing[1].id);
    }

    #[test]
    fn importing_the_same_file_twice_is_idempotent() {
        let schema = ImportSchema::default();
        let text = "Title,Views,Likes\nGarden tour,\"1,200\",80\nCompost update,0,0\n";
        let records = schema.reconcile(&parse_table(text));
        assert_eq!(records.len(), 2);

        let mut existing = Vec::new();
        let first = merge_into(&mut existing, &records, fixed_now());
        assert_eq!((first.created, first.updated), (2, 0));
        let after_first = existing.clone();

        let second = merge_into(&mut existing, &records, fixed_now());
        assert_eq!((second.created, second.updated), (0, 2));
        assert_eq!(existing, after_first);
    }

    #[test]
    fn tiktok_export_end_to_end() {
        let text = "Video Title,Video Views,Likes,Comments,Shares,Video Create Time,Share URL\n\
                    \"My garden tour\",12000,850,42,10,2026-02-15,https://tiktok.com/video/111\n";
        let schema = ImportSchema::default();
        let table = parse_table(text);

        assert_eq!(detect_platform(&table.headers), SourcePlatform::Tiktok);

        let mapping = schema.map_columns(&table.headers);
        assert_eq!(mapping.source_for(TargetField::Title), Some("Video Title"));
        assert_eq!(mapping.source_for(TargetField::Views), Some("Video Views"));
        assert_eq!(mapping.source_for(TargetField::Likes), Some("Likes"));
        assert_eq!(mapping.source_for(TargetField::Comments), Some("Comments"));
        assert_eq!(mapping.source_for(TargetField::Shares), Some("Shares"));
        assert_eq!(mapping.source_for(TargetField::DueDate), Some("Video Create Time"));
        assert_eq!(mapping.source_for(TargetField::TiktokUrl), Some("Share URL"));

        let records = schema.reconcile(&table);
        assert_eq!(
            records,
            vec![ImportRecord {
                title: "My garden tour".into(),
                views: Some(12000),
                likes: Some(850),
                comments: Some(42),
                shares: Some(10),
                due_date: "2026-02-15".into(),
                tiktok_url: "https://tiktok.com/video/111".into(),
                instagram_url: String::new(),
                hashtags: String::new(),
                category: String::new(),
            }]
        );

        let mut existing = Vec::new();
        let summary = merge_into(&mut existing, &records, fixed_now());
        assert_eq!((summary.created, summary.updated, summary.total), (1, 0, 1));
        assert_eq!(existing[0].status, Status::Posted);
        assert_eq!(existing[0].views, 12000);
    }

    #[test]
    fn template_parses_against_the_default_schema() {
        let schema = ImportSchema::default();
        let table = parse_table(TEMPLATE_CSV);
        let mapping = schema.map_columns(&table.headers);
        assert_eq!(mapping.source_for(TargetField::Title), Some("title"));
        assert_eq!(mapping.source_for(TargetField::DueDate), Some("dueDate"));
        assert_eq!(mapping.source_for(TargetField::TiktokUrl), Some("tiktokUrl"));
        assert_eq!(mapping.source_for(TargetField::InstagramUrl), Some("instagramUrl"));
        let records = schema.reconcile(&table);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].views, Some(12000));
    }

    #[test]
    fn custom_schema_loads_from_yaml() {
        let yaml = "fields:\n  - target: views\n    label: Plays\n    aliases: [\"plays\"]\n";
        let schema: ImportSchema = serde_yaml::from_str(yaml).unwrap();
        let mapping = schema.map_columns(&["Plays".to_string()]);
        assert_eq!(mapping.source_for(TargetField::Views), Some("Plays"));
    }
}
