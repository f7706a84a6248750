use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The only declared media type the upload pipeline accepts.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Megabyte multiplier used by the size rule and the library stats.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

pub fn is_pdf_media_type(media_type: &str) -> bool {
    media_type == PDF_MEDIA_TYPE
}

/// "1 PDF" / "3 PDFs" — shared by every notice that counts documents.
pub fn pdf_count(n: usize) -> String {
    format!("{n} PDF{}", if n == 1 { "" } else { "s" })
}

/// Human-readable byte count: base 1024, at most two decimals, trailing
/// zeros dropped. `0` renders as `"0 Bytes"`; anything past GB stays in GB.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".into();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Opaque document identifier, unique within a library for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Documents ─────────────────────────────────────────────────────────────────

/// An uploaded PDF held in memory.
///
/// Created only by the upload pipeline and never mutated afterwards; the
/// store hands out shared references only.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    /// Original filename, also used as the download name.
    pub name: String,
    /// Original bytes. Shared so snapshots and surfaces never copy them.
    pub payload: Arc<[u8]>,
    pub uploaded_at: DateTime<Utc>,
    pub size: u64,
    /// Ordered set: first-appearance order, no duplicates, no blanks.
    pub tags: Vec<String>,
    /// `None` when extraction was disabled; `Some("")` when it failed.
    pub content: Option<String>,
}

impl Document {
    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            uploaded_at: self.uploaded_at,
            size: self.size,
            size_label: format_file_size(self.size),
            tags: self.tags.clone(),
            has_content: self.content.as_deref().is_some_and(|c| !c.is_empty()),
        }
    }
}

/// Payload-free view of a [`Document`] for hosts to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    pub size: u64,
    pub size_label: String,
    pub tags: Vec<String>,
    pub has_content: bool,
}

/// Trim, drop blanks and drop repeats while keeping first-appearance order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// A file handed to the upload pipeline by the host, before validation.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    /// Media type as declared by the host (browser `File.type`, OS guess, ...).
    pub media_type: String,
    pub bytes: Vec<u8>,
    pub tags: Vec<String>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Read a file from disk, declaring its media type from the extension the
    /// way a browser file picker would.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream");
        Ok(Self::new(name, media_type, bytes))
    }
}

// ── Filter rules ──────────────────────────────────────────────────────────────

/// What a custom filter rule compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    NameText,
    UploadDate,
    ByteSize,
    TagText,
    ContentText,
    /// Any kind this build does not know. Such rules match nothing.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleOperator {
    Contains,
    Equals,
    GreaterThan,
    LessThan,
    #[serde(other)]
    Unknown,
}

impl RuleKind {
    /// Kinds offered to users, in panel order.
    pub const ALL: [RuleKind; 5] = [
        RuleKind::NameText,
        RuleKind::UploadDate,
        RuleKind::ByteSize,
        RuleKind::TagText,
        RuleKind::ContentText,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RuleKind::NameText => "File Name",
            RuleKind::UploadDate => "Upload Date",
            RuleKind::ByteSize => "File Size",
            RuleKind::TagText => "Tags",
            RuleKind::ContentText => "Content",
            RuleKind::Unknown => "Unknown",
        }
    }

    /// Operators valid for this kind, with their user-facing labels.
    pub fn operators(self) -> &'static [(RuleOperator, &'static str)] {
        use RuleOperator::*;
        match self {
            RuleKind::NameText => &[(Contains, "Contains"), (Equals, "Equals")],
            RuleKind::UploadDate => &[(Equals, "On date"), (GreaterThan, "After"), (LessThan, "Before")],
            RuleKind::ByteSize => &[(GreaterThan, "Larger than"), (LessThan, "Smaller than")],
            RuleKind::TagText | RuleKind::ContentText => &[(Contains, "Contains")],
            RuleKind::Unknown => &[],
        }
    }

    pub fn supports(self, operator: RuleOperator) -> bool {
        self.operators().iter().any(|(op, _)| *op == operator)
    }

    pub fn operator_label(self, operator: RuleOperator) -> Option<&'static str> {
        self.operators()
            .iter()
            .find(|(op, _)| *op == operator)
            .map(|(_, label)| *label)
    }

    /// Input hint for the value field.
    pub fn placeholder(self) -> &'static str {
        match self {
            RuleKind::NameText => "Enter file name...",
            RuleKind::UploadDate => "YYYY-MM-DD",
            RuleKind::ByteSize => "Size in MB...",
            RuleKind::TagText => "Enter tag...",
            RuleKind::ContentText => "Search content...",
            RuleKind::Unknown => "",
        }
    }
}

/// Parse an upload-date rule value into the instant it denotes.
///
/// A bare `YYYY-MM-DD` date denotes the start of that day in UTC; an RFC 3339
/// timestamp denotes itself.
pub fn parse_rule_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a byte-size rule value (decimal megabytes) into bytes.
pub fn parse_rule_megabytes(value: &str) -> Option<f64> {
    let mb: f64 = value.trim().parse().ok()?;
    if !mb.is_finite() {
        return None;
    }
    Some(mb * BYTES_PER_MB as f64)
}

/// A user-defined predicate narrowing the visible documents.
///
/// Rules are never edited in place; an edit is a remove followed by an add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub id: RuleId,
    pub label: String,
    pub kind: RuleKind,
    pub operator: RuleOperator,
    pub value: String,
}

impl FilterRule {
    /// Build a rule, rejecting anything the evaluator would silently ignore.
    pub fn new(
        id: RuleId,
        label: impl Into<String>,
        kind: RuleKind,
        operator: RuleOperator,
        value: impl Into<String>,
    ) -> Result<Self> {
        let rule = Self {
            id,
            label: label.into(),
            kind,
            operator,
            value: value.into(),
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            bail!("filter rule needs a name");
        }
        if self.value.trim().is_empty() {
            bail!("filter rule needs a value");
        }
        if !self.kind.supports(self.operator) {
            bail!(
                "operator {:?} is not valid for {} rules",
                self.operator,
                self.kind.label()
            );
        }
        match self.kind {
            RuleKind::UploadDate if parse_rule_date(&self.value).is_none() => {
                bail!("invalid date '{}', expected YYYY-MM-DD", self.value)
            }
            RuleKind::ByteSize if parse_rule_megabytes(&self.value).is_none() => {
                bail!("invalid size '{}', expected a number of megabytes", self.value)
            }
            _ => Ok(()),
        }
    }

    /// `File Size larger than "2"` style description for the active-rule list.
    pub fn describe(&self) -> String {
        let op = self
            .kind
            .operator_label(self.operator)
            .map(str::to_lowercase)
            .unwrap_or_else(|| format!("{:?}", self.operator).to_lowercase());
        format!("{} {} \"{}\"", self.kind.label(), op, self.value)
    }
}

// ── Notices ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    /// Advisory about an aborted or partially rejected action.
    Destructive,
}

/// A user-facing message produced by an action; hosts decide how to show it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub level: NoticeLevel,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            level: NoticeLevel::Info,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            level: NoticeLevel::Destructive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(kind: RuleKind, operator: RuleOperator, value: &str) -> Result<FilterRule> {
        FilterRule::new(RuleId::new("r1"), "my rule", kind, operator, value)
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(1), "1 Bytes");
        assert_eq!(format_file_size(1023), "1023 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * BYTES_PER_MB), "2 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
        assert_eq!(format_file_size(5 * 1024 * BYTES_PER_MB * 1024), "5120 GB");
    }

    #[test]
    fn test_pdf_count() {
        assert_eq!(pdf_count(0), "0 PDFs");
        assert_eq!(pdf_count(1), "1 PDF");
        assert_eq!(pdf_count(7), "7 PDFs");
    }

    #[test]
    fn test_pdf_media_type() {
        assert!(is_pdf_media_type("application/pdf"));
        assert!(!is_pdf_media_type("text/plain"));
        assert!(!is_pdf_media_type(""));
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags([" invoice", "2024", "", "invoice", "  ", "Invoice"]);
        assert_eq!(tags, vec!["invoice", "2024", "Invoice"]);
    }

    #[test]
    fn test_rule_kind_operators() {
        assert!(RuleKind::NameText.supports(RuleOperator::Equals));
        assert!(RuleKind::UploadDate.supports(RuleOperator::LessThan));
        assert!(!RuleKind::ByteSize.supports(RuleOperator::Contains));
        assert!(!RuleKind::TagText.supports(RuleOperator::Equals));
        assert!(!RuleKind::ContentText.supports(RuleOperator::GreaterThan));
        assert!(!RuleKind::Unknown.supports(RuleOperator::Contains));
        assert_eq!(RuleKind::UploadDate.operator_label(RuleOperator::GreaterThan), Some("After"));
    }

    #[test]
    fn test_rule_new_validates() {
        assert!(rule(RuleKind::NameText, RuleOperator::Contains, "report").is_ok());
        assert!(rule(RuleKind::UploadDate, RuleOperator::Equals, "2024-01-15").is_ok());
        assert!(rule(RuleKind::ByteSize, RuleOperator::GreaterThan, "1.5").is_ok());

        assert!(rule(RuleKind::TagText, RuleOperator::Equals, "x").is_err());
        assert!(rule(RuleKind::UploadDate, RuleOperator::Equals, "yesterday").is_err());
        assert!(rule(RuleKind::ByteSize, RuleOperator::LessThan, "big").is_err());
        assert!(rule(RuleKind::NameText, RuleOperator::Contains, "   ").is_err());
        assert!(FilterRule::new(RuleId::new("r"), "", RuleKind::NameText, RuleOperator::Contains, "a").is_err());
    }

    #[test]
    fn test_rule_describe() {
        let r = rule(RuleKind::ByteSize, RuleOperator::GreaterThan, "2").unwrap();
        assert_eq!(r.describe(), "File Size larger than \"2\"");
        let r = rule(RuleKind::UploadDate, RuleOperator::Equals, "2024-01-15").unwrap();
        assert_eq!(r.describe(), "Upload Date on date \"2024-01-15\"");
    }

    #[test]
    fn test_parse_rule_date() {
        let d = parse_rule_date("2024-01-15").unwrap();
        assert_eq!(d.to_rfc3339(), "2024-01-15T00:00:00+00:00");
        let d = parse_rule_date("2024-01-15T10:30:00+02:00").unwrap();
        assert_eq!(d.to_rfc3339(), "2024-01-15T08:30:00+00:00");
        assert!(parse_rule_date("15/01/2024").is_none());
    }

    #[test]
    fn test_parse_rule_megabytes() {
        assert_eq!(parse_rule_megabytes("1"), Some(1_048_576.0));
        assert_eq!(parse_rule_megabytes(" 0.5 "), Some(524_288.0));
        assert!(parse_rule_megabytes("NaN").is_none());
        assert!(parse_rule_megabytes("inf").is_none());
        assert!(parse_rule_megabytes("").is_none());
    }

    #[test]
    fn test_rule_serde_tags() {
        let json = r#"{"id":"a","label":"big","kind":"byte-size","operator":"greater-than","value":"3"}"#;
        let r: FilterRule = serde_json::from_str(json).unwrap();
        assert_eq!(r.kind, RuleKind::ByteSize);
        assert_eq!(r.operator, RuleOperator::GreaterThan);

        let json = r#"{"id":"b","label":"range","kind":"page-count","operator":"between","value":"1"}"#;
        let r: FilterRule = serde_json::from_str(json).unwrap();
        assert_eq!(r.kind, RuleKind::Unknown);
        assert_eq!(r.operator, RuleOperator::Unknown);
        assert!(r.validate().is_err());
    }

    #[tokio::test]
    async fn test_raw_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("Report.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, b"hello").unwrap();

        let f = RawFile::from_path(&pdf).await.unwrap();
        assert_eq!(f.name, "Report.pdf");
        assert_eq!(f.media_type, PDF_MEDIA_TYPE);
        assert_eq!(f.bytes, b"%PDF-1.4");

        let f = RawFile::from_path(&txt).await.unwrap();
        assert_eq!(f.media_type, "text/plain");

        assert!(RawFile::from_path(&dir.path().join("missing.pdf")).await.is_err());
    }
}
