use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use shelf_common::api::{
    pdf_count, Document, DocumentId, FilterRule, Notice, RawFile, RuleId, RuleKind, RuleOperator,
    BYTES_PER_MB,
};
use shelf_common::config::ShelfConfig;
use shelf_common::extract::TextExtractor;
use shelf_extract_pdf::PdfExtractor;
use tokio_util::sync::CancellationToken;

use crate::selection::{SelectAllState, SelectionSet};
use crate::store::DocumentStore;
use crate::surface::Surface;
use crate::upload::{UploadOutcome, UploadPipeline};
use crate::{bulk, filter};

/// What an upload did to the shelf.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub added: Vec<DocumentId>,
    pub rejected: usize,
    pub extraction_failures: usize,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShelfStats {
    pub total: usize,
    /// Total payload size rounded to whole megabytes.
    pub total_size_mb: u64,
    pub uploaded_today: usize,
}

/// Owner of all document-manager state: the documents, the active query and
/// rules, the selection and the open preview.
///
/// Filtering and uploading are delegated to pure functions and the upload
/// pipeline; this type only decides what state they see and stores what
/// they return.
pub struct Shelf {
    store: DocumentStore,
    query: String,
    rules: Vec<FilterRule>,
    selection: SelectionSet,
    preview: Option<DocumentId>,
    pipeline: UploadPipeline,
}

impl Shelf {
    pub fn new(pipeline: UploadPipeline) -> Self {
        Self {
            store: DocumentStore::new(),
            query: String::new(),
            rules: Vec::new(),
            selection: SelectionSet::new(),
            preview: None,
            pipeline,
        }
    }

    /// A shelf extracting text with [`PdfExtractor`] per the upload config.
    pub fn from_config(cfg: &ShelfConfig) -> Self {
        Self::with_extractor(cfg, Arc::new(PdfExtractor))
    }

    pub fn with_extractor(cfg: &ShelfConfig, extractor: Arc<dyn TextExtractor>) -> Self {
        Self::new(UploadPipeline::new(&cfg.upload, extractor))
    }

    // ── Documents ─────────────────────────────────────────────────────────────

    pub fn documents(&self) -> &[Document] {
        self.store.as_slice()
    }

    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.store.get(id)
    }

    /// Run a batch through the upload pipeline and keep what it accepts.
    pub async fn upload(&mut self, files: Vec<RawFile>) -> UploadReport {
        let outcome = self.pipeline.submit(files).await;
        self.ingest(outcome)
    }

    /// As [`upload`](Self::upload), but abandon the batch if `cancel` fires
    /// first. An abandoned batch leaves the shelf untouched.
    pub async fn upload_cancellable(
        &mut self,
        files: Vec<RawFile>,
        cancel: &CancellationToken,
    ) -> Option<UploadReport> {
        let outcome = self.pipeline.submit_cancellable(files, cancel).await?;
        Some(self.ingest(outcome))
    }

    fn ingest(&mut self, outcome: UploadOutcome) -> UploadReport {
        let notices = outcome.notices();
        let added: Vec<DocumentId> = outcome.accepted.iter().map(|d| d.id.clone()).collect();
        self.store.append(outcome.accepted);
        UploadReport {
            added,
            rejected: outcome.rejected,
            extraction_failures: outcome.extraction_failures,
            notices,
        }
    }

    /// Remove one document; also drops it from the selection and closes its
    /// preview. Returns false if no such document exists.
    pub fn remove(&mut self, id: &DocumentId) -> bool {
        let ids: HashSet<DocumentId> = [id.clone()].into();
        self.remove_all(&ids) > 0
    }

    fn remove_all(&mut self, ids: &HashSet<DocumentId>) -> usize {
        let removed = self.store.remove_ids(ids);
        self.selection.prune(&self.store);
        if self.preview.as_ref().is_some_and(|p| ids.contains(p)) {
            self.preview = None;
        }
        for doc in &removed {
            info!("removed {} ({})", doc.name, doc.id);
        }
        removed.len()
    }

    // ── Query and rules ───────────────────────────────────────────────────────

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn clear_query(&mut self) {
        self.query.clear();
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Validate and append a rule; invalid combinations are refused here
    /// rather than left to match nothing.
    pub fn add_rule(
        &mut self,
        label: &str,
        kind: RuleKind,
        operator: RuleOperator,
        value: &str,
    ) -> Result<RuleId> {
        let id = RuleId::new(uuid::Uuid::new_v4().simple().to_string());
        let rule = FilterRule::new(id.clone(), label.trim(), kind, operator, value.trim())?;
        self.rules.push(rule);
        Ok(id)
    }

    pub fn remove_rule(&mut self, id: &RuleId) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| &r.id != id);
        self.rules.len() != before
    }

    /// Clear the query and every rule.
    pub fn clear_filters(&mut self) {
        self.query.clear();
        self.rules.clear();
    }

    pub fn active_filters(&self) -> Vec<String> {
        filter::describe_active(&self.query, &self.rules)
    }

    /// The documents passing the current query and rules, in upload order.
    pub fn visible(&self) -> Vec<&Document> {
        filter::apply(self.store.as_slice(), &self.query, &self.rules)
    }

    /// "Showing 2 of 5 PDFs"
    pub fn summary(&self) -> String {
        format!("Showing {} of {}", self.visible().len(), pdf_count(self.store.len()))
    }

    // ── Selection ─────────────────────────────────────────────────────────────

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// Check or uncheck a document. Unknown ids are ignored.
    pub fn set_selected(&mut self, id: &DocumentId, checked: bool) {
        if self.store.contains(id) {
            self.selection.set(id.clone(), checked);
        }
    }

    /// Select every visible document, or clear the selection.
    pub fn select_all(&mut self, checked: bool) {
        if checked {
            let visible = filter::apply(self.store.as_slice(), &self.query, &self.rules);
            self.selection.select_only(visible);
        } else {
            self.selection.clear();
        }
    }

    pub fn selection_state(&self) -> SelectAllState {
        self.selection.state_for(&self.visible())
    }

    /// Documents a bulk action would touch right now.
    pub fn bulk_targets(&self) -> Vec<&Document> {
        bulk::targets(&self.visible(), &self.selection)
    }

    // ── Download, preview, bulk actions ───────────────────────────────────────

    pub fn download(&self, id: &DocumentId, surface: &dyn Surface) -> Result<()> {
        let Some(doc) = self.store.get(id) else {
            bail!("no document with id {id}");
        };
        surface.download(doc)
    }

    pub fn preview(&mut self, id: &DocumentId, surface: &dyn Surface) -> Result<()> {
        let Some(doc) = self.store.get(id) else {
            bail!("no document with id {id}");
        };
        surface.preview(doc)?;
        self.preview = Some(id.clone());
        Ok(())
    }

    pub fn previewing(&self) -> Option<&Document> {
        self.preview.as_ref().and_then(|id| self.store.get(id))
    }

    pub fn close_preview(&mut self) {
        self.preview = None;
    }

    /// Download the visible documents that are selected, or every visible one
    /// if nothing is selected. With no targets nothing happens and an
    /// advisory is returned.
    pub fn bulk_download(&self, surface: &dyn Surface) -> Result<Notice> {
        let targets = self.bulk_targets();
        if targets.is_empty() {
            return Ok(Notice::destructive(
                "No documents selected",
                "Please select documents to download or ensure your filters return results",
            ));
        }
        for doc in &targets {
            surface.download(doc)?;
        }
        Ok(Notice::info(
            "Download started",
            format!("Downloading {}", pdf_count(targets.len())),
        ))
    }

    /// Remove the visible documents that are selected, or every visible one
    /// if nothing is selected. With no targets nothing happens and an
    /// advisory is returned.
    pub fn bulk_remove(&mut self) -> Notice {
        let ids: HashSet<DocumentId> = self.bulk_targets().iter().map(|d| d.id.clone()).collect();
        if ids.is_empty() {
            return Notice::destructive(
                "No documents selected",
                "Please select documents to remove or ensure your filters return results",
            );
        }
        let removed = self.remove_all(&ids);
        Notice::info("Removed", format!("Removed {}", pdf_count(removed)))
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    /// Quick stats for the filter panel; `today` is a UTC calendar date.
    pub fn stats(&self, today: NaiveDate) -> ShelfStats {
        let docs = self.store.as_slice();
        ShelfStats {
            total: docs.len(),
            total_size_mb: (self.store.total_size() as f64 / BYTES_PER_MB as f64).round() as u64,
            uploaded_today: docs.iter().filter(|d| d.uploaded_at.date_naive() == today).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::testing::{at, doc, ids};
    use shelf_common::api::NoticeLevel;

    #[derive(Default)]
    struct RecordingSurface {
        downloads: RefCell<Vec<String>>,
        previews: RefCell<Vec<String>>,
    }

    impl Surface for RecordingSurface {
        fn download(&self, doc: &Document) -> Result<()> {
            self.downloads.borrow_mut().push(doc.name.clone());
            Ok(())
        }

        fn preview(&self, doc: &Document) -> Result<()> {
            self.previews.borrow_mut().push(doc.name.clone());
            Ok(())
        }
    }

    fn shelf_with(docs: Vec<Document>) -> Shelf {
        let mut shelf = Shelf::new(UploadPipeline::without_extraction());
        shelf.store.replace(docs);
        shelf
    }

    fn three() -> Shelf {
        shelf_with(vec![doc("a", "alpha.pdf"), doc("b", "beta.pdf"), doc("c", "gamma.pdf")])
    }

    #[test]
    fn test_add_rule_validates() {
        let mut shelf = three();
        assert!(shelf.add_rule("big", RuleKind::ByteSize, RuleOperator::Contains, "1").is_err());
        assert!(shelf.add_rule("", RuleKind::NameText, RuleOperator::Contains, "a").is_err());
        assert!(shelf.rules().is_empty());

        let id = shelf.add_rule("has a", RuleKind::NameText, RuleOperator::Contains, "alp").unwrap();
        assert_eq!(ids(&shelf.visible()), vec!["a"]);
        assert_eq!(shelf.active_filters(), vec!["has a: alp"]);

        assert!(shelf.remove_rule(&id));
        assert!(!shelf.remove_rule(&id));
        assert_eq!(shelf.visible().len(), 3);
    }

    #[test]
    fn test_query_and_clear_filters() {
        let mut shelf = three();
        shelf.set_query("BETA");
        shelf.add_rule("pdf", RuleKind::NameText, RuleOperator::Contains, "pdf").unwrap();
        assert_eq!(ids(&shelf.visible()), vec!["b"]);
        assert_eq!(shelf.summary(), "Showing 1 of 3 PDFs");

        shelf.clear_filters();
        assert_eq!(shelf.query(), "");
        assert!(shelf.rules().is_empty());
        assert_eq!(shelf.summary(), "Showing 3 of 3 PDFs");
    }

    #[test]
    fn test_bulk_download_falls_back_to_visible() {
        let shelf = three();
        let surface = RecordingSurface::default();
        let notice = shelf.bulk_download(&surface).unwrap();
        assert_eq!(*surface.downloads.borrow(), vec!["alpha.pdf", "beta.pdf", "gamma.pdf"]);
        assert_eq!(notice.description, "Downloading 3 PDFs");
        assert_eq!(notice.level, NoticeLevel::Info);
    }

    #[test]
    fn test_bulk_download_uses_selection() {
        let mut shelf = three();
        shelf.set_selected(&DocumentId::new("b"), true);
        let surface = RecordingSurface::default();
        let notice = shelf.bulk_download(&surface).unwrap();
        assert_eq!(*surface.downloads.borrow(), vec!["beta.pdf"]);
        assert_eq!(notice.description, "Downloading 1 PDF");
    }

    #[test]
    fn test_bulk_download_nothing_to_do() {
        let mut shelf = three();
        shelf.set_query("no such document");
        let surface = RecordingSurface::default();
        let notice = shelf.bulk_download(&surface).unwrap();
        assert_eq!(notice.level, NoticeLevel::Destructive);
        assert_eq!(notice.title, "No documents selected");
        assert!(surface.downloads.borrow().is_empty());
    }

    #[test]
    fn test_bulk_remove_prunes_selection_and_preview() {
        let mut shelf = three();
        let surface = RecordingSurface::default();
        shelf.preview(&DocumentId::new("a"), &surface).unwrap();
        shelf.set_selected(&DocumentId::new("a"), true);
        shelf.set_selected(&DocumentId::new("c"), true);

        let notice = shelf.bulk_remove();
        assert_eq!(notice.description, "Removed 2 PDFs");
        assert_eq!(ids(&shelf.documents().iter().collect::<Vec<_>>()), vec!["b"]);
        assert!(shelf.selection().is_empty());
        assert!(shelf.previewing().is_none());
    }

    #[test]
    fn test_bulk_remove_empty_is_advisory() {
        let mut shelf = shelf_with(vec![]);
        let notice = shelf.bulk_remove();
        assert_eq!(notice.level, NoticeLevel::Destructive);
    }

    #[test]
    fn test_select_all_follows_visible() {
        let mut shelf = three();
        shelf.set_query("a.pdf"); // alpha, beta, gamma all end in "a.pdf"
        shelf.add_rule("not beta", RuleKind::NameText, RuleOperator::Contains, "m").unwrap();
        shelf.select_all(true);
        assert_eq!(shelf.selection().len(), 1);
        assert_eq!(shelf.selection_state(), SelectAllState::All);
        shelf.select_all(false);
        assert_eq!(shelf.selection_state(), SelectAllState::Nothing);
    }

    #[test]
    fn test_set_selected_ignores_unknown_ids() {
        let mut shelf = three();
        shelf.set_selected(&DocumentId::new("nope"), true);
        assert!(shelf.selection().is_empty());
    }

    #[test]
    fn test_download_and_preview_single() {
        let mut shelf = three();
        let surface = RecordingSurface::default();
        shelf.download(&DocumentId::new("c"), &surface).unwrap();
        assert_eq!(*surface.downloads.borrow(), vec!["gamma.pdf"]);
        assert!(shelf.download(&DocumentId::new("zzz"), &surface).is_err());

        shelf.preview(&DocumentId::new("b"), &surface).unwrap();
        assert_eq!(shelf.previewing().map(|d| d.name.as_str()), Some("beta.pdf"));
        shelf.close_preview();
        assert!(shelf.previewing().is_none());
    }

    #[test]
    fn test_remove_single() {
        let mut shelf = three();
        assert!(shelf.remove(&DocumentId::new("b")));
        assert!(!shelf.remove(&DocumentId::new("b")));
        assert_eq!(shelf.documents().len(), 2);
    }

    #[test]
    fn test_stats() {
        let mut big = doc("big", "big.pdf");
        big.size = 3 * BYTES_PER_MB;
        big.uploaded_at = at(2024, 2, 1, 8);
        let mut half = doc("half", "half.pdf");
        half.size = BYTES_PER_MB / 2;
        half.uploaded_at = at(2024, 2, 1, 23);
        let shelf = shelf_with(vec![big, half, doc("old", "old.pdf")]);

        let stats = shelf.stats(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(stats.total, 3);
        assert_eq!(stats.total_size_mb, 4);
        assert_eq!(stats.uploaded_today, 2);
    }

    #[tokio::test]
    async fn test_upload_appends_and_reports() {
        let mut shelf = three();
        let report = shelf
            .upload(vec![
                RawFile::new("new.pdf", "application/pdf", b"%PDF".to_vec()),
                RawFile::new("photo.png", "image/png", vec![1, 2, 3]),
            ])
            .await;
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.notices.len(), 2);
        assert_eq!(report.notices[0].description, "1 PDF uploaded successfully");
        assert_eq!(shelf.documents().len(), 4);
        assert_eq!(shelf.documents()[3].name, "new.pdf");
    }

    #[tokio::test]
    async fn test_broken_pdf_is_kept_without_content() {
        let mut shelf = Shelf::from_config(&ShelfConfig::default());
        let report = shelf
            .upload(vec![
                RawFile::new("broken.pdf", "application/pdf", b"not really a pdf".to_vec()),
                RawFile::new("notes.txt", "text/plain", b"hello".to_vec()),
            ])
            .await;
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.extraction_failures, 1);

        let stored = shelf.document(&report.added[0]).unwrap();
        assert_eq!(stored.name, "broken.pdf");
        assert_eq!(stored.content.as_deref(), Some(""));

        shelf.add_rule("text", RuleKind::ContentText, RuleOperator::Contains, "pdf").unwrap();
        assert!(shelf.visible().is_empty());
    }

    #[tokio::test]
    async fn test_filtered_view_drives_bulk_targets() {
        let mut shelf = Shelf::new(UploadPipeline::without_extraction());
        let files = ["q1-report.pdf", "q2-report.pdf", "q3-report.pdf", "invoice.pdf"]
            .into_iter()
            .map(|name| RawFile::new(name, "application/pdf", vec![0; 10]))
            .collect();
        shelf.upload(files).await;

        shelf.set_query("report");
        assert_eq!(shelf.visible().len(), 3);
        assert_eq!(shelf.bulk_targets().len(), 3);

        let q2 = shelf.visible()[1].id.clone();
        shelf.set_selected(&q2, true);
        assert_eq!(shelf.selection_state().label(), "1 selected");
        let targets: Vec<&str> = shelf.bulk_targets().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(targets, vec!["q2-report.pdf"]);

        // A selection filtered out of view is not acted on.
        shelf.set_query("invoice");
        assert!(shelf.bulk_targets().is_empty());
        let surface = RecordingSurface::default();
        let notice = shelf.bulk_download(&surface).unwrap();
        assert_eq!(notice.level, NoticeLevel::Destructive);
        assert_eq!(notice.title, "No documents selected");
        assert!(surface.downloads.borrow().is_empty());

        let notice = shelf.bulk_remove();
        assert_eq!(notice.level, NoticeLevel::Destructive);
        assert_eq!(shelf.documents().len(), 4);
        // Still selected once it is visible again.
        assert!(shelf.selection().contains(&q2));
    }

    #[test]
    fn test_bulk_remove_spares_hidden_selection() {
        let mut shelf = shelf_with(vec![doc("a", "alpha.pdf"), doc("b", "beta.pdf")]);
        shelf.set_selected(&DocumentId::new("a"), true);
        shelf.set_query("beta");

        let notice = shelf.bulk_remove();
        assert_eq!(notice.title, "No documents selected");
        assert_eq!(ids(&shelf.documents().iter().collect::<Vec<_>>()), vec!["a", "b"]);
        assert_eq!(shelf.selection_state(), SelectAllState::Nothing);

        shelf.set_selected(&DocumentId::new("b"), true);
        let notice = shelf.bulk_remove();
        assert_eq!(notice.description, "Removed 1 PDF");
        assert_eq!(ids(&shelf.documents().iter().collect::<Vec<_>>()), vec!["a"]);
        assert!(shelf.selection().contains(&DocumentId::new("a")));
    }

    #[tokio::test]
    async fn test_cancelled_upload_leaves_shelf_untouched() {
        let mut shelf = three();
        let token = CancellationToken::new();
        token.cancel();
        let report = shelf
            .upload_cancellable(vec![RawFile::new("new.pdf", "application/pdf", vec![])], &token)
            .await;
        assert!(report.is_none());
        assert_eq!(shelf.documents().len(), 3);
    }
}
