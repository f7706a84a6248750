use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shelf_common::api::{
    is_pdf_media_type, normalize_tags, pdf_count, Document, DocumentId, Notice, RawFile,
    PDF_MEDIA_TYPE,
};
use shelf_common::config::UploadConfig;
use shelf_common::extract::TextExtractor;

/// Result of one upload batch.
#[derive(Debug, Clone, Default)]
pub struct UploadOutcome {
    /// Valid documents, in the order their files were submitted.
    pub accepted: Vec<Document>,
    /// Files rejected for not declaring the PDF media type.
    pub rejected: usize,
    /// Accepted documents whose text extraction failed or timed out; they
    /// are still in `accepted`, with empty content.
    pub extraction_failures: usize,
}

impl UploadOutcome {
    /// User-facing messages for this batch, success first.
    pub fn notices(&self) -> Vec<Notice> {
        let mut notices = Vec::new();
        if !self.accepted.is_empty() {
            notices.push(Notice::info(
                "Success",
                format!("{} uploaded successfully", pdf_count(self.accepted.len())),
            ));
        }
        if self.rejected > 0 {
            let n = self.rejected;
            notices.push(Notice::destructive(
                "Some files skipped",
                format!(
                    "{n} non-PDF file{} {} skipped. Only PDF files are allowed.",
                    if n == 1 { "" } else { "s" },
                    if n == 1 { "was" } else { "were" },
                ),
            ));
        }
        notices
    }
}

/// Validates raw files and turns them into documents, extracting text from
/// each accepted file in its own task.
///
/// Extraction fans out one task per file (bounded by a semaphore, each with
/// its own timeout) and the batch waits for all of them before returning.
/// A failure only empties that one document's content. An extraction that
/// times out keeps its semaphore slot until the extractor actually returns.
pub struct UploadPipeline {
    extractor: Option<Arc<dyn TextExtractor>>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl UploadPipeline {
    pub fn new(cfg: &UploadConfig, extractor: Arc<dyn TextExtractor>) -> Self {
        let extractor = if !cfg.extract_text {
            None
        } else if !extractor.accepts(PDF_MEDIA_TYPE) {
            warn!("configured text extractor does not accept {PDF_MEDIA_TYPE}; extraction disabled");
            None
        } else {
            Some(extractor)
        };
        Self {
            extractor,
            timeout: cfg.extract_timeout(),
            permits: Arc::new(Semaphore::new(cfg.max_concurrent_extractions.max(1))),
        }
    }

    /// A pipeline that only validates; documents get `content: None`.
    pub fn without_extraction() -> Self {
        Self {
            extractor: None,
            timeout: UploadConfig::default().extract_timeout(),
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn extracts_text(&self) -> bool {
        self.extractor.is_some()
    }

    /// Validate and ingest one batch.
    ///
    /// Dropping the returned future aborts any extraction still queued; the
    /// caller then has no result at all for the batch.
    pub async fn submit(&self, files: Vec<RawFile>) -> UploadOutcome {
        let total = files.len();
        let mut rejected = 0;
        let mut accepted: Vec<Document> = Vec::with_capacity(total);

        for file in files {
            if !is_pdf_media_type(&file.media_type) {
                debug!("skipping {} (declared {:?})", file.name, file.media_type);
                rejected += 1;
                continue;
            }
            accepted.push(into_document(file));
        }

        let mut extraction_failures = 0;
        if let Some(extractor) = &self.extractor {
            let contents = self.extract_all(extractor, &accepted).await;
            for (doc, content) in accepted.iter_mut().zip(contents) {
                doc.content = Some(content.unwrap_or_else(|| {
                    extraction_failures += 1;
                    String::new()
                }));
            }
        }

        info!(
            "upload batch: {} file(s), {} accepted, {} rejected, {} extraction failure(s)",
            total,
            accepted.len(),
            rejected,
            extraction_failures
        );

        UploadOutcome { accepted, rejected, extraction_failures }
    }

    /// Like [`submit`](Self::submit), but gives up as soon as `cancel` fires.
    /// A cancelled batch yields `None`; nothing partial is returned.
    pub async fn submit_cancellable(
        &self,
        files: Vec<RawFile>,
        cancel: &CancellationToken,
    ) -> Option<UploadOutcome> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("upload batch cancelled");
                None
            }
            outcome = self.submit(files) => Some(outcome),
        }
    }

    /// One slot per document: `Some(text)` on success, `None` on failure.
    async fn extract_all(
        &self,
        extractor: &Arc<dyn TextExtractor>,
        docs: &[Document],
    ) -> Vec<Option<String>> {
        let mut tasks = JoinSet::new();
        for (idx, doc) in docs.iter().enumerate() {
            let extractor = Arc::clone(extractor);
            let payload = Arc::clone(&doc.payload);
            let name = doc.name.clone();
            let permits = Arc::clone(&self.permits);
            let limit = self.timeout;

            tasks.spawn(async move {
                // The semaphore is never closed, so acquire cannot fail.
                let permit = permits.acquire_owned().await.ok();
                // The permit travels with the blocking job: an extraction that
                // outlives its timeout still holds its slot until it returns.
                let job = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    extractor.extract(&payload, &name)
                });
                let result = match tokio::time::timeout(limit, job).await {
                    Ok(Ok(Ok(text))) => Ok(text),
                    Ok(Ok(Err(e))) => Err(format!("{e:#}")),
                    Ok(Err(e)) => Err(format!("extractor task failed: {e}")),
                    Err(_) => Err(format!("timed out after {}s", limit.as_secs_f64())),
                };
                (idx, result)
            });
        }

        let mut contents: Vec<Option<String>> = vec![None; docs.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(text))) => contents[idx] = Some(text),
                Ok((idx, Err(reason))) => {
                    warn!("text extraction failed for {}: {reason}", docs[idx].name);
                }
                Err(e) => warn!("text extraction task lost: {e}"),
            }
        }
        contents
    }
}

fn into_document(file: RawFile) -> Document {
    let size = file.bytes.len() as u64;
    Document {
        id: DocumentId::new(uuid::Uuid::new_v4().simple().to_string()),
        name: file.name,
        payload: Arc::from(file.bytes),
        uploaded_at: Utc::now(),
        size,
        tags: normalize_tags(&file.tags),
        content: None,
    }
}
