/// Trait implemented by each content extractor.
///
/// Implementations are synchronous and CPU-bound; the upload pipeline runs
/// them on the blocking pool, one call per file, so an implementation must
/// not keep mutable state between calls.
pub trait TextExtractor: Send + Sync {
    /// Media types this extractor understands.
    fn accepts(&self, media_type: &str) -> bool;

    /// Best-effort plain text of `bytes`. `name` is only used for logging.
    fn extract(&self, bytes: &[u8], name: &str) -> anyhow::Result<String>;
}
