use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use shelf_common::api::{Document, DocumentId};

/// A document with a 1 KB payload uploaded at 2024-01-15T10:00:00Z.
pub fn doc(id: &str, name: &str) -> Document {
    Document {
        id: DocumentId::new(id),
        name: name.to_string(),
        payload: Arc::from(vec![0u8; 1024]),
        uploaded_at: at(2024, 1, 15, 10),
        size: 1024,
        tags: Vec::new(),
        content: None,
    }
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

pub fn ids(docs: &[&Document]) -> Vec<String> {
    docs.iter().map(|d| d.id.to_string()).collect()
}
