//! Query and custom-rule evaluation over a document sequence.
//!
//! Everything here is pure: the same documents, query and rules always give
//! the same result, in the same relative order as the input.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use shelf_common::api::{
    parse_rule_date, parse_rule_megabytes, Document, FilterRule, RuleKind, RuleOperator,
};

/// Narrow `documents` by the free-text `query` and then by each rule in
/// order (logical AND).
///
/// A non-empty query keeps documents whose name, extracted content or any
/// tag contains it, case-insensitively. A rule that cannot be evaluated
/// (unknown kind, operator not valid for its kind, unparseable value)
/// matches nothing.
pub fn apply<'a>(documents: &'a [Document], query: &str, rules: &[FilterRule]) -> Vec<&'a Document> {
    let mut current: Vec<&Document> = documents.iter().collect();

    if !query.is_empty() {
        let needle = query.to_lowercase();
        current.retain(|doc| matches_query(doc, &needle));
    }

    for rule in rules {
        if current.is_empty() {
            break;
        }
        match Predicate::compile(rule) {
            Some(predicate) => current.retain(|doc| predicate.matches(doc)),
            None => {
                debug!(
                    "filter rule '{}' ({:?} {:?} {:?}) cannot be evaluated; matching nothing",
                    rule.label, rule.kind, rule.operator, rule.value
                );
                current.clear();
            }
        }
    }

    current
}

/// `needle` must already be lowercased.
fn matches_query(doc: &Document, needle: &str) -> bool {
    contains_folded(&doc.name, needle)
        || doc.content.as_deref().is_some_and(|c| contains_folded(c, needle))
        || doc.tags.iter().any(|t| contains_folded(t, needle))
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Entries for the "active filters" strip: the query first, then one
/// `label: value` entry per rule.
pub fn describe_active(query: &str, rules: &[FilterRule]) -> Vec<String> {
    let mut out = Vec::with_capacity(rules.len() + 1);
    if !query.is_empty() {
        out.push(format!("Search: \"{query}\""));
    }
    out.extend(rules.iter().map(|r| format!("{}: {}", r.label, r.value)));
    out
}

/// A rule reduced to the one comparison it performs.
#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    NameContains(String),
    NameEquals(String),
    TagContains(String),
    ContentContains(String),
    UploadedOn(NaiveDate),
    UploadedAfter(DateTime<Utc>),
    UploadedBefore(DateTime<Utc>),
    LargerThan(f64),
    SmallerThan(f64),
}

impl Predicate {
    fn compile(rule: &FilterRule) -> Option<Self> {
        use RuleOperator::*;
        let text = || rule.value.to_lowercase();
        let predicate = match (rule.kind, rule.operator) {
            (RuleKind::NameText, Contains) => Predicate::NameContains(text()),
            (RuleKind::NameText, Equals) => Predicate::NameEquals(text()),
            (RuleKind::TagText, Contains) => Predicate::TagContains(text()),
            (RuleKind::ContentText, Contains) => Predicate::ContentContains(text()),
            (RuleKind::UploadDate, Equals) => Predicate::UploadedOn(parse_rule_date(&rule.value)?.date_naive()),
            (RuleKind::UploadDate, GreaterThan) => Predicate::UploadedAfter(parse_rule_date(&rule.value)?),
            (RuleKind::UploadDate, LessThan) => Predicate::UploadedBefore(parse_rule_date(&rule.value)?),
            (RuleKind::ByteSize, GreaterThan) => Predicate::LargerThan(parse_rule_megabytes(&rule.value)?),
            (RuleKind::ByteSize, LessThan) => Predicate::SmallerThan(parse_rule_megabytes(&rule.value)?),
            _ => return None,
        };
        Some(predicate)
    }

    fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::NameContains(v) => contains_folded(&doc.name, v),
            Predicate::NameEquals(v) => doc.name.to_lowercase() == *v,
            Predicate::TagContains(v) => doc.tags.iter().any(|t| contains_folded(t, v)),
            Predicate::ContentContains(v) => match doc.content.as_deref() {
                Some(content) if !content.is_empty() => contains_folded(content, v),
                _ => false,
            },
            Predicate::UploadedOn(day) => doc.uploaded_at.date_naive() == *day,
            Predicate::UploadedAfter(t) => doc.uploaded_at > *t,
            Predicate::UploadedBefore(t) => doc.uploaded_at < *t,
            Predicate::LargerThan(bytes) => doc.size as f64 > *bytes,
            Predicate::SmallerThan(bytes) => (doc.size as f64) < *bytes,
        }
    }
}
