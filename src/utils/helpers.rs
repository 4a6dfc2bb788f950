//! Helper functions and utilities
//!
//! This module contains common helper functions used throughout the application.

use std::time::Duration;
use rand::Rng;
use uuid::Uuid;
use crate::utils::errors::{StudyGroupError, Result};

/// Generate a new opaque document id
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Split an id list into lookups no larger than `limit`
pub fn chunk_ids(ids: &[String], limit: usize) -> Vec<Vec<String>> {
    let limit = limit.max(1);
    ids.chunks(limit).map(|chunk| chunk.to_vec()).collect()
}

/// Normalize free-form tags: trimmed, no empties, no duplicates (first
/// occurrence wins). Case is kept as entered.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

/// Validate an optional absolute http(s) URL
pub fn validate_optional_url(field: &str, value: Option<&str>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };

    let parsed = url::Url::parse(value)
        .map_err(|e| StudyGroupError::InvalidArgument(format!("{} is not a valid URL: {}", field, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(StudyGroupError::InvalidArgument(
            format!("{} must use http or https, got {}", field, scheme)
        )),
    }
}

/// Exponential backoff with full jitter, capped at `max_ms`
pub fn backoff_with_jitter(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
    let ceiling = exp.min(max_ms);
    if ceiling == 0 {
        return Duration::ZERO;
    }
    let jittered = rand::thread_rng().gen_range(0..=ceiling);
    Duration::from_millis(jittered)
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_unique() {
        assert_ne!(generate_id(), generate_id());
        assert_eq!(generate_id().len(), 32);
    }

    #[test]
    fn test_chunk_ids() {
        let ids: Vec<String> = (0..65).map(|i| i.to_string()).collect();
        let chunks = chunk_ids(&ids, 30);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 30);
        assert_eq!(chunks[2].len(), 5);
        assert!(chunk_ids(&[], 30).is_empty());
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec![" Math ".to_string(), "Math".to_string(), "".to_string(), "physics".to_string()];
        assert_eq!(normalize_tags(&tags), vec!["Math", "physics"]);
    }

    #[test]
    fn test_validate_optional_url() {
        assert!(validate_optional_url("pic", None).is_ok());
        assert!(validate_optional_url("pic", Some("https://cdn.example.com/a.png")).is_ok());
        assert!(validate_optional_url("pic", Some("not a url")).is_err());
        assert!(validate_optional_url("pic", Some("ftp://example.com/a.png")).is_err());
    }

    #[test]
    fn test_backoff_is_capped() {
        for attempt in 0..20 {
            assert!(backoff_with_jitter(attempt, 10, 200) <= Duration::from_millis(200));
        }
        assert_eq!(backoff_with_jitter(3, 0, 0), Duration::ZERO);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  linear   algebra \n night "), "linear algebra night");
    }
}
