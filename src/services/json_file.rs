//! Listing source backed by a JSON file written by an external scraper.
//!
//! The file holds an array of records:
//!
//! ```json
//! [{ "id": "rust-101", "title": "Rust 101", "url": "https://example.com/course/rust-101/" }]
//! ```
//!
//! `id` may be omitted; it is then derived from the URL.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::Item;
use crate::utils::normalize_whitespace;
use crate::utils::url::listing_id;

use super::ListingSource;

#[derive(Debug, Deserialize)]
struct ListingRecord {
    #[serde(default)]
    id: Option<String>,
    title: String,
    url: String,
    #[serde(default)]
    instructor: Option<String>,
    #[serde(default)]
    rating: Option<String>,
    #[serde(default)]
    students: Option<String>,
}

pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ListingSource for JsonFileSource {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch(&self) -> Result<Vec<Item>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            AppError::fetch(self.path.display().to_string(), e)
        })?;
        let records: Vec<ListingRecord> = serde_json::from_slice(&bytes)?;
        let now = Utc::now();

        let items = records
            .into_iter()
            .filter_map(|r| {
                let title = normalize_whitespace(&r.title);
                let url = r.url.trim().to_string();
                if title.is_empty() || url.is_empty() {
                    return None;
                }
                let id = r
                    .id
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| listing_id(None, &url));
                Some(Item {
                    id,
                    title,
                    url,
                    discovered_at: now,
                    instructor: r.instructor,
                    rating: r.rating,
                    students: r.students,
                })
            })
            .collect();
        Ok(items)
    }

    async fn probe(&self) -> Result<()> {
        tokio::fs::metadata(&self.path)
            .await
            .map(|_| ())
            .map_err(|e| AppError::fetch(self.path.display().to_string(), e))
    }
}
