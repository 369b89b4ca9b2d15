// src/services/listings.rs

//! HTML listing source.
//!
//! Fetches the configured listing pages in order and extracts items with
//! CSS selectors. Pages that fail are skipped; the fetch only fails when
//! every page failed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Item, SourceConfig};
use crate::utils::url::{listing_id, resolve};
use crate::utils::{clean_text, http, normalize_whitespace};

use super::ListingSource;

/// Parsed selector set.
struct Selectors {
    item: Selector,
    title: Selector,
    link: Option<Selector>,
    instructor: Option<Selector>,
    rating: Option<Selector>,
    students: Option<Selector>,
}

/// Listing source that scrapes HTML pages.
pub struct HtmlListingSource {
    client: Client,
    urls: Vec<String>,
    selectors: Selectors,
    attr_name: String,
    id_attr: Option<String>,
    id_pattern: Option<Regex>,
    title_remove_patterns: Vec<String>,
}

impl HtmlListingSource {
    pub fn new(config: &SourceConfig, client: Client) -> Result<Self> {
        let s = &config.selectors;
        let selectors = Selectors {
            item: parse_selector(&s.item_selector)?,
            title: parse_selector(&s.title_selector)?,
            link: parse_optional(s.link_selector.as_deref())?,
            instructor: parse_optional(s.instructor_selector.as_deref())?,
            rating: parse_optional(s.rating_selector.as_deref())?,
            students: parse_optional(s.students_selector.as_deref())?,
        };
        let id_pattern = config
            .id_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| AppError::config(format!("invalid source.id_pattern: {e}")))?;

        Ok(Self {
            client,
            urls: config.urls.clone(),
            selectors,
            attr_name: s.attr_name.clone(),
            id_attr: s.id_attr.clone(),
            id_pattern,
            title_remove_patterns: config.title_remove_patterns.clone(),
        })
    }

    /// Extract every item on one page.
    fn parse_listing(&self, html: &str, page_url: &Url, now: DateTime<Utc>) -> Vec<Item> {
        let document = Html::parse_document(html);
        document
            .select(&self.selectors.item)
            .filter_map(|element| self.parse_item(element, page_url, now))
            .collect()
    }

    fn parse_item(&self, element: ElementRef<'_>, base: &Url, now: DateTime<Utc>) -> Option<Item> {
        let title_elem = element.select(&self.selectors.title).next()?;
        let raw_title: String = title_elem.text().collect();
        let title = clean_text(&raw_title, &self.title_remove_patterns);
        if title.is_empty() {
            return None;
        }

        let link_elem = self
            .selectors
            .link
            .as_ref()
            .and_then(|sel| element.select(sel).next())
            .unwrap_or(title_elem);
        let raw_link = link_elem
            .value()
            .attr(&self.attr_name)
            .or_else(|| element.value().attr(&self.attr_name))?;
        let url = resolve(base, raw_link);

        let id = self
            .id_attr
            .as_deref()
            .and_then(|attr| element.value().attr(attr))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| listing_id(self.id_pattern.as_ref(), &url));

        Some(Item {
            id,
            title,
            url,
            discovered_at: now,
            instructor: text_of(element, self.selectors.instructor.as_ref()),
            rating: text_of(element, self.selectors.rating.as_ref()),
            students: text_of(element, self.selectors.students.as_ref()),
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<Item>> {
        let page_url = Url::parse(url)?;
        let body = http::fetch_text(&self.client, url).await?;
        Ok(self.parse_listing(&body, &page_url, Utc::now()))
    }
}

#[async_trait]
impl ListingSource for HtmlListingSource {
    fn name(&self) -> &str {
        "html"
    }

    async fn fetch(&self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut failures = 0;
        let mut last_error = None;

        for url in &self.urls {
            match self.fetch_page(url).await {
                Ok(found) => {
                    log::debug!("{} listings on {}", found.len(), url);
                    items.extend(found);
                }
                Err(e) => {
                    failures += 1;
                    log::warn!("Failed to fetch listing page {}: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        if failures == self.urls.len() {
            return Err(last_error
                .unwrap_or_else(|| AppError::fetch("html", "no listing pages configured")));
        }
        if failures > 0 {
            log::warn!(
                "{}/{} listing pages failed, returning partial results",
                failures,
                self.urls.len()
            );
        }
        Ok(items)
    }

    async fn probe(&self) -> Result<()> {
        let url = self
            .urls
            .first()
            .ok_or_else(|| AppError::fetch("html", "no listing pages configured"))?;
        http::check_reachable(&self.client, url).await
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn parse_optional(s: Option<&str>) -> Result<Option<Selector>> {
    s.map(parse_selector).transpose()
}

fn text_of(element: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    let found = element.select(selector?).next()?;
    let text = normalize_whitespace(&found.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}
