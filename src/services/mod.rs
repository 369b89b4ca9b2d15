//! Collaborators of the poll cycle.
//!
//! This module contains:
//! - Listing sources (`HtmlListingSource`, `JsonFileSource`) behind `ListingSource`
//! - Source construction for startup and recovery (`ConfigSourceFactory`)
//! - Digest rendering (`Digest`)
//! - Digest delivery (`SmtpNotifier`, `OutboxNotifier`, `WebhookNotifier`) behind `Notifier`

mod digest;
mod json_file;
mod listings;
mod notifiers;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Config, Item, SourceKind};
use crate::utils::http;

pub use digest::Digest;
pub use json_file::JsonFileSource;
pub use listings::HtmlListingSource;
pub use notifiers::{OutboxNotifier, SmtpNotifier, WebhookNotifier, build_notifier};

/// Produces the current candidate listings.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Fetch the current listings. May return a partial list.
    async fn fetch(&self) -> Result<Vec<Item>>;

    /// Cheap liveness check used by the health tick.
    async fn probe(&self) -> Result<()>;

    /// Release held resources before the source is dropped.
    async fn close(&self) {}
}

/// Creates listing sources; called at startup and on every recovery.
pub trait SourceFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn ListingSource>>;
}

/// Delivers digests of new items.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a digest for a non-empty batch. `true` means delivered.
    async fn notify(&self, items: &[Item]) -> bool;

    /// Deliver a free-form message (startup announcement, test message).
    async fn announce(&self, subject: &str, body: &str) -> bool;
}

/// Builds the listing source described by the configuration.
pub struct ConfigSourceFactory {
    config: Arc<Config>,
}

impl ConfigSourceFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl SourceFactory for ConfigSourceFactory {
    fn create(&self) -> Result<Box<dyn ListingSource>> {
        let source = &self.config.source;
        match source.kind {
            SourceKind::Html => {
                let client = http::create_client(&self.config.http)?;
                Ok(Box::new(HtmlListingSource::new(source, client)?))
            }
            SourceKind::JsonFile => Ok(Box::new(JsonFileSource::new(&source.path))),
        }
    }
}
