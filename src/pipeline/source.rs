//! Ownership of the live listing source.
//!
//! The source sits behind an async mutex. A poll cycle holds the lock for
//! its whole duration, so the health tick can only probe or recreate the
//! source between cycles.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{AppError, Result};
use crate::services::{ListingSource, SourceFactory};

type Slot = Option<Box<dyn ListingSource>>;

pub struct SourceSlot {
    factory: Arc<dyn SourceFactory>,
    current: Mutex<Slot>,
}

impl SourceSlot {
    /// Create the first source eagerly. Failure here is a startup error.
    pub fn open(factory: Arc<dyn SourceFactory>) -> Result<Self> {
        let source = factory.create()?;
        log::info!("Listing source ready: {}", source.name());
        Ok(Self {
            factory,
            current: Mutex::new(Some(source)),
        })
    }

    /// Wait for exclusive use of the source.
    pub async fn acquire(&self) -> ActiveSource<'_> {
        ActiveSource {
            factory: self.factory.as_ref(),
            guard: self.current.lock().await,
        }
    }
}

/// Exclusive handle on the slot, held for the duration of a cycle or tick.
pub struct ActiveSource<'a> {
    factory: &'a dyn SourceFactory,
    guard: MutexGuard<'a, Slot>,
}

impl ActiveSource<'_> {
    /// The live source, recreated first if the slot is empty.
    pub fn ensure(&mut self) -> Result<&dyn ListingSource> {
        if self.guard.is_none() {
            let source = self
                .factory
                .create()
                .map_err(|e| AppError::SourceUnavailable(e.to_string()))?;
            log::info!("Listing source recreated: {}", source.name());
            *self.guard = Some(source);
        }
        self.guard
            .as_deref()
            .ok_or_else(|| AppError::SourceUnavailable("slot is empty".into()))
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_none()
    }

    /// Discard the current source and build a fresh one.
    ///
    /// On failure the slot is left empty; the next `ensure` tries again.
    pub async fn recover(&mut self) -> Result<()> {
        self.release().await;
        let source = self
            .factory
            .create()
            .map_err(|e| AppError::SourceUnavailable(e.to_string()))?;
        log::info!("Listing source replaced: {}", source.name());
        *self.guard = Some(source);
        Ok(())
    }

    /// Close and drop the current source, if any.
    pub async fn release(&mut self) {
        if let Some(source) = self.guard.take() {
            source.close().await;
            log::debug!("Listing source {} released", source.name());
        }
    }
}
