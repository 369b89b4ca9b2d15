//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::{AppError, Result};
use crate::models::Item;
use crate::services::{ListingSource, Notifier, SourceFactory};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

pub fn item(id: &str, title: &str) -> Item {
    Item::new(id, title, format!("https://example.com/course/{id}/"), start_time())
}

/// Queue of fetch responses shared by every source a factory creates.
///
/// An empty queue answers with an empty list.
#[derive(Default)]
pub struct Script {
    responses: Mutex<VecDeque<Option<Vec<Item>>>>,
    fetches: AtomicUsize,
    probes: AtomicUsize,
    closes: AtomicUsize,
    probe_fails: AtomicBool,
}

impl Script {
    pub fn push_items(&self, items: Vec<Item>) {
        self.responses.lock().unwrap().push_back(Some(items));
    }

    pub fn push_failure(&self) {
        self.responses.lock().unwrap().push_back(None);
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.probe_fails.store(!ok, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct ScriptedSource {
    script: Arc<Script>,
}

#[async_trait]
impl ListingSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self) -> Result<Vec<Item>> {
        self.script.fetches.fetch_add(1, Ordering::SeqCst);
        match self.script.responses.lock().unwrap().pop_front() {
            Some(Some(items)) => Ok(items),
            Some(None) => Err(AppError::fetch("scripted", "scripted failure")),
            None => Ok(Vec::new()),
        }
    }

    async fn probe(&self) -> Result<()> {
        self.script.probes.fetch_add(1, Ordering::SeqCst);
        if self.script.probe_fails.load(Ordering::SeqCst) {
            Err(AppError::fetch("scripted", "probe failed"))
        } else {
            Ok(())
        }
    }

    async fn close(&self) {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory that counts successful creations and can be told to fail.
#[derive(Default)]
pub struct CountingFactory {
    pub script: Arc<Script>,
    created: AtomicUsize,
    failing: AtomicBool,
}

impl CountingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl SourceFactory for CountingFactory {
    fn create(&self) -> Result<Box<dyn ListingSource>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::config("factory told to fail"));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            script: Arc::clone(&self.script),
        }))
    }
}

/// Notifier that records what it was asked to send.
pub struct RecordingNotifier {
    batches: Mutex<Vec<Vec<Item>>>,
    announcements: Mutex<Vec<(String, String)>>,
    succeed: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            announcements: Mutex::new(Vec::new()),
            succeed: AtomicBool::new(true),
        })
    }

    pub fn set_succeed(&self, succeed: bool) {
        self.succeed.store(succeed, Ordering::SeqCst);
    }

    /// Every batch passed to `notify`, delivered or not.
    pub fn batches(&self) -> Vec<Vec<Item>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn announcements(&self) -> Vec<(String, String)> {
        self.announcements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, items: &[Item]) -> bool {
        self.batches.lock().unwrap().push(items.to_vec());
        self.succeed.load(Ordering::SeqCst)
    }

    async fn announce(&self, subject: &str, body: &str) -> bool {
        self.announcements
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        self.succeed.load(Ordering::SeqCst)
    }
}
