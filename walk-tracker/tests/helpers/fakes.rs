//! Scripted stand-ins for the network transports and photo storage

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;
use walk_common::Coordinate;
use walk_tracker::services::{PhotoFetcher, PhotoSearchClient, PhotoStorage, StoredPhoto};
use walk_tracker::StageError;

/// Search client answering from a script
///
/// Queued responses are used first; once the queue is empty every call
/// returns a unique `https://photos.example.com/photo-<n>.jpg`. A gated
/// client blocks each call until [`ScriptedSearchClient::release`].
pub struct ScriptedSearchClient {
    responses: Mutex<VecDeque<Result<String, StageError>>>,
    calls: Mutex<Vec<Coordinate>>,
    call_count: AtomicUsize,
    gate: Option<Semaphore>,
}

impl ScriptedSearchClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Calls block until released
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn respond_with(self, response: Result<String, StageError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Let `calls` blocked or future calls proceed
    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn searched_coordinates(&self) -> Vec<Coordinate> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoSearchClient for ScriptedSearchClient {
    async fn search(&self, coordinate: Coordinate) -> Result<String, StageError> {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.lock().unwrap().push(coordinate);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let scripted = self.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(format!("https://photos.example.com/photo-{}.jpg", n)))
    }
}

/// Fetcher serving fixed bytes, with per-URL overrides
pub struct FakeFetcher {
    overrides: Mutex<HashMap<String, Result<Vec<u8>, StageError>>>,
    call_count: AtomicUsize,
}

impl FakeFetcher {
    pub const DEFAULT_BYTES: &'static [u8] = b"\xFF\xD8\xFFfake-jpeg";

    pub fn new() -> Self {
        Self {
            overrides: Mutex::new(HashMap::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn respond_to(self, url: &str, response: Result<Vec<u8>, StageError>) -> Self {
        self.overrides
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhotoFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StageError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.overrides
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Ok(Self::DEFAULT_BYTES.to_vec()))
    }
}

/// Storage whose writes always fail
pub struct FailingStorage;

#[async_trait]
impl PhotoStorage for FailingStorage {
    async fn save_if_absent(&self, _name: &str, _bytes: &[u8]) -> Result<StoredPhoto, StageError> {
        Err(StageError::Storage("disk full".to_string()))
    }

    async fn delete_all(&self) -> Result<usize, StageError> {
        Ok(0)
    }
}
