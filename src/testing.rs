//! In-memory blob client double for unit tests
//!
//! Counts every call, can replay scripted listing pages and inject failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::client::BlobClient;
use crate::error::RemoteError;
use crate::types::{BlobProperties, ListItem, ListPage};

type WriteHook = Box<dyn Fn(&str) + Send + Sync>;

/// Parks one `get_properties` call between reading the object and returning
#[derive(Default)]
pub(crate) struct ReadGate {
    /// Notified once the parked call has read the object
    pub(crate) read: Notify,
    /// Notify to let the parked call return
    pub(crate) release: Notify,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Op {
    GetProperties,
    Exists,
    ListPage,
    Upload,
    Download,
    Delete,
}

#[derive(Default)]
struct CallCounts {
    get_properties: AtomicUsize,
    exists: AtomicUsize,
    list_page: AtomicUsize,
    upload: AtomicUsize,
    download: AtomicUsize,
    delete: AtomicUsize,
}

impl CallCounts {
    fn counter(&self, op: Op) -> &AtomicUsize {
        match op {
            Op::GetProperties => &self.get_properties,
            Op::Exists => &self.exists,
            Op::ListPage => &self.list_page,
            Op::Upload => &self.upload,
            Op::Download => &self.download,
            Op::Delete => &self.delete,
        }
    }
}

#[derive(Default)]
pub(crate) struct MockBlobClient {
    objects: Mutex<BTreeMap<String, (Vec<u8>, BlobProperties)>>,
    /// Scripted pages keyed by the continuation token that requests them
    pages: Mutex<HashMap<Option<String>, ListPage>>,
    list_failures_remaining: AtomicU32,
    /// Successful list calls still allowed before the scripted failures start
    list_successes_first: AtomicU32,
    fail_all_lists: AtomicBool,
    fail_properties: AtomicBool,
    fail_writes: AtomicBool,
    write_hook: Mutex<Option<WriteHook>>,
    read_gate: Mutex<Option<Arc<ReadGate>>>,
    calls: CallCounts,
}

impl MockBlobClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store an object directly, bypassing call counting
    pub(crate) fn put_object(&self, path: &str, data: &[u8]) {
        let properties = BlobProperties {
            content_length: data.len() as u64,
            content_type: Some("application/octet-stream".to_string()),
            ..Default::default()
        };
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (data.to_vec(), properties));
    }

    pub(crate) fn has_object(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    /// Script a listing: page `i` is requested with token `t{i}`
    pub(crate) fn script_pages(&self, pages: Vec<Vec<ListItem>>) {
        let count = pages.len();
        let mut scripted = self.pages.lock().unwrap();
        scripted.clear();
        for (i, items) in pages.into_iter().enumerate() {
            let token = (i > 0).then(|| format!("t{}", i));
            let next_token = (i + 1 < count).then(|| format!("t{}", i + 1));
            scripted.insert(token, ListPage { items, next_token });
        }
    }

    /// Script the page returned for one continuation token
    pub(crate) fn script_page(&self, token: Option<&str>, page: ListPage) {
        self.pages
            .lock()
            .unwrap()
            .insert(token.map(str::to_string), page);
    }

    /// Fail the next `count` list calls, then behave normally
    pub(crate) fn fail_next_lists(&self, count: u32) {
        self.fail_lists_after(0, count);
    }

    /// Let `successes` list calls through, then fail the next `count`
    pub(crate) fn fail_lists_after(&self, successes: u32, count: u32) {
        self.list_successes_first.store(successes, Ordering::SeqCst);
        self.list_failures_remaining.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_all_lists(&self, fail: bool) {
        self.fail_all_lists.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_properties(&self, fail: bool) {
        self.fail_properties.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Park the next `get_properties` call after it reads the object
    pub(crate) fn hold_next_read(&self) -> Arc<ReadGate> {
        let gate = Arc::new(ReadGate::default());
        *self.read_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Run `hook` at the start of every upload and delete
    pub(crate) fn on_write<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.write_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub(crate) fn calls(&self, op: Op) -> usize {
        self.calls.counter(op).load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        [
            Op::GetProperties,
            Op::Exists,
            Op::ListPage,
            Op::Upload,
            Op::Download,
            Op::Delete,
        ]
        .into_iter()
        .map(|op| self.calls(op))
        .sum()
    }

    fn record(&self, op: Op) {
        self.calls.counter(op).fetch_add(1, Ordering::SeqCst);
    }

    fn before_write(&self, path: &str) -> Result<(), RemoteError> {
        if let Some(hook) = self.write_hook.lock().unwrap().as_ref() {
            hook(path);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Server(500, "write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobClient for MockBlobClient {
    async fn get_properties(
        &self,
        _container: &str,
        path: &str,
    ) -> Result<BlobProperties, RemoteError> {
        self.record(Op::GetProperties);
        if self.fail_properties.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("connection reset".to_string()));
        }
        let result = self
            .objects
            .lock()
            .unwrap()
            .get(path)
            .map(|(_, props)| props.clone())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()));

        let gate = self.read_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.read.notify_one();
            gate.release.notified().await;
        }
        result
    }

    async fn exists(&self, _container: &str, path: &str) -> Result<bool, RemoteError> {
        self.record(Op::Exists);
        Ok(self.objects.lock().unwrap().contains_key(path))
    }

    async fn list_page(
        &self,
        _container: &str,
        _delimiter: Option<&str>,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, RemoteError> {
        self.record(Op::ListPage);
        if self.fail_all_lists.load(Ordering::SeqCst) {
            return Err(RemoteError::Timeout);
        }
        let remaining = self.list_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            let successes = self.list_successes_first.load(Ordering::SeqCst);
            if successes > 0 {
                self.list_successes_first
                    .store(successes - 1, Ordering::SeqCst);
            } else {
                self.list_failures_remaining
                    .store(remaining - 1, Ordering::SeqCst);
                return Err(RemoteError::Server(503, "slow down".to_string()));
            }
        }

        let scripted = self.pages.lock().unwrap();
        if !scripted.is_empty() {
            return scripted
                .get(&continuation.map(str::to_string))
                .cloned()
                .ok_or_else(|| RemoteError::Request("unknown continuation".to_string()));
        }

        let items = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, (_, props))| ListItem::file(name.clone(), props.clone()))
            .collect();
        Ok(ListPage {
            items,
            next_token: None,
        })
    }

    async fn upload(
        &self,
        _container: &str,
        path: &str,
        data: Vec<u8>,
        metadata: &[(String, String)],
    ) -> Result<BlobProperties, RemoteError> {
        self.record(Op::Upload);
        self.before_write(path)?;
        let properties = BlobProperties {
            content_length: data.len() as u64,
            metadata: metadata.iter().cloned().collect(),
            ..Default::default()
        };
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (data, properties.clone()));
        Ok(properties)
    }

    async fn download(
        &self,
        _container: &str,
        path: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Vec<u8>, RemoteError> {
        self.record(Op::Download);
        let objects = self.objects.lock().unwrap();
        let (data, _) = objects
            .get(path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        Ok(match range {
            Some((start, end)) => {
                let end = (end as usize + 1).min(data.len());
                data.get(start as usize..end).unwrap_or_default().to_vec()
            }
            None => data.clone(),
        })
    }

    async fn delete(&self, _container: &str, path: &str) -> Result<(), RemoteError> {
        self.record(Op::Delete);
        self.before_write(path)?;
        self.objects
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }
}
