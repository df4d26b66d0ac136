//! Project persistence.
//!
//! The store owns the durable [`ProjectMap`] and a cache of live
//! [`SharedProject`]s. Live projects schedule their own saves through a
//! [`SaveQueue`]; the host loop calls [`ProjectStore::flush_due`] whenever
//! [`ProjectStore::next_deadline`] passes, and each due project becomes one
//! write of the whole map under [`PROJECTS_KEY`].

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::debounce::{Clock, Debouncer};
use crate::error::StoreError;
use crate::project::{Project, ProjectData, ProjectMap, ProjectSummary, SharedProject};
use crate::serialize::{ProjectMapRecord, map_to_value, project_from_record};

pub const PROJECTS_KEY: &str = "projects";
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Durable key/value storage for the project map
pub trait StateBackend {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn write(&mut self, key: &str, value: &Value) -> Result<(), StoreError>;
}

/// A single JSON document on disk holding every key
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_document(&self) -> Result<serde_json::Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(serde_json::Map::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }
        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Load(format!(
                "{} does not hold a JSON object (found {})",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl StateBackend for JsonFileBackend {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_document()?.remove(key))
    }

    /// Writes to a sibling temp file and renames it over the target, so a
    /// failed write leaves the previous file in place.
    fn write(&mut self, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut document = self.read_document()?;
        document.insert(key.to_string(), value.clone());

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&Value::Object(document))?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, Value>,
    writes: usize,
    fail_writes: bool,
}

/// In-memory backend. Clones share state, so a test can keep a handle after
/// giving one to the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: Value) -> Self {
        let backend = Self::new();
        backend
            .state
            .borrow_mut()
            .entries
            .insert(key.to_string(), value);
        backend
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> usize {
        self.state.borrow().writes
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.borrow_mut().fail_writes = fail;
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.state.borrow().entries.get(key).cloned()
    }
}

impl StateBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.value(key))
    }

    fn write(&mut self, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state.fail_writes {
            return Err(StoreError::PersistenceWriteFailure(
                "memory backend is failing writes".to_string(),
            ));
        }
        state.entries.insert(key.to_string(), value.clone());
        state.writes += 1;
        Ok(())
    }
}

/// Per-project trailing debounce of save requests, shared between the store
/// and every live [`Project`]. Only ids are queued; the store reads the live
/// project when the save fires.
#[derive(Clone)]
pub struct SaveQueue {
    debouncer: Rc<RefCell<Debouncer<String, ()>>>,
    clock: Rc<dyn Clock>,
}

impl fmt::Debug for SaveQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveQueue")
            .field("pending", &self.debouncer.borrow().len())
            .finish()
    }
}

impl SaveQueue {
    pub fn new(window: Duration, clock: Rc<dyn Clock>) -> Self {
        Self {
            debouncer: Rc::new(RefCell::new(Debouncer::new(window))),
            clock,
        }
    }

    pub fn schedule(&self, id: &str) {
        let now = self.clock.now();
        self.debouncer.borrow_mut().schedule(id.to_string(), (), now);
    }

    /// Fire `id` immediately. Returns whether a save was pending.
    pub fn flush_now(&self, id: &str) -> bool {
        self.debouncer.borrow_mut().flush_now(&id.to_string()).is_some()
    }

    pub fn cancel(&self, id: &str) -> bool {
        self.debouncer.borrow_mut().cancel(&id.to_string())
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.debouncer.borrow().is_pending(&id.to_string())
    }

    pub fn take_due(&self) -> Vec<String> {
        let now = self.clock.now();
        ids(self.debouncer.borrow_mut().take_due(now))
    }

    pub fn take_all(&self) -> Vec<String> {
        ids(self.debouncer.borrow_mut().take_all())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.borrow().next_deadline()
    }
}

fn ids(entries: Vec<(String, ())>) -> Vec<String> {
    entries.into_iter().map(|(id, ())| id).collect()
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub debounce_window: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}

type ChangeListener = Box<dyn FnMut(&ProjectMap)>;

pub struct ProjectStore {
    backend: Box<dyn StateBackend>,
    durable: ProjectMap,
    cache: HashMap<String, SharedProject>,
    saves: SaveQueue,
    listeners: Vec<ChangeListener>,
}

impl ProjectStore {
    /// Load the project map from `backend`, rehydrating every change once.
    /// Changes that fail to rehydrate are logged and dropped.
    pub fn open(
        backend: impl StateBackend + 'static,
        options: StoreOptions,
        clock: Rc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let durable = match backend.load(PROJECTS_KEY)? {
            Some(value) => {
                let records: ProjectMapRecord = serde_json::from_value(value)
                    .map_err(|e| StoreError::Load(e.to_string()))?;
                records
                    .into_iter()
                    .map(|(id, record)| {
                        let (data, errors) = project_from_record(record);
                        for error in errors {
                            log::warn!("project {id}: skipping change: {error}");
                        }
                        (id, data)
                    })
                    .collect()
            }
            None => ProjectMap::new(),
        };
        log::info!("loaded {} projects", durable.len());

        Ok(Self {
            backend: Box::new(backend),
            durable,
            cache: HashMap::new(),
            saves: SaveQueue::new(options.debounce_window, clock),
            listeners: Vec::new(),
        })
    }

    /// Every known project, sorted by id. Live projects report their
    /// in-memory state, which may be ahead of what has been written.
    pub fn list(&self) -> Vec<ProjectSummary> {
        self.ids()
            .into_iter()
            .filter_map(|id| match self.cache.get(&id) {
                Some(project) => Some(project.borrow().summary()),
                None => self.durable.get(&id).map(|data| data.summary(&id)),
            })
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.durable
            .keys()
            .chain(self.cache.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn has(&self, id: &str) -> bool {
        self.cache.contains_key(id) || self.durable.contains_key(id)
    }

    /// The live project for `id`, created (and scheduled for saving) if it
    /// does not exist. Repeated calls return the same instance.
    pub fn get(&mut self, id: &str) -> SharedProject {
        if let Some(project) = self.cache.get(id) {
            return Rc::clone(project);
        }

        let project = match self.durable.get(id) {
            Some(data) => Project::new(id.to_string(), data.clone(), self.saves.clone()),
            None => {
                log::info!("creating project {id}");
                self.saves.schedule(id);
                Project::new(id.to_string(), ProjectData::default(), self.saves.clone())
            }
        };
        let project = Rc::new(RefCell::new(project));
        self.cache.insert(id.to_string(), Rc::clone(&project));
        project
    }

    /// Like [`Self::get`] but refuses ids that already exist
    pub fn create(&mut self, id: &str) -> Result<SharedProject, StoreError> {
        if self.has(id) {
            return Err(StoreError::ProjectNameConflict(id.to_string()));
        }
        Ok(self.get(id))
    }

    /// Remove projects from durable storage, writing immediately. Only once
    /// the write succeeds are they evicted from the cache and their pending
    /// saves dropped; on failure everything is left as it was.
    pub fn delete<I, S>(&mut self, ids: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        let mut next = self.durable.clone();
        for id in &ids {
            next.remove(id);
        }
        self.commit(next)?;
        for id in &ids {
            self.cache.remove(id);
            self.saves.cancel(id);
            log::info!("deleted project {id}");
        }
        Ok(())
    }

    /// Subscribe to successful durable writes
    pub fn on_change(&mut self, listener: impl FnMut(&ProjectMap) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Write every project whose quiet period has elapsed. Returns the number
    /// of successful writes; a failed project is logged and queued again.
    pub fn flush_due(&mut self) -> usize {
        let due = self.saves.take_due();
        self.persist_all(due)
    }

    /// Write everything pending regardless of deadlines
    pub fn flush_all(&mut self) -> usize {
        let pending = self.saves.take_all();
        self.persist_all(pending)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.saves.next_deadline()
    }

    pub fn has_pending_writes(&self) -> bool {
        self.saves.next_deadline().is_some()
    }

    /// State as of the last successful write
    pub fn durable(&self) -> &ProjectMap {
        &self.durable
    }

    fn persist_all(&mut self, ids: Vec<String>) -> usize {
        let mut written = 0;
        for id in ids {
            // Deleted while the save was pending
            let Some(project) = self.cache.get(&id) else {
                continue;
            };
            let mut next = self.durable.clone();
            next.insert(id.clone(), project.borrow().data().clone());
            match self.commit(next) {
                Ok(()) => written += 1,
                Err(e) => {
                    log::warn!("failed to save project {id}, will retry: {e}");
                    self.saves.schedule(&id);
                }
            }
        }
        written
    }

    fn commit(&mut self, next: ProjectMap) -> Result<(), StoreError> {
        let value = map_to_value(&next)?;
        self.backend
            .write(PROJECTS_KEY, &value)
            .map_err(|e| match e {
                StoreError::PersistenceWriteFailure(_) => e,
                other => StoreError::PersistenceWriteFailure(other.to_string()),
            })?;
        self.durable = next;
        for listener in &mut self.listeners {
            listener(&self.durable);
        }
        Ok(())
    }
}
