use super::error::{IoSnafu, JsonSnafu, NotFoundSnafu, StoreError};
use crate::types::{Message, Role, Thread};
use crate::util::title_from_prompt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::ResultExt;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

pub const NEW_THREAD_TITLE: &str = "New chat";
pub const UNTITLED: &str = "Untitled";
const MAX_TITLE_CHARS: usize = 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// On-disk layout: the id→thread mapping plus the active thread id.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    active_id: Option<&'a str>,
    threads: BTreeMap<&'a str, &'a Thread>,
}

/// Thread records as found on disk, every field optional.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawThread {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<Value>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    messages: Option<Vec<Value>>,
}

/// All threads of one user, keyed by id.
pub struct ThreadStore {
    threads: HashMap<String, Thread>,
    active_id: Option<String>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(RandomIds))
    }
}

impl ThreadStore {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            threads: HashMap::new(),
            active_id: None,
            clock,
            ids,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn get(&self, id: &str) -> Option<&Thread> {
        self.threads.get(id)
    }

    pub fn put(&mut self, thread: Thread) {
        self.threads.insert(thread.id.clone(), thread);
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Threads ordered by most recent activity first.
    pub fn list(&self) -> Vec<&Thread> {
        let mut threads: Vec<&Thread> = self.threads.values().collect();
        threads.sort_by(|a, b| {
            b.sort_key()
                .cmp(&a.sort_key())
                .then_with(|| a.id.cmp(&b.id))
        });
        threads
    }

    pub fn create_thread(&mut self) -> String {
        let id = self.ids.next_id();
        let thread = Thread {
            id: id.clone(),
            title: NEW_THREAD_TITLE.to_string(),
            created_at: self.clock.now(),
            updated_at: None,
            messages: Vec::new(),
        };
        self.threads.insert(id.clone(), thread);
        self.active_id = Some(id.clone());
        tracing::debug!(thread_id = %id, "created thread");
        id
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&Thread> {
        self.active_id.as_deref().and_then(|id| self.threads.get(id))
    }

    pub fn activate(&mut self, id: &str) -> Result<(), StoreError> {
        if !self.threads.contains_key(id) {
            return NotFoundSnafu { thread_id: id }.fail();
        }
        self.active_id = Some(id.to_string());
        Ok(())
    }

    /// Active thread id, creating a fresh thread when there is none.
    pub fn ensure_active(&mut self) -> String {
        match self.active() {
            Some(thread) => thread.id.clone(),
            None => self.create_thread(),
        }
    }

    /// Remove a thread. When it was active, the next thread in list order
    /// becomes active, else the previous one, else a new empty thread.
    /// Returns the removed thread.
    pub fn delete(&mut self, id: &str) -> Result<Thread, StoreError> {
        let order: Vec<String> = self.list().iter().map(|thread| thread.id.clone()).collect();
        let Some(removed) = self.threads.remove(id) else {
            return NotFoundSnafu { thread_id: id }.fail();
        };

        if self.active_id.as_deref() == Some(id) {
            let position = order.iter().position(|candidate| candidate == id);
            let successor = position.and_then(|index| {
                order
                    .get(index + 1)
                    .or_else(|| index.checked_sub(1).and_then(|prev| order.get(prev)))
                    .cloned()
            });
            match successor {
                Some(next) => self.active_id = Some(next),
                None => {
                    self.create_thread();
                }
            }
        }
        Ok(removed)
    }

    pub fn set_title(&mut self, id: &str, title: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        let thread = self.thread_mut(id)?;
        thread.title = title.trim().to_string();
        thread.updated_at = Some(now);
        Ok(())
    }

    /// Append one message and advance `updatedAt`. The first user prompt of
    /// an untitled thread becomes its title.
    pub fn append_message(&mut self, id: &str, message: Message) -> Result<(), StoreError> {
        let now = self.clock.now();
        let thread = self.thread_mut(id)?;

        let untitled = thread.title == NEW_THREAD_TITLE || thread.title == UNTITLED;
        if thread.messages.is_empty() && untitled && message.role == Role::User {
            if let Some(title) = message
                .text()
                .and_then(|text| title_from_prompt(text, MAX_TITLE_CHARS))
            {
                thread.title = title;
            }
        }

        thread.messages.push(message);
        thread.updated_at = Some(now);
        Ok(())
    }

    /// Take out the first user message whose text is `text` so it can be
    /// edited and sent again. Other messages keep their order.
    pub fn remove_user_message(
        &mut self,
        id: &str,
        text: &str,
    ) -> Result<Option<Message>, StoreError> {
        let now = self.clock.now();
        let thread = self.thread_mut(id)?;
        let Some(index) = thread
            .messages
            .iter()
            .position(|message| message.role == Role::User && message.text() == Some(text))
        else {
            return Ok(None);
        };
        let removed = thread.messages.remove(index);
        thread.updated_at = Some(now);
        Ok(Some(removed))
    }

    /// Text of the most recent user message, the one a retry sends again.
    pub fn last_user_prompt(&self, id: &str) -> Result<Option<String>, StoreError> {
        let Some(thread) = self.threads.get(id) else {
            return NotFoundSnafu { thread_id: id }.fail();
        };
        Ok(thread
            .messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .and_then(Message::text)
            .map(ToOwned::to_owned))
    }

    fn thread_mut(&mut self, id: &str) -> Result<&mut Thread, StoreError> {
        match self.threads.get_mut(id) {
            Some(thread) => Ok(thread),
            None => NotFoundSnafu { thread_id: id }.fail(),
        }
    }

    /// Load a store file. A missing file yields an empty store.
    pub fn load_from_path(
        path: &Path,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new(clock, ids);
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(error) => {
                return Err(error).context(IoSnafu {
                    action: "read",
                    path,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(store);
        }

        let document: Value = serde_json::from_str(&raw).context(JsonSnafu { path })?;
        store.absorb(document);
        tracing::debug!(path = %path.display(), threads = store.len(), "loaded thread store");
        Ok(store)
    }

    /// Accepts `{activeId, threads: {...}}` as well as a bare id→thread map.
    fn absorb(&mut self, document: Value) {
        let Value::Object(mut root) = document else {
            tracing::warn!("thread store root is not an object, starting empty");
            return;
        };
        let active_id = root
            .get("activeId")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        let threads = match root.remove("threads") {
            Some(Value::Object(threads)) => threads,
            Some(_) => Map::new(),
            None => {
                root.remove("activeId");
                root
            }
        };

        for (key, value) in threads {
            match self.migrate_thread(&key, value) {
                Some(thread) => {
                    self.threads.insert(thread.id.clone(), thread);
                }
                None => tracing::warn!(thread_id = %key, "skipping unreadable thread record"),
            }
        }
        self.active_id = active_id.filter(|id| self.threads.contains_key(id));
    }

    fn migrate_thread(&self, key: &str, value: Value) -> Option<Thread> {
        let raw: RawThread = serde_json::from_value(value).ok()?;
        let id = raw
            .id
            .filter(|id| !id.is_empty())
            .or_else(|| (!key.is_empty()).then(|| key.to_string()))
            .unwrap_or_else(|| self.ids.next_id());
        let title = match raw.title {
            Some(Value::String(title)) => title,
            _ => UNTITLED.to_string(),
        };
        let created_at = raw
            .created_at
            .or(raw.updated_at)
            .unwrap_or_else(|| self.clock.now());
        let messages = raw
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| serde_json::from_value::<Message>(message).ok())
            .collect();
        Some(Thread {
            id,
            title,
            created_at,
            updated_at: raw.updated_at,
            messages,
        })
    }

    /// Write the store as pretty JSON, replacing the file atomically.
    pub fn save_to_path(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(IoSnafu {
                action: "create directory for",
                path,
            })?;
        }

        let file = StoreFile {
            active_id: self.active_id.as_deref(),
            threads: self
                .threads
                .iter()
                .map(|(id, thread)| (id.as_str(), thread))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file).context(JsonSnafu { path })?;

        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, json).context(IoSnafu {
            action: "write",
            path: &staging,
        })?;
        std::fs::rename(&staging, path).context(IoSnafu {
            action: "replace",
            path,
        })?;
        Ok(())
    }
}
