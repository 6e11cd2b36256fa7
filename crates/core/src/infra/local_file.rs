//! `LocalState` implementations: a JSON
//! file on disk and a plain map.
use std::collections::BTreeMap;
use std::path::{
  Path,
  PathBuf
};
use std::sync::{
  Mutex,
  MutexGuard,
  PoisonError
};

use tracing::warn;

use crate::ports::local::LocalState;

type Entries = BTreeMap<String, String>;

#[derive(Default)]
pub struct MemoryLocalState {
  entries: Mutex<Entries>
}

impl MemoryLocalState {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Entries> {
    self
      .entries
      .lock()
      .unwrap_or_else(
        PoisonError::into_inner
      )
  }
}

impl LocalState for MemoryLocalState {
  fn read(
    &self,
    key: &str
  ) -> Option<String> {
    self.lock().get(key).cloned()
  }

  fn write(
    &self,
    key: &str,
    value: &str
  ) {
    self
      .lock()
      .insert(key.to_string(), value.to_string());
  }

  fn remove(&self, key: &str) {
    self.lock().remove(key);
  }
}

/// Whole map is rewritten on every
/// change. Write failures are logged and
/// the in-memory copy stays
/// authoritative for the session.
pub struct FileLocalState {
  path:    PathBuf,
  entries: Mutex<Entries>
}

impl FileLocalState {
  pub fn open(path: &Path) -> Self {
    let entries =
      match std::fs::read_to_string(path) {
        | Ok(content) => {
          serde_json::from_str(&content)
            .unwrap_or_else(|e| {
              warn!(path = %path.display(), error = %e, "local state unreadable, starting empty");
              Entries::new()
            })
        }
        | Err(_) => Entries::new()
      };

    Self {
      path:    path.to_path_buf(),
      entries: Mutex::new(entries)
    }
  }

  fn lock(&self) -> MutexGuard<'_, Entries> {
    self
      .entries
      .lock()
      .unwrap_or_else(
        PoisonError::into_inner
      )
  }

  fn persist(&self, entries: &Entries) {
    if let Some(parent) = self
      .path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      && let Err(e) =
        std::fs::create_dir_all(parent)
    {
      warn!(path = %parent.display(), error = %e, "local state dir create failed");
      return;
    }

    let body =
      match serde_json::to_string_pretty(
        entries
      ) {
        | Ok(body) => body,
        | Err(e) => {
          warn!(error = %e, "local state encode failed");
          return;
        }
      };

    if let Err(e) =
      std::fs::write(&self.path, body)
    {
      warn!(path = %self.path.display(), error = %e, "local state write failed");
    }
  }
}

impl LocalState for FileLocalState {
  fn read(
    &self,
    key: &str
  ) -> Option<String> {
    self.lock().get(key).cloned()
  }

  fn write(
    &self,
    key: &str,
    value: &str
  ) {
    let mut guard = self.lock();
    guard.insert(
      key.to_string(),
      value.to_string()
    );
    self.persist(&guard);
  }

  fn remove(&self, key: &str) {
    let mut guard = self.lock();

    if guard.remove(key).is_some() {
      self.persist(&guard);
    }
  }
}
