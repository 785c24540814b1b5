//! In-memory store with fault injection.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::KeyValueStore;

/// Volatile [`KeyValueStore`] backed by a `HashMap`.
///
/// Reads and writes can be made to fail on demand to exercise the
/// soft-failure paths of the components built on top of it.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
  fail_reads: AtomicBool,
  fail_writes: AtomicBool,
  /// Writes to keys starting with this prefix fail
  fail_prefix: Mutex<Option<String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every subsequent `get` fail.
  #[cfg(test)]
  pub fn fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  /// Make every subsequent `set` and `remove` fail.
  #[cfg(test)]
  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  /// Make writes to keys starting with `prefix` fail.
  #[cfg(test)]
  pub fn fail_writes_to(&self, prefix: &str) {
    if let Ok(mut fail_prefix) = self.fail_prefix.lock() {
      *fail_prefix = Some(prefix.to_string());
    }
  }

  fn check_write(&self, key: &str) -> Result<()> {
    let prefix_blocked = self
      .fail_prefix
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .as_deref()
      .is_some_and(|prefix| key.starts_with(prefix));

    if prefix_blocked || self.fail_writes.load(Ordering::SeqCst) {
      return Err(eyre!("Simulated write failure for {}", key));
    }
    Ok(())
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(eyre!("Simulated read failure for {}", key));
    }
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self.check_write(key)?;
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.check_write(key)?;
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(key);
    Ok(())
  }
}
