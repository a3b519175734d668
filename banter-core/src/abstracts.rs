//! Phrase pools ("abstracts") - named, de-duplicated, disk-backed
//! collections of interchangeable phrases
//!
//! A pool lives in one flat text file, one phrase per line, under
//! `<abstract root>/<locale>/<pool>.txt`. While evicted the file is
//! authoritative and the in-memory set is empty; while resident the
//! in-memory set is authoritative until the next save or eviction.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::Rng;

use banter_plugin_api::Locale;

/// Hard ceiling on pool entries; the save path thins the pool above this.
pub const MAX_POOL_ENTRIES: usize = 300;

/// How long an untouched resident pool stays in memory.
pub const MAX_POOL_IDLE: Duration = Duration::from_secs(600);

/// One named phrase pool.
pub struct Abstract {
    pool: String,
    path: PathBuf,
    phrases: Vec<String>,
    resident: bool,
    last_touched: Instant,
    locale: Locale,
}

impl Abstract {
    /// Set up a pool handle. Nothing touches the disk until
    /// [`Abstract::create`].
    pub fn new(pool: &str, root: &Path, locale: Locale) -> Self {
        let pool = if pool.is_empty() { "undefined" } else { pool };
        let path = root.join(locale.code()).join(format!("{pool}.txt"));
        Self {
            pool: pool.to_string(),
            path,
            phrases: Vec::new(),
            resident: false,
            last_touched: Instant::now(),
            locale,
        }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn is_resident(&self) -> bool {
        self.resident
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Create or load the pool. An existing backing file is loaded and
    /// de-duplicated; otherwise an empty file is created and the pool
    /// starts resident.
    pub fn create(&mut self) -> bool {
        self.last_touched = Instant::now();
        if self.path.exists() {
            return self.load();
        }
        if let Some(parent) = self.path.parent() {
            if let Err(error) = std::fs::create_dir_all(parent) {
                tracing::warn!(pool = %self.pool, %error, "cannot create pool directory");
                return false;
            }
        }
        if let Err(error) = std::fs::File::create(&self.path) {
            tracing::warn!(pool = %self.pool, %error, "cannot create pool file");
            return false;
        }
        self.phrases.clear();
        self.resident = true;
        true
    }

    /// Load the backing file into memory, de-duplicating entries and
    /// rewriting the file if duplicates were found.
    fn load(&mut self) -> bool {
        if self.resident {
            return false;
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) => {
                tracing::warn!(pool = %self.pool, %error, "cannot read pool file");
                return false;
            }
        };
        tracing::debug!(pool = %self.pool, "loading pool off disk");
        self.last_touched = Instant::now();
        self.phrases.clear();
        let mut needs_resave = false;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if self.phrases.iter().any(|p| p == line) {
                needs_resave = true;
            } else {
                self.phrases.push(line.to_string());
            }
        }
        self.resident = true;
        if needs_resave {
            self.store();
        }
        true
    }

    /// Rewrite the backing file from memory. Above [`MAX_POOL_ENTRIES`]
    /// each entry has a 10% chance of being dropped from the file (the
    /// in-memory set is left alone).
    fn store(&self) -> bool {
        let mut file = match std::fs::File::create(&self.path) {
            Ok(file) => file,
            Err(error) => {
                tracing::warn!(pool = %self.pool, %error, "cannot rewrite pool file");
                return false;
            }
        };
        let tidy = self.phrases.len() > MAX_POOL_ENTRIES;
        if tidy {
            tracing::info!(pool = %self.pool, "pool has too many entries, tidying up");
        }
        let mut rng = rand::thread_rng();
        let mut kept = 0usize;
        for phrase in &self.phrases {
            if tidy && rng.gen_range(0..100) < 10 {
                tracing::debug!(pool = %self.pool, phrase = %phrase, "dropping entry from pool");
                continue;
            }
            if writeln!(file, "{phrase}").is_err() {
                return false;
            }
            kept += 1;
        }
        if tidy {
            tracing::info!(pool = %self.pool, kept, "pool tidied");
        }
        true
    }

    /// Add a phrase. While evicted, only a saving add is accepted and goes
    /// straight to the file; while resident, duplicates are rejected.
    pub fn add_value(&mut self, value: &str, save: bool) -> bool {
        if !self.resident {
            if !save {
                return false;
            }
            tracing::debug!(pool = %self.pool, "appending to evicted pool on disk");
            return self.append_line(value);
        }
        if self.phrases.iter().any(|p| p == value) {
            return false;
        }
        self.phrases.push(value.to_string());
        if save {
            return self.append_line(value);
        }
        true
    }

    fn append_line(&self, value: &str) -> bool {
        let file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path);
        match file {
            Ok(mut file) => writeln!(file, "{value}").is_ok(),
            Err(error) => {
                tracing::warn!(pool = %self.pool, %error, "cannot append to pool file");
                false
            }
        }
    }

    /// Remove a phrase from the in-memory set; optionally rewrite the file.
    pub fn remove_value(&mut self, value: &str, save: bool) -> bool {
        let Some(index) = self.phrases.iter().position(|p| p == value) else {
            return false;
        };
        self.phrases.remove(index);
        if save {
            return self.store();
        }
        true
    }

    /// Fetch a uniformly random phrase, loading the pool first if evicted.
    pub fn random_value(&mut self) -> Option<String> {
        self.last_touched = Instant::now();
        if !self.resident {
            self.load();
        }
        if self.phrases.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.phrases.len());
        Some(self.phrases[index].clone())
    }

    /// Evict the pool if it has been idle too long or its locale no longer
    /// matches the active one. Reports whether anything changed.
    pub fn garbage_collect(&mut self, active: Locale) -> bool {
        if !self.resident {
            return false;
        }
        if self.last_touched.elapsed() > MAX_POOL_IDLE || self.locale != active {
            tracing::info!(pool = %self.pool, "expiring pool");
            self.phrases.clear();
            self.resident = false;
            return true;
        }
        false
    }

    /// Pretend the pool was last touched this much longer ago.
    #[cfg(test)]
    pub(crate) fn age_by(&mut self, by: Duration) {
        if let Some(earlier) = self.last_touched.checked_sub(by) {
            self.last_touched = earlier;
        }
    }
}
