// SPDX-License-Identifier: MIT

//! Stable storage for assignments that should survive restarts: the
//! generated ULA, and a bounded most-recent-first prefix/address cache
//! per link. Line-oriented text, order-insensitive, idempotent reload.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use log::{debug, warn};

use crate::ip::Prefix;
use crate::time::{tmin, Time};

/// Rewrite debounce after a change.
pub const STORE_SAVE_DELAY: Time = 30_000;

const MAX_PREFIXES_PER_LINK: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreCategory {
    Prefix,
    Address,
}

impl StoreCategory {
    fn keyword(&self) -> &'static str {
        match self {
            StoreCategory::Prefix => "prefix",
            StoreCategory::Address => "address",
        }
    }
}

#[derive(Default)]
pub struct PaStore {
    path: Option<PathBuf>,
    ula: Option<Prefix>,
    entries: BTreeMap<(StoreCategory, String), Vec<Prefix>>,
    dirty: bool,
    save_at: Option<Time>,
}

impl PaStore {
    /// In-memory only store (storage disabled).
    pub fn ephemeral() -> Self {
        PaStore::default()
    }

    /// File-backed store; an unreadable or absent file simply starts
    /// empty.
    pub fn open(path: PathBuf) -> Self {
        let mut store = PaStore {
            path: Some(path),
            ..PaStore::default()
        };
        if let Err(e) = store.load() {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("stable storage load failed: {e}");
            }
        }
        store
    }

    fn load(&mut self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = fs::read_to_string(path)?;
        for line in content.lines() {
            let mut words = line.split_whitespace();
            match words.next() {
                Some("ula") => {
                    if let Some(Ok(prefix)) = words.next().map(str::parse) {
                        self.ula = Some(prefix);
                    }
                }
                Some(keyword @ ("prefix" | "address")) => {
                    let category = if keyword == "prefix" {
                        StoreCategory::Prefix
                    } else {
                        StoreCategory::Address
                    };
                    if let (Some(link), Some(Ok(prefix))) =
                        (words.next(), words.next().map(str::parse))
                    {
                        self.insert(category, link, prefix);
                    }
                }
                // Unknown or blank lines are ignored so future fields
                // do not break old daemons.
                _ => {}
            }
        }
        debug!(
            "stable storage loaded: ula {:?}, {} cached entries",
            self.ula,
            self.entries.values().map(Vec::len).sum::<usize>()
        );
        Ok(())
    }

    fn save(&mut self) -> io::Result<()> {
        let Some(path) = &self.path else {
            self.dirty = false;
            return Ok(());
        };
        let mut out = Vec::new();
        if let Some(ula) = &self.ula {
            writeln!(out, "ula {ula}")?;
        }
        for ((category, link), prefixes) in &self.entries {
            for prefix in prefixes {
                writeln!(out, "{} {link} {prefix}", category.keyword())?;
            }
        }
        fs::write(path, out)?;
        self.dirty = false;
        Ok(())
    }

    fn insert(&mut self, category: StoreCategory, link: &str, prefix: Prefix) {
        let list = self
            .entries
            .entry((category, link.to_string()))
            .or_default();
        list.retain(|p| *p != prefix);
        list.insert(0, prefix);
        list.truncate(MAX_PREFIXES_PER_LINK);
    }

    /// Remember an applied assignment, debouncing the rewrite.
    pub fn cache(
        &mut self,
        now: Time,
        category: StoreCategory,
        link: &str,
        prefix: Prefix,
    ) {
        if self
            .entries
            .get(&(category, link.to_string()))
            .and_then(|l| l.first())
            == Some(&prefix)
        {
            return;
        }
        self.insert(category, link, prefix);
        self.mark_dirty(now);
    }

    pub fn set_ula(&mut self, now: Time, prefix: Prefix) {
        if self.ula != Some(prefix) {
            self.ula = Some(prefix);
            self.mark_dirty(now);
        }
    }

    pub fn ula(&self) -> Option<Prefix> {
        self.ula
    }

    pub fn prefixes(
        &self,
        category: StoreCategory,
        link: &str,
    ) -> impl Iterator<Item = &Prefix> {
        self.entries
            .get(&(category, link.to_string()))
            .into_iter()
            .flatten()
    }

    fn mark_dirty(&mut self, now: Time) {
        self.dirty = true;
        if self.save_at.is_none() {
            self.save_at = Some(now + STORE_SAVE_DELAY);
        }
    }

    /// Flush when the debounce period elapsed.
    pub fn run(&mut self, now: Time) {
        if self.dirty && matches!(self.save_at, Some(at) if now >= at) {
            self.save_at = None;
            if let Err(e) = self.save() {
                warn!("stable storage save failed: {e}");
            }
        }
    }

    /// Flush unconditionally (shutdown path).
    pub fn flush(&mut self) {
        if self.dirty {
            self.save_at = None;
            if let Err(e) = self.save() {
                warn!("stable storage save failed: {e}");
            }
        }
    }

    pub fn next_run(&self) -> Option<Time> {
        tmin(None, if self.dirty { self.save_at } else { None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Prefix {
        s.parse().unwrap()
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pa.state");
        let mut store = PaStore::open(path.clone());
        store.set_ula(0, p("fd12:3456:789a::/48"));
        store.cache(0, StoreCategory::Prefix, "lan0", p("2001:db8:0:10::/64"));
        store.cache(0, StoreCategory::Address, "lan0", p("2001:db8:0:10::1/128"));
        store.flush();

        let reloaded = PaStore::open(path);
        assert_eq!(reloaded.ula(), Some(p("fd12:3456:789a::/48")));
        assert_eq!(
            reloaded
                .prefixes(StoreCategory::Prefix, "lan0")
                .collect::<Vec<_>>(),
            vec![&p("2001:db8:0:10::/64")]
        );
        assert_eq!(
            reloaded
                .prefixes(StoreCategory::Address, "lan0")
                .collect::<Vec<_>>(),
            vec![&p("2001:db8:0:10::1/128")]
        );
    }

    #[test]
    fn most_recent_entry_first() {
        let mut store = PaStore::ephemeral();
        store.cache(0, StoreCategory::Prefix, "lan0", p("2001:db8:0:1::/64"));
        store.cache(0, StoreCategory::Prefix, "lan0", p("2001:db8:0:2::/64"));
        store.cache(0, StoreCategory::Prefix, "lan0", p("2001:db8:0:1::/64"));
        let got: Vec<_> =
            store.prefixes(StoreCategory::Prefix, "lan0").collect();
        assert_eq!(
            got,
            vec![&p("2001:db8:0:1::/64"), &p("2001:db8:0:2::/64")]
        );
    }

    #[test]
    fn save_is_debounced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pa.state");
        let mut store = PaStore::open(path.clone());
        store.set_ula(1000, p("fd00::/48"));
        assert_eq!(store.next_run(), Some(1000 + STORE_SAVE_DELAY));
        store.run(1000);
        assert!(!path.exists());
        store.run(1000 + STORE_SAVE_DELAY);
        assert!(path.exists());
    }

    #[test]
    fn unknown_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pa.state");
        fs::write(&path, "bogus line\nula fd00::/48\n# comment\n").unwrap();
        let store = PaStore::open(path);
        assert_eq!(store.ula(), Some(p("fd00::/48")));
    }
}
