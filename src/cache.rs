//! Bounded in-memory store for decoded images.
//!
//! Entries are keyed by identifier and target size and evicted least recently
//! used first whenever the entry count or the total byte cost exceeds its
//! bound. Nothing is persisted.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::photo::{PhotoIdentifier, TargetSize};

/// `<stable identifier>|<width>x<height>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(identifier: &PhotoIdentifier, size: TargetSize) -> Self {
        Self(format!("{}|{}", identifier.stable_key(), size))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_cost_bytes: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: 50,
            max_cost_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Estimated memory held by a decoded image.
pub fn image_cost(image: &RgbaImage) -> usize {
    image.as_raw().len()
}

struct Slot {
    image: Arc<RgbaImage>,
    cost: usize,
    last_used: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<CacheKey, Slot>,
    total_cost: usize,
    clock: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.entries.remove(key)?;
        self.total_cost -= slot.cost;
        Some(slot)
    }

    fn least_recent(&self) -> Option<CacheKey> {
        self.entries
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(key, _)| key.clone())
    }
}

/// Shared by every retrieval; safe to use from concurrent completions.
pub struct ImageCache {
    limits: CacheLimits,
    state: Mutex<State>,
}

impl ImageCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(State::default()),
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<RgbaImage>> {
        let mut state = self.state.lock();
        let now = state.tick();
        let slot = state.entries.get_mut(key)?;
        slot.last_used = now;
        Some(Arc::clone(&slot.image))
    }

    /// Store `image` under `key`, evicting older entries to respect both bounds.
    ///
    /// Returns `false` when the image alone exceeds the byte bound and was not kept.
    pub fn insert(&self, key: CacheKey, image: Arc<RgbaImage>) -> bool {
        let cost = image_cost(&image);
        if cost > self.limits.max_cost_bytes || self.limits.max_entries == 0 {
            debug!(%key, cost, "image exceeds cache bounds; not stored");
            return false;
        }

        let mut state = self.state.lock();
        state.remove(&key);
        let now = state.tick();
        state.total_cost += cost;
        state.entries.insert(
            key,
            Slot {
                image,
                cost,
                last_used: now,
            },
        );

        while state.entries.len() > self.limits.max_entries
            || state.total_cost > self.limits.max_cost_bytes
        {
            let Some(victim) = state.least_recent() else {
                break;
            };
            state.remove(&victim);
            trace!(key = %victim, "evicted");
        }
        true
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_cost(&self) -> usize {
        self.state.lock().total_cost
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_cost = 0;
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new(CacheLimits::default())
    }
}
