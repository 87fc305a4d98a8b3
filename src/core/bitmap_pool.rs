//! Weakly-held pool of retired bitmaps available for buffer reuse
//!
//! **Why**: Every displayed frame is a fresh decode. Refilling a retired
//! bitmap whose allocation is large enough avoids one allocation per frame.
//!
//! The pool never extends a bitmap's lifetime: candidates are `Weak`, and a
//! candidate whose bitmap has been dropped is pruned on the next scan.
//!
//! **Used by**: FrameSource (acquire before decode), FrameRenderer (offer on retire)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::entities::frame::{byte_footprint, Bitmap, BitmapHandle, PixelFormat};

/// Compatibility test between a candidate and a pending decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReuseRule {
    /// Allocation must hold `width * height * bytes_per_pixel`
    #[default]
    ByteCapacity,
    /// Width and height must match exactly (allocation size unknown to the decoder)
    ExactDimensions,
}

impl ReuseRule {
    fn fits(self, candidate: &Bitmap, width: u32, height: u32, format: PixelFormat) -> bool {
        match self {
            ReuseRule::ByteCapacity => {
                byte_footprint(width, height, format) <= candidate.allocation_byte_count()
            }
            ReuseRule::ExactDimensions => candidate.dimensions() == (width, height),
        }
    }
}

/// Pool statistics for diagnostics
#[derive(Debug, Default)]
pub struct PoolStats {
    hits: AtomicU64,
    misses: AtomicU64,
    pruned: AtomicU64,
}

impl PoolStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Candidates dropped because their bitmap was gone or immutable
    pub fn pruned(&self) -> u64 {
        self.pruned.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }
}

/// Weak reference to a retired bitmap plus its allocation size at offer time
#[derive(Debug)]
struct ReuseCandidate {
    bitmap: Weak<Bitmap>,
    capacity: usize,
}

/// Reuse pool. `offer` and `acquire` serialize on one mutex and may be called
/// from different threads.
#[derive(Debug, Default)]
pub struct BitmapReusePool {
    candidates: Mutex<Vec<ReuseCandidate>>,
    rule: ReuseRule,
    stats: PoolStats,
}

impl BitmapReusePool {
    pub fn new(rule: ReuseRule) -> Self {
        Self {
            candidates: Mutex::new(Vec::new()),
            rule,
            stats: PoolStats::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ReuseCandidate>> {
        self.candidates.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn rule(&self) -> ReuseRule {
        self.rule
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Make `bitmap` available to future decodes without keeping it alive
    pub fn offer(&self, bitmap: &BitmapHandle) {
        if bitmap.is_released() {
            return;
        }
        let weak = Arc::downgrade(bitmap);
        let mut candidates = self.lock();
        if candidates.iter().any(|c| c.bitmap.ptr_eq(&weak)) {
            return;
        }
        let capacity = bitmap.allocation_byte_count();
        trace!("Pool offer: {} bytes ({} candidates)", capacity, candidates.len() + 1);
        candidates.push(ReuseCandidate {
            bitmap: weak,
            capacity,
        });
    }

    /// Take the first live, mutable candidate that fits a `width x height` decode.
    ///
    /// Dead and immutable candidates met during the scan are removed.
    pub fn acquire(&self, width: u32, height: u32, format: PixelFormat) -> Option<BitmapHandle> {
        let rule = self.rule;
        let mut found: Option<BitmapHandle> = None;
        let mut pruned = 0u64;

        let mut candidates = self.lock();
        candidates.retain(|candidate| {
            if found.is_some() {
                return true;
            }
            match candidate.bitmap.upgrade() {
                Some(bitmap) if bitmap.is_mutable() => {
                    if rule.fits(&bitmap, width, height, format) {
                        found = Some(bitmap);
                        false
                    } else {
                        true
                    }
                }
                _ => {
                    pruned += 1;
                    false
                }
            }
        });
        drop(candidates);

        if pruned > 0 {
            self.stats.pruned.fetch_add(pruned, Ordering::Relaxed);
            debug!("Pool pruned {} stale candidates", pruned);
        }
        match found {
            Some(bitmap) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                trace!("Pool hit: {}x{} {:?}", width, height, format);
                Some(bitmap)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Drop candidates whose bitmap no longer exists. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut candidates = self.lock();
        let before = candidates.len();
        candidates.retain(|c| c.bitmap.strong_count() > 0);
        let removed = before - candidates.len();
        self.stats.pruned.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Total bytes offered by candidates that are still alive
    pub fn live_capacity(&self) -> usize {
        self.lock()
            .iter()
            .filter(|c| c.bitmap.strong_count() > 0)
            .map(|c| c.capacity)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
