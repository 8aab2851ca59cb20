//! Registry of live attachment bags.
//!
//! The registry is constructed explicitly by the runtime that owns it and torn
//! down explicitly (or on drop). Teardown raises a one-way finished flag,
//! reports every bag still alive as a leak and force-reclaims it.

use super::bag::{AttachmentBag, BagInner};
use super::AttachmentError;
use crate::id::BagId;
use std::collections::BTreeMap;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_BAG_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct RegistryShared {
    live: Mutex<BTreeMap<BagId, Arc<BagInner>>>,
    finished: AtomicBool,
}

impl RegistryShared {
    fn live(&self) -> MutexGuard<'_, BTreeMap<BagId, Arc<BagInner>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn unregister(&self, id: BagId) {
        if self.live().remove(&id).is_none() {
            tracing::error!(bag = %id, "released bag was not registered");
        }
    }
}

/// A bag that was still alive when the registry was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakedBag {
    pub id: BagId,
    pub tag: Option<&'static str>,
    pub caller: Option<&'static str>,
    pub refcount: i64,
    pub populated: usize,
}

/// Outcome of [`AttachmentRegistry::teardown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakReport {
    pub leaked: Vec<LeakedBag>,
}

impl LeakReport {
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty()
    }
}

/// Owner of every attachment bag created for one runtime session.
pub struct AttachmentRegistry {
    shared: Arc<RegistryShared>,
}

impl AttachmentRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(RegistryShared {
                live: Mutex::new(BTreeMap::new()),
                finished: AtomicBool::new(false),
            }),
        })
    }

    /// Create a bag with refcount 1 and register it.
    ///
    /// `caller` names the owning component; the source location of the call
    /// is recorded as well and shows up in leak reports.
    #[track_caller]
    pub fn acquire(
        &self,
        tag: Option<&'static str>,
        caller: Option<&'static str>,
    ) -> Result<AttachmentBag, AttachmentError> {
        if self.shared.is_finished() {
            return Err(AttachmentError::RegistryFinished);
        }

        let id = BagId(NEXT_BAG_ID.fetch_add(1, Ordering::Relaxed));
        let inner = Arc::new(BagInner::new(
            id,
            tag,
            caller,
            Location::caller(),
            Arc::downgrade(&self.shared),
        ));

        self.shared.live().insert(id, inner.clone());
        tracing::trace!(bag = %id, tag = tag.unwrap_or("-"), "attachment bag acquired");
        Ok(AttachmentBag::from_inner(inner))
    }

    pub fn live_count(&self) -> usize {
        self.shared.live().len()
    }

    pub fn live_ids(&self) -> Vec<BagId> {
        self.shared.live().keys().copied().collect()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Log every live bag at debug level.
    pub fn dump(&self, reason: &str) {
        let live = self.shared.live();
        tracing::debug!("attachment registry dump ({}): {} live", reason, live.len());
        for bag in live.values() {
            tracing::debug!(
                bag = %bag.id(),
                tag = bag.tag().unwrap_or("-"),
                caller = bag.caller().unwrap_or("-"),
                refcount = bag.refcount(),
                populated = bag.populated(),
                "  live bag acquired at {}",
                bag.location()
            );
        }
    }

    /// Finish the registry. Later `acquire` calls fail and later `release`
    /// calls are no-ops. Bags still alive are logged and reclaimed.
    pub fn teardown(&self) -> LeakReport {
        if self.shared.finished.swap(true, Ordering::AcqRel) {
            return LeakReport::default();
        }

        let stragglers = std::mem::take(&mut *self.shared.live());
        let mut report = LeakReport::default();

        for bag in stragglers.into_values() {
            tracing::warn!(
                bag = %bag.id(),
                tag = bag.tag().unwrap_or("-"),
                caller = bag.caller().unwrap_or("-"),
                refcount = bag.refcount(),
                "attachment bag leaked, acquired at {}",
                bag.location()
            );
            report.leaked.push(LeakedBag {
                id: bag.id(),
                tag: bag.tag(),
                caller: bag.caller(),
                refcount: bag.refcount(),
                populated: bag.populated(),
            });
            bag.reclaim();
        }

        if report.is_clean() {
            tracing::debug!("attachment registry finished clean");
        } else {
            tracing::warn!("attachment registry finished with {} leaked bags", report.leaked.len());
        }
        report
    }
}

impl Drop for AttachmentRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for AttachmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentRegistry")
            .field("live", &self.live_count())
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::{AttachmentKey, Release};

    #[test]
    fn test_ids_increase() {
        let registry = AttachmentRegistry::new();
        let a = registry.acquire(None, None).unwrap();
        let b = registry.acquire(None, None).unwrap();
        assert!(b.id() > a.id());
        assert_eq!(registry.live_ids(), vec![a.id(), b.id()]);
        a.release();
        b.release();
        assert!(registry.teardown().is_clean());
    }

    #[test]
    fn test_teardown_reports_and_reclaims_leaks() {
        let registry = AttachmentRegistry::new();
        let kept = registry.acquire(Some("leaky"), Some("test")).unwrap();
        kept.set(AttachmentKey::Pts, 5i64).unwrap();
        let freed = registry.acquire(Some("tidy"), None).unwrap();
        freed.release();

        let report = registry.teardown();
        assert_eq!(report.leaked.len(), 1);
        assert_eq!(report.leaked[0].id, kept.id());
        assert_eq!(report.leaked[0].tag, Some("leaky"));
        assert_eq!(report.leaked[0].populated, 1);

        assert!(kept.is_released());
        assert_eq!(registry.live_count(), 0);
        // Releases after teardown are defensive no-ops.
        assert_eq!(kept.release(), Release::Ignored);
    }

    #[test]
    fn test_acquire_after_teardown_fails() {
        let registry = AttachmentRegistry::new();
        registry.teardown();
        assert!(registry.is_finished());
        assert_eq!(
            registry.acquire(None, None).unwrap_err(),
            AttachmentError::RegistryFinished
        );
        // Second teardown is harmless.
        assert!(registry.teardown().is_clean());
    }

    #[test]
    fn test_release_after_registry_dropped_is_noop() {
        let registry = AttachmentRegistry::new();
        let bag = registry.acquire(None, None).unwrap();
        drop(registry);
        assert_eq!(bag.release(), Release::Ignored);
        assert!(bag.is_released());
    }
}
