//! Per-task attachment bag.
//!
//! A bag owns one single-value mailbox per catalog key. Mailboxes move
//! through Empty → Claimed → Ready → Empty using a single compare-and-swap per
//! operation, so `set`/`get` never block and never take a lock.
//!
//! The bag also carries an explicit protocol refcount (`retain`/`release`).
//! The Rust handle is a cheap `Arc` clone; the protocol count decides when the
//! bag is unregistered and its values dropped.

use super::key::{AttachmentKey, AttachmentType, AttachmentValue};
use super::registry::RegistryShared;
use super::AttachmentError;
use crate::id::BagId;
use crossbeam_utils::atomic::AtomicCell;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

const EMPTY: u8 = 0;
const CLAIMED: u8 = 1;
const READY: u8 = 2;

/// Observable state of one mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Claimed,
    Ready,
}

impl SlotState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            CLAIMED => SlotState::Claimed,
            READY => SlotState::Ready,
            _ => SlotState::Empty,
        }
    }
}

/// Result of a `release` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other holders remain.
    Retained,
    /// This call dropped the last reference; the bag is gone.
    Freed,
    /// Unbalanced release or registry already torn down; nothing happened.
    Ignored,
}

struct Mailbox {
    state: AtomicU8,
    value: AtomicCell<Option<AttachmentValue>>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: AtomicCell::new(None),
        }
    }
}

pub(crate) struct BagInner {
    id: BagId,
    tag: Option<&'static str>,
    caller: Option<&'static str>,
    location: &'static Location<'static>,
    refcount: AtomicI64,
    populated: AtomicUsize,
    released: AtomicBool,
    mailboxes: Box<[Mailbox]>,
    registry: Weak<RegistryShared>,
}

impl BagInner {
    pub(crate) fn new(
        id: BagId,
        tag: Option<&'static str>,
        caller: Option<&'static str>,
        location: &'static Location<'static>,
        registry: Weak<RegistryShared>,
    ) -> Self {
        Self {
            id,
            tag,
            caller,
            location,
            refcount: AtomicI64::new(1),
            populated: AtomicUsize::new(0),
            released: AtomicBool::new(false),
            mailboxes: (0..AttachmentKey::COUNT).map(|_| Mailbox::new()).collect(),
            registry,
        }
    }

    pub(crate) fn id(&self) -> BagId {
        self.id
    }

    pub(crate) fn tag(&self) -> Option<&'static str> {
        self.tag
    }

    pub(crate) fn caller(&self) -> Option<&'static str> {
        self.caller
    }

    pub(crate) fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub(crate) fn refcount(&self) -> i64 {
        self.refcount.load(Ordering::Acquire)
    }

    pub(crate) fn populated(&self) -> usize {
        self.populated.load(Ordering::Acquire)
    }

    /// Drop every held value and mark the bag dead. Runs once.
    pub(crate) fn reclaim(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        for mailbox in self.mailboxes.iter() {
            mailbox.state.store(EMPTY, Ordering::Release);
            drop(mailbox.value.take());
        }
        self.populated.store(0, Ordering::Release);
    }
}

/// Handle to a reference-counted attachment bag.
///
/// Cloning the handle does not touch the protocol refcount; use
/// [`retain`](Self::retain) to register an additional holder.
#[derive(Clone)]
pub struct AttachmentBag {
    inner: Arc<BagInner>,
}

impl AttachmentBag {
    pub(crate) fn from_inner(inner: Arc<BagInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> BagId {
        self.inner.id
    }

    pub fn tag(&self) -> Option<&'static str> {
        self.inner.tag
    }

    /// Current protocol refcount. Zero once the bag has been freed.
    pub fn refcount(&self) -> i64 {
        self.inner.refcount()
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    #[inline]
    fn live(&self) -> Result<&BagInner, AttachmentError> {
        if self.is_released() {
            return Err(AttachmentError::BagReleased(self.inner.id));
        }
        Ok(&self.inner)
    }

    #[inline]
    fn mailbox<T: AttachmentType>(&self, key: AttachmentKey) -> Result<&Mailbox, AttachmentError> {
        let inner = self.live()?;
        if key.kind() != T::KIND {
            return Err(AttachmentError::InvalidKey {
                key,
                expected: key.kind(),
                actual: T::KIND,
            });
        }
        Ok(&inner.mailboxes[key.index()])
    }

    /// Register another holder.
    pub fn retain(&self) -> Result<(), AttachmentError> {
        let inner = self.live()?;
        inner.refcount.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Drop one holder. The 1→0 transition unregisters the bag and drops all
    /// values it still holds.
    pub fn release(&self) -> Release {
        let registry = match self.inner.registry.upgrade() {
            Some(registry) if !registry.is_finished() => registry,
            _ => return Release::Ignored,
        };

        let previous = self
            .inner
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 0).then(|| count - 1)
            });

        match previous {
            Ok(1) => {
                registry.unregister(self.inner.id);
                self.inner.reclaim();
                tracing::trace!(bag = %self.inner.id, "attachment bag freed");
                Release::Freed
            }
            Ok(_) => Release::Retained,
            Err(count) => {
                tracing::error!(
                    bag = %self.inner.id,
                    tag = self.inner.tag.unwrap_or("-"),
                    refcount = count,
                    "unbalanced release of attachment bag ignored"
                );
                Release::Ignored
            }
        }
    }

    /// Store `value` under `key` and mark it ready.
    ///
    /// Only the caller that moves the mailbox out of Empty bumps the populated
    /// count; the write itself always happens, so concurrent producers on one
    /// key between consumes resolve as last-writer-wins.
    pub fn set<T: AttachmentType>(&self, key: AttachmentKey, value: T) -> Result<(), AttachmentError> {
        let mailbox = self.mailbox::<T>(key)?;

        if mailbox
            .state
            .compare_exchange(EMPTY, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.inner.populated.fetch_add(1, Ordering::AcqRel);
        }

        mailbox.value.store(Some(value.into_value()));
        mailbox.state.store(READY, Ordering::Release);
        Ok(())
    }

    /// Take the value under `key`. Succeeds at most once per ready value.
    ///
    /// The Ready → Empty transition and the read of the value are separate
    /// steps. A producer that observes Empty in between publishes over the
    /// value being consumed: this call then returns the newer value, the older
    /// one is dropped, and the mailbox stays Ready with nothing in it until the
    /// next `get` reports `NotReady` and rebalances the populated count.
    pub fn get<T: AttachmentType>(&self, key: AttachmentKey) -> Result<T, AttachmentError> {
        let mailbox = self.mailbox::<T>(key)?;

        if !self.consume(mailbox) {
            return Err(AttachmentError::NotReady(key));
        }

        mailbox
            .value
            .take()
            .and_then(T::from_value)
            .ok_or(AttachmentError::NotReady(key))
    }

    /// Win the Ready → Empty transition and drop the populated count.
    fn consume(&self, mailbox: &Mailbox) -> bool {
        let won = mailbox
            .state
            .compare_exchange(READY, EMPTY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.inner.populated.fetch_sub(1, Ordering::AcqRel);
        }
        won
    }

    /// Like [`get`](Self::get), mapping `NotReady` to `None`.
    pub fn take<T: AttachmentType>(&self, key: AttachmentKey) -> Result<Option<T>, AttachmentError> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(AttachmentError::NotReady(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Number of mailboxes in Claimed or Ready state.
    pub fn size(&self) -> Result<usize, AttachmentError> {
        Ok(self.live()?.populated())
    }

    pub fn state(&self, key: AttachmentKey) -> Result<SlotState, AttachmentError> {
        let inner = self.live()?;
        Ok(SlotState::from_raw(
            inner.mailboxes[key.index()].state.load(Ordering::Acquire),
        ))
    }

    /// Empty every mailbox. Only valid while the caller exclusively owns the
    /// task carrying this bag.
    pub fn clear(&self) -> Result<(), AttachmentError> {
        let inner = self.live()?;
        for mailbox in inner.mailboxes.iter() {
            if mailbox.state.swap(EMPTY, Ordering::AcqRel) != EMPTY {
                inner.populated.fetch_sub(1, Ordering::AcqRel);
            }
            drop(mailbox.value.take());
        }
        Ok(())
    }
}

impl std::fmt::Debug for AttachmentBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentBag")
            .field("id", &self.inner.id)
            .field("tag", &self.inner.tag)
            .field("refcount", &self.inner.refcount())
            .field("populated", &self.inner.populated())
            .field("released", &self.is_released())
            .finish()
    }
}
