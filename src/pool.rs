//! Pooling for table metadata buffers.
//!
//! Tables hand their backing buffer back to a [`BufferPool`] when they are
//! disposed or regrown. The pool remembers, out of band, which epoch each
//! parked buffer last saw; renting such a buffer again only advances the
//! epoch past everything the buffer may still contain, skipping the full
//! physical fill. Buffers that arrive from a different pool are filled
//! unconditionally, since their key slots would alias the new owner's key
//! storage.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::Debug;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;

use crate::meta::SlotMeta;
use crate::version::TableVersion;

/// Smallest buffer the pool hands out or keeps.
pub(crate) const POOLING_FLOOR: usize = 16;

/// Process-unique fingerprint identifying one pool's epoch domain.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolId(u128);

impl PoolId {
    /// Reserved id for buffers that never came from a pool.
    const NONE: PoolId = PoolId(0);

    fn next() -> PoolId {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let low = NEXT.fetch_add(1, Ordering::Relaxed);
        PoolId(((0x9E37_79B9_97F4_A7C3u128) << 64) | low as u128)
    }
}

impl Debug for PoolId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PoolId({:032x})", self.0)
    }
}

/// Recorded beside a parked buffer, consulted on the next rent.
///
/// Kept in the pool's own bookkeeping rather than smuggled through the
/// buffer's first slot, so no slot ever holds anything but slot metadata.
#[derive(Clone, Copy, Debug)]
struct PoolTag {
    origin: PoolId,
    version_at_return: TableVersion,
}

struct Parked {
    buffer: Box<[SlotMeta]>,
    tag: PoolTag,
}

/// A metadata buffer checked out of a [`BufferPool`].
///
/// The buffer moves by value between the pool and its table, so a
/// double-return or a use-after-return is a type error, not a runtime
/// condition.
pub(crate) struct RentedBuf {
    pub(crate) slots: Box<[SlotMeta]>,
    origin: PoolId,
}

impl RentedBuf {
    /// The zero-length buffer backing the preallocated empty table.
    pub(crate) fn empty() -> RentedBuf {
        RentedBuf {
            slots: Box::new([]),
            origin: PoolId::NONE,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

struct PoolInner {
    id: PoolId,
    shelf: Vec<Parked>,
}

/// A shelf of reusable metadata buffers.
///
/// The pool is a cheap clonable handle; every index owns one, private by
/// default and shared when several short-lived indexes should recycle the
/// same backing storage. Single-threaded by construction, like the indexes
/// it serves.
#[derive(Clone)]
pub struct BufferPool {
    inner: Rc<RefCell<PoolInner>>,
}

impl BufferPool {
    /// Creates an empty pool with a fresh fingerprint.
    pub fn new() -> BufferPool {
        BufferPool {
            inner: Rc::new(RefCell::new(PoolInner {
                id: PoolId::next(),
                shelf: Vec::new(),
            })),
        }
    }

    /// Number of buffers currently parked on the shelf.
    pub fn parked(&self) -> usize {
        self.inner.borrow().shelf.len()
    }

    /// Checks out a buffer of at least `min_len` slots (rounded up to a
    /// power of two), together with the version the new table must start
    /// at.
    ///
    /// A parked buffer carrying this pool's fingerprint is handed back
    /// without a fill: the returned version's epoch is advanced past every
    /// epoch the buffer can contain, so its stale slots are invisible. If
    /// the epoch space wraps during that advance, or the buffer's tag names
    /// a foreign pool, the buffer is physically vacant-filled instead.
    pub(crate) fn rent(&self, min_len: usize) -> (RentedBuf, TableVersion) {
        let len = min_len.max(POOLING_FLOOR).next_power_of_two();
        let mut inner = self.inner.borrow_mut();
        let id = inner.id;

        let mut best: Option<usize> = None;
        for (at, parked) in inner.shelf.iter().enumerate() {
            if parked.buffer.len() >= len
                && best.is_none_or(|b| parked.buffer.len() < inner.shelf[b].buffer.len())
            {
                best = Some(at);
            }
        }

        let Some(at) = best else {
            let slots = vec![SlotMeta::VACANT; len].into_boxed_slice();
            return (RentedBuf { slots, origin: id }, TableVersion::BASE);
        };

        let Parked { mut buffer, tag } = inner.shelf.swap_remove(at);
        let version = if tag.origin == id {
            let (version, wrapped) = tag.version_at_return.bump_epoch();
            if wrapped {
                buffer.fill(SlotMeta::VACANT);
            }
            version
        } else {
            buffer.fill(SlotMeta::VACANT);
            TableVersion::BASE
        };

        (
            RentedBuf {
                slots: buffer,
                origin: id,
            },
            version,
        )
    }

    /// Parks a buffer for later reuse, recording the version its table had
    /// reached. Buffers below the pooling floor are dropped instead.
    pub(crate) fn give_back(&self, buf: RentedBuf, version: TableVersion) {
        if buf.slots.len() < POOLING_FLOOR {
            return;
        }
        let tag = PoolTag {
            origin: buf.origin,
            version_at_return: version,
        };
        self.inner.borrow_mut().shelf.push(Parked {
            buffer: buf.slots,
            tag,
        });
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        BufferPool::new()
    }
}

impl Debug for BufferPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("BufferPool")
            .field("id", &inner.id)
            .field("parked", &inner.shelf.len())
            .finish()
    }
}
