//! The probe/insert/clear engine.
//!
//! A [`Table`] owns a power-of-two metadata buffer rented from a
//! [`BufferPool`] and nothing else; key storage and key equality live with
//! the caller and reach the engine as closures over key slots. One walk
//! routine serves lookups and insertions alike: it follows a key's stride
//! until it either meets the key's own packed word or passes the point
//! where that word would have to be.

use core::fmt::Debug;
use core::mem;

use crate::meta::EPOCH_SHIFT;
use crate::meta::MAX_COUNTED_DISTANCE;
use crate::meta::SlotData;
use crate::meta::SlotMeta;
use crate::pool::BufferPool;
use crate::pool::RentedBuf;
use crate::probe::Jump;
use crate::probe::wrap;
use crate::version::TableVersion;

/// Step width for the next probe: the key's own stride while the walked
/// word can still count its distance, and 1 once it has saturated. The
/// saturated tail of every chain is a plain linear scan, so chains that
/// outgrow the distance field stay findable no matter which stride built
/// them.
#[inline(always)]
fn step(entry: SlotData, jump: Jump) -> usize {
    if entry.distance() < MAX_COUNTED_DISTANCE {
        jump.stride()
    } else {
        1
    }
}

/// Outcome of a probe walk.
pub(crate) enum Probe {
    /// The key is present at this key slot.
    Found(usize),
    /// The key is absent; this is where it belongs.
    Vacant(VacantSlot),
}

/// An insertion point: the slot index where the walk ended and the packed
/// word the new entry carries there.
#[derive(Clone, Copy)]
pub(crate) struct VacantSlot {
    index: usize,
    data: SlotData,
}

pub(crate) struct Table {
    slots: RentedBuf,
    version: TableVersion,
    count: usize,
}

impl Table {
    /// The preallocated empty table: every lookup misses, and growth rents
    /// real storage before the first insertion.
    pub(crate) fn empty() -> Table {
        Table {
            slots: RentedBuf::empty(),
            version: TableVersion::BASE,
            count: 0,
        }
    }

    pub(crate) fn rent(pool: &BufferPool, min_len: usize) -> Table {
        let (slots, version) = pool.rent(min_len);
        Table {
            slots,
            version,
            count: 0,
        }
    }

    /// Hands the backing buffer back to `pool`, recording the version it
    /// reached.
    pub(crate) fn release(self, pool: &BufferPool) {
        pool.give_back(self.slots, self.version);
    }

    /// Number of slots in the table.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Number of live entries.
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn version(&self) -> TableVersion {
        self.version
    }

    /// Overrides the version word. The caller must keep the epoch
    /// authoritative for the buffer's contents; the index uses this to
    /// carry its generation across a buffer swap.
    pub(crate) fn set_version(&mut self, version: TableVersion) {
        debug_assert_eq!(version.epoch(), self.version.epoch());
        self.version = version;
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// Packed words below this value belong to earlier epochs (or to
    /// never-used slots) and read as empty.
    #[inline(always)]
    fn epoch_floor(&self) -> u32 {
        (self.version.epoch().get() as u32) << EPOCH_SHIFT
    }

    /// Looks up `hash`, testing candidate key slots with `eq`. Returns the
    /// key slot the key was assigned when it was inserted.
    pub(crate) fn find(&self, hash: u32, eq: impl FnMut(usize) -> bool) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        match self.walk(hash, eq) {
            Probe::Found(key_slot) => Some(key_slot),
            Probe::Vacant(_) => None,
        }
    }

    /// The shared probe walk. Starting from the key's home slot, the walked
    /// entry word gains one stride of distance per step; the stored word
    /// matching it exactly is the key's own run (resolved by `eq`), and the
    /// first stored word strictly below it proves the key absent and marks
    /// the insertion point.
    pub(crate) fn walk(&self, hash: u32, mut eq: impl FnMut(usize) -> bool) -> Probe {
        debug_assert!(!self.slots.is_empty());
        let slots = &self.slots.slots;
        let mask = self.mask();

        let mut entry = SlotData::new_entry(hash, self.version.epoch());
        let jump = Jump::from_data(entry);
        let mut pos = wrap(hash as usize, mask);
        let mut steps = 0usize;

        loop {
            let stored = slots[pos];
            if stored.data == entry {
                if stored.key_slot >= 0 && eq(stored.key_slot as usize) {
                    return Probe::Found(stored.key_slot as usize);
                }
            } else if stored.data < entry {
                return Probe::Vacant(VacantSlot { index: pos, data: entry });
            }

            steps += 1;
            // A walk touches each slot at most once per phase (strided,
            // then linear after saturation), so twice the table length
            // means the table is full or the order invariant is broken.
            assert!(
                steps <= slots.len() * 2,
                "probe outran the table without resolving; the table is corrupted"
            );
            pos = wrap(pos + step(entry, jump), mask);
            entry = entry.add_jump(jump);
        }
    }

    /// Writes `key_slot` into an insertion point found by
    /// [`walk`](Self::walk), relocating any live occupant down its own
    /// chain. Returns the probe distance at which the incoming entry
    /// settled, so the caller can track collision pressure.
    ///
    /// Displacement is the Robin Hood step: the arriving word is always the
    /// larger one at its slot, so the occupant it evicts re-walks forward
    /// with its own stride, evicting in turn wherever its word is larger,
    /// until an empty or stale slot absorbs the chain. The chain writes
    /// metadata only; it cannot allocate or grow the table.
    pub(crate) fn install(&mut self, vacant: VacantSlot, key_slot: usize) -> u32 {
        let settled_distance = vacant.data.distance();
        let epoch_floor = self.epoch_floor();
        let mask = self.mask();
        let slots = &mut self.slots.slots;

        let incoming = SlotMeta::new(key_slot as i32, vacant.data);
        let mut displaced = mem::replace(&mut slots[vacant.index], incoming);
        self.count += 1;

        if displaced.data.raw() < epoch_floor {
            return settled_distance;
        }

        let mut pos = vacant.index;
        loop {
            let mut data = displaced.data;
            let jump = Jump::from_data(data);
            let mut steps = 0usize;
            loop {
                pos = wrap(pos + step(data, jump), mask);
                data = data.add_jump(jump);

                let stored = slots[pos];
                if stored.data.raw() < epoch_floor {
                    slots[pos] = displaced.with_data(data);
                    return settled_distance;
                }
                if stored.data < data {
                    slots[pos] = displaced.with_data(data);
                    displaced = stored;
                    break;
                }

                steps += 1;
                assert!(
                    steps <= slots.len() * 2,
                    "displacement chain outran the table; the table is corrupted"
                );
            }
        }
    }

    /// Reinserts an existing key during a rehash. Returns the settled probe
    /// distance.
    ///
    /// # Panics
    ///
    /// Panics if the key is already present: two key slots holding equal
    /// keys means the caller's `Eq`/`Hash` contract is broken, and
    /// continuing would silently corrupt the index.
    pub(crate) fn reinsert(
        &mut self,
        hash: u32,
        key_slot: usize,
        eq: impl FnMut(usize) -> bool,
    ) -> u32 {
        match self.walk(hash, eq) {
            Probe::Found(_) => panic!("duplicate key encountered during rehash"),
            Probe::Vacant(vacant) => self.install(vacant, key_slot),
        }
    }

    /// Logically empties the table by advancing the epoch: every live word
    /// drops below the new epoch floor without a single slot being touched.
    /// Only when the 16-bit epoch space wraps is the buffer physically
    /// vacant-filled.
    pub(crate) fn clear(&mut self) {
        self.count = 0;
        let (version, wrapped) = self.version.bump_epoch();
        self.version = version;
        if wrapped {
            self.slots.slots.fill(SlotMeta::VACANT);
        }
    }
}

impl Debug for Table {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let epoch_floor = self.epoch_floor();
        f.debug_struct("Table")
            .field("len", &self.len())
            .field("count", &self.count)
            .field("version", &self.version)
            .field(
                "live",
                &self
                    .slots
                    .slots
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.data.raw() >= epoch_floor)
                    .map(|(at, slot)| (at, *slot))
                    .collect::<alloc::vec::Vec<_>>(),
            )
            .finish()
    }
}
