use core::fmt::Debug;

/// Generation stamp for a table's contents.
///
/// Every live slot carries the epoch it was written under; a slot whose
/// epoch differs from the table's current epoch is stale and reads as
/// empty. Epoch 0 is reserved for never-used slots and is never issued to
/// a live table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Epoch(pub(crate) u16);

impl Epoch {
    pub(crate) fn get(self) -> u16 {
        self.0
    }
}

impl Debug for Epoch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

const EPOCH_MASK: u32 = u16::MAX as u32;
const GENERATION_SHIFT: u32 = 16;

/// The table's full version word: the current epoch in the low 16 bits and
/// a generation counter in the high 16 bits.
///
/// The generation advances each time the epoch space wraps, so the raw word
/// keeps changing across clears for the whole practical lifetime of a
/// table. The raw value is what `version_token` exposes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct TableVersion(u32);

impl TableVersion {
    /// Starting version for a fresh buffer: generation 0, epoch 1.
    pub(crate) const BASE: TableVersion = TableVersion(1);

    pub(crate) fn epoch(self) -> Epoch {
        Epoch(self.0 as u16)
    }

    pub(crate) fn generation(self) -> u16 {
        (self.0 >> GENERATION_SHIFT) as u16
    }

    pub(crate) fn raw(self) -> u32 {
        self.0
    }

    /// Advances to the next epoch, reporting whether the 16-bit epoch space
    /// wrapped. On a wrap the increment steps over the reserved epoch 0 and
    /// carries into the generation; the caller must vacant-fill the buffer,
    /// because slots from 65535 epochs ago would otherwise read as live
    /// again.
    pub(crate) fn bump_epoch(self) -> (TableVersion, bool) {
        let wrapped = self.0 & EPOCH_MASK == EPOCH_MASK;
        let step = if wrapped { 2 } else { 1 };
        (TableVersion(self.0.wrapping_add(step)), wrapped)
    }

    /// Carries this version's generation, advanced by one, onto the epoch
    /// of a freshly rented buffer.
    ///
    /// A table that swaps buffers keeps its raw word increasing this way:
    /// the rented epoch stays authoritative for the buffer's contents,
    /// while the bumped generation keeps the combined token from ever
    /// repeating a value the old buffer already produced.
    pub(crate) fn reuse_epoch(self, rented: TableVersion) -> TableVersion {
        let generation = self.generation().wrapping_add(1) as u32;
        TableVersion((generation << GENERATION_SHIFT) | rented.epoch().get() as u32)
    }
}

impl Debug for TableVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "g{}/{:?}", self.generation(), self.epoch())
    }
}
