#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod index;

mod meta;
mod probe;
mod table;
mod version;

pub mod pool;

pub use index::CapacityError;
pub use index::MAX_CAPACITY;
pub use index::SlotIndex;
pub use pool::BufferPool;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The default hasher builder, provided by `foldhash`.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The default hasher builder, the standard library's `RandomState`.
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    } else {
        /// Placeholder standing in for a default hasher builder: with
        /// neither `std` nor `foldhash` enabled there is no default, and
        /// every index must be built with an explicit hasher via
        /// `with_hasher`.
        #[derive(Clone, Copy, Debug)]
        pub enum DefaultHashBuilder {}
    }
}
