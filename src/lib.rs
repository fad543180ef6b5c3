//! probe-util: open-addressing hash tables built on a golden-ratio probe
//! sequence, and a whitelist-driven HTML sanitizer that uses them.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one probing scheme, three tables with different sharing
//!   contracts, and a sanitizer whose regex patterns are cached in the
//!   lock-free table.
//! - Layers:
//!   - `probe`: power-of-two geometry, golden-ratio index and odd step,
//!     tagged-union slots, and the fatal probe-overflow path.
//!   - `strategy`: the `KeyStrategy` seam for hashing and equality;
//!     `StandardStrategy` (Hash/Eq via a `BuildHasher`) and
//!     `IdentityStrategy` (address identity).
//!   - `MutableHashTable<K, V, H>`: single-owner map with removal. Small
//!     tables are searched linearly; larger ones probe and leave tombstones.
//!   - `GrowOnlyTable<K, V, H>`: no removal; writers lock, readers never do.
//!   - `MultiKeyTable<K, V, H>`: composite keys of arity 2 to 4 in a flat
//!     key array with linear probing.
//!   - `html`: `escape`, `HtmlSanitizer::{escape_unsafe, filter_unsafe_html}`
//!     and `convert_to_plain_text`.
//!   - `PatternCache`: `GrowOnlyTable<String, Regex>` shared by sanitizers.
//!
//! Constraints
//! - Table size is a power of two; live entries plus tombstones stay at or
//!   below three quarters of it. Reaching the threshold on insert rehashes,
//!   doubling unless most of the load is tombstones.
//! - A probe that runs past its bound means `Hash` and `Eq` disagree or the
//!   counts are corrupt. It panics; it never returns a default.
//! - Lookups accept any borrowed form `Q` of the key (`K: Borrow<Q>`).
//!
//! Concurrency
//! - `MutableHashTable` and `MultiKeyTable` rely on `&mut self` for
//!   mutation; no internal locking and no shared scratch state.
//! - `GrowOnlyTable` publishes each entry value-first and each grown
//!   snapshot with one atomic swap, so a reader sees the old table or the
//!   new one, never a partial rehash. Storage a reader might still hold is
//!   released only through `&mut self`.
//! - A debug-only guard catches a writer reentering the same
//!   `GrowOnlyTable` from `Hash`/`Eq`, which would otherwise deadlock.
//!
//! Sanitizer error policy
//! - Malformed tags are `TagError`s, logged at debug level and escaped as
//!   text. Sanitizing never fails a call.
//!
//! Notes and non-goals
//! - Iteration order is slot order; it is neither insertion order nor
//!   stable across growth.
//! - No removal on `GrowOnlyTable`.

pub mod grow_only_table;
pub mod hash_table;
mod hash_table_proptest;
pub mod html;
pub mod multi_key_table;
pub mod patterns;
mod probe;
mod reentrancy;
pub mod strategy;

// Public surface
pub use grow_only_table::GrowOnlyTable;
pub use hash_table::{MutableHashTable, LINEAR_SEARCH_LIMIT};
pub use html::{
    convert_to_plain_text, escape, ConfigError, HtmlSanitizer, SanitizerConfig, TagError,
};
pub use multi_key_table::{ArityError, MultiKeyTable, TupleRef};
pub use patterns::{PatternCache, PatternError};
pub use strategy::{Identity, IdentityStrategy, KeyStrategy, StandardStrategy};
