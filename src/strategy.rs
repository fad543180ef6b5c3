//! Key hashing and equality strategies injected into the tables.
//!
//! A table never calls `Hash` or `Eq` directly; it asks its strategy. The
//! default [`StandardStrategy`] defers to the key's own `Hash`/`Eq` through a
//! `BuildHasher`. [`IdentityStrategy`] turns a table into an identity map
//! over pointer-like keys.

use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;
use std::rc::Rc;
use std::sync::Arc;

/// Hash and equality for keys of type `K`.
///
/// `keys_equal(a, b)` must imply `hash_key(a) == hash_key(b)`. A strategy
/// that breaks this can make a table panic with a probe overflow.
pub trait KeyStrategy<K: ?Sized> {
    fn hash_key(&self, key: &K) -> u32;
    fn keys_equal(&self, stored: &K, probe: &K) -> bool;
}

#[inline]
fn fold(hash: u64) -> u32 {
    (hash ^ (hash >> 32)) as u32
}

/// Uses the key's `Hash` and `Eq`.
#[derive(Clone, Debug, Default)]
pub struct StandardStrategy<S = RandomState> {
    hasher: S,
}

impl<S> StandardStrategy<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self { hasher }
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }
}

impl<K, S> KeyStrategy<K> for StandardStrategy<S>
where
    K: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    #[inline]
    fn hash_key(&self, key: &K) -> u32 {
        fold(self.hasher.hash_one(key))
    }

    #[inline]
    fn keys_equal(&self, stored: &K, probe: &K) -> bool {
        stored == probe
    }
}

/// Keys that have an address to compare by.
pub trait Identity {
    fn identity(&self) -> *const ();
}

impl<T: ?Sized> Identity for &T {
    #[inline]
    fn identity(&self) -> *const () {
        (*self as *const T).cast()
    }
}

impl<T: ?Sized> Identity for Rc<T> {
    #[inline]
    fn identity(&self) -> *const () {
        Rc::as_ptr(self).cast()
    }
}

impl<T: ?Sized> Identity for Arc<T> {
    #[inline]
    fn identity(&self) -> *const () {
        Arc::as_ptr(self).cast()
    }
}

/// Compares keys by address only; `Eq` is never consulted.
#[derive(Copy, Clone, Debug, Default)]
pub struct IdentityStrategy;

impl<K: ?Sized + Identity> KeyStrategy<K> for IdentityStrategy {
    #[inline]
    fn hash_key(&self, key: &K) -> u32 {
        fold(key.identity() as usize as u64)
    }

    #[inline]
    fn keys_equal(&self, stored: &K, probe: &K) -> bool {
        core::ptr::eq(stored.identity(), probe.identity())
    }
}
