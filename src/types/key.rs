//! Type identity for dispatch keys.
//!
//! [`TypeKey`] is the unit the whole dispatcher is keyed on: registries,
//! sticky stores, deferred buffers and the lineage graph all index by it.
//! It pairs a [`TypeId`] (the identity) with the type name (for diagnostics
//! and log output); equality and hashing use the id only.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a Rust type used as a dispatch key.
///
/// Constructible for any `'static` type, including trait objects:
///
/// ```
/// use polybus::TypeKey;
///
/// trait Audited {}
///
/// let concrete = TypeKey::of::<String>();
/// let facet = TypeKey::of::<dyn Audited>();
/// assert_ne!(concrete, facet);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Returns the underlying [`TypeId`].
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the full type name (diagnostic use only; not stable identity).
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
