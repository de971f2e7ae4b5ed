//! # Lineage resolution.
//!
//! [`TypeResolver::types_for`] computes, for a concrete dispatch key, the
//! ordered set of keys subscriptions are matched against: the key itself,
//! then each ancestor along the parent chain, interleaving every class's
//! facets (transitively, each key visited once, in discovery order).
//!
//! The flattening is pure and deterministic for a given key, so results are
//! memoized - lineage is immutable at runtime.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::graph::TypeGraph;
use super::key::TypeKey;

/// Caching lineage resolver over an immutable [`TypeGraph`].
pub(crate) struct TypeResolver {
    graph: TypeGraph,
    cache: RwLock<HashMap<TypeKey, Arc<[TypeKey]>>>,
}

impl TypeResolver {
    pub(crate) fn new(graph: TypeGraph) -> Self {
        Self {
            graph,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the ordered lineage of `key`.
    ///
    /// Unknown keys resolve to the singleton `[key]`.
    pub(crate) fn types_for(&self, key: TypeKey) -> Arc<[TypeKey]> {
        if let Some(hit) = self.cache.read().get(&key) {
            return Arc::clone(hit);
        }
        let flat: Arc<[TypeKey]> = self.flatten(key).into();
        let mut cache = self.cache.write();
        Arc::clone(cache.entry(key).or_insert(flat))
    }

    fn flatten(&self, key: TypeKey) -> Vec<TypeKey> {
        let mut out = Vec::new();
        let mut class = Some(key);
        while let Some(current) = class {
            if push_unique(&mut out, current) {
                self.push_facets(current, &mut out);
            }
            class = self.graph.parent(current);
        }
        out
    }

    fn push_facets(&self, key: TypeKey, out: &mut Vec<TypeKey>) {
        for &facet in self.graph.facets(key) {
            if push_unique(out, facet) {
                self.push_facets(facet, out);
            }
        }
    }
}

/// Appends `key` unless already present; lineages are short, so a linear
/// scan beats hashing here.
fn push_unique(out: &mut Vec<TypeKey>, key: TypeKey) -> bool {
    if out.contains(&key) {
        return false;
    }
    out.push(key);
    true
}
