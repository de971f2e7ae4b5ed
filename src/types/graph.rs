//! # Host-declared type lineage.
//!
//! Rust has no runtime class hierarchy, so polymorphic matching works off a
//! lineage table the host declares once at configuration time: each event
//! type may name one parent (`extends`) and any number of facets
//! (`implements`, typically trait-object keys). The [`TypeGraph`] is
//! immutable after `build()`; the resolver flattens and caches it.
//!
//! ## Example
//! ```
//! use polybus::TypeGraph;
//!
//! trait OrderEvent {}
//! struct OrderCreated;
//! struct OrderShipped;
//!
//! let graph = TypeGraph::builder()
//!     .implements::<OrderCreated, dyn OrderEvent>()
//!     .implements::<OrderShipped, dyn OrderEvent>()
//!     .build();
//! # let _ = graph;
//! ```

use std::collections::HashMap;

use super::key::TypeKey;

#[derive(Default)]
struct TypeNode {
    parent: Option<TypeKey>,
    facets: Vec<TypeKey>,
}

/// Immutable lineage table: per type, one optional parent and an ordered
/// list of facets.
#[derive(Default)]
pub struct TypeGraph {
    nodes: HashMap<TypeKey, TypeNode>,
}

impl TypeGraph {
    /// Returns a builder for declaring lineage edges.
    pub fn builder() -> TypeGraphBuilder {
        TypeGraphBuilder {
            graph: TypeGraph::default(),
        }
    }

    /// Returns an empty graph (exact-type matching only).
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn parent(&self, key: TypeKey) -> Option<TypeKey> {
        self.nodes.get(&key).and_then(|n| n.parent)
    }

    pub(crate) fn facets(&self, key: TypeKey) -> &[TypeKey] {
        self.nodes.get(&key).map(|n| n.facets.as_slice()).unwrap_or(&[])
    }
}

/// Builder for [`TypeGraph`]; edges are declared per concrete child type.
pub struct TypeGraphBuilder {
    graph: TypeGraph,
}

impl TypeGraphBuilder {
    /// Declares `P` as the parent of `C`.
    ///
    /// A type has at most one parent; declaring a second one replaces the
    /// first. Cycles are the host's responsibility to avoid - the resolver
    /// guards against revisits, so a cycle degrades to a truncated lineage
    /// rather than a hang.
    pub fn extends<C: ?Sized + 'static, P: ?Sized + 'static>(mut self) -> Self {
        let node = self.graph.nodes.entry(TypeKey::of::<C>()).or_default();
        node.parent = Some(TypeKey::of::<P>());
        self
    }

    /// Declares facet `F` (usually a `dyn Trait` key) on `C`.
    ///
    /// Facets are matched in declaration order. Facet-to-facet lineage is
    /// declared the same way, with the facet as the child.
    pub fn implements<C: ?Sized + 'static, F: ?Sized + 'static>(mut self) -> Self {
        let facet = TypeKey::of::<F>();
        let node = self.graph.nodes.entry(TypeKey::of::<C>()).or_default();
        if !node.facets.contains(&facet) {
            node.facets.push(facet);
        }
        self
    }

    /// Finalizes the graph.
    pub fn build(self) -> TypeGraph {
        self.graph
    }
}
