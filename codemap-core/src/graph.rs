//! Reference graph (spec §4.G): derived incoming/outgoing views over a
//! snapshot's references.
//!
//! The graph is directed, may contain cycles, and is scoped to one snapshot.

use crate::model::{Id, Reference, ReferenceTarget};

/// Indexes a snapshot's references for repeated `incoming`/`outgoing`
/// lookups. Built once per snapshot query, not persisted.
pub struct ReferenceGraph {
    references: Vec<Reference>,
}

impl ReferenceGraph {
    pub fn build(references: Vec<Reference>) -> Self {
        ReferenceGraph { references }
    }

    /// All references whose target is the symbol `symbol_id`.
    pub fn incoming(&self, symbol_id: &Id) -> Vec<&Reference> {
        self.references
            .iter()
            .filter(|r| matches!(&r.target, ReferenceTarget::Symbol(id) if id == symbol_id))
            .collect()
    }

    /// Batched form of [`Self::incoming`] for a whole BFS layer.
    pub fn incoming_batch(&self, symbol_ids: &[Id]) -> Vec<&Reference> {
        self.references
            .iter()
            .filter(|r| match &r.target {
                ReferenceTarget::Symbol(id) => symbol_ids.contains(id),
                ReferenceTarget::File(_) => false,
            })
            .collect()
    }

    /// All references originating from `symbol_id`.
    pub fn outgoing(&self, symbol_id: &Id) -> Vec<&Reference> {
        self.references
            .iter()
            .filter(|r| &r.from_symbol_id == symbol_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{new_id, ReferenceKind};

    fn reference(from: &Id, to: &Id) -> Reference {
        Reference {
            id: new_id(),
            snapshot_id: new_id(),
            from_symbol_id: from.clone(),
            target: ReferenceTarget::Symbol(to.clone()),
            kind: ReferenceKind::Call,
            line: 1,
            column: 0,
        }
    }

    #[test]
    fn incoming_finds_references_targeting_symbol() {
        let a = new_id();
        let b = new_id();
        let graph = ReferenceGraph::build(vec![reference(&a, &b)]);
        let incoming = graph.incoming(&b);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_symbol_id, a);
    }

    #[test]
    fn outgoing_finds_references_from_symbol() {
        let a = new_id();
        let b = new_id();
        let graph = ReferenceGraph::build(vec![reference(&a, &b)]);
        let outgoing = graph.outgoing(&a);
        assert_eq!(outgoing.len(), 1);
    }

    #[test]
    fn incoming_batch_aggregates_multiple_targets() {
        let a = new_id();
        let b = new_id();
        let c = new_id();
        let graph = ReferenceGraph::build(vec![reference(&a, &b), reference(&a, &c)]);
        let batch = graph.incoming_batch(&[b.clone(), c.clone()]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn file_targeted_references_are_not_incoming_to_symbols() {
        let a = new_id();
        let file_id = new_id();
        let reference_to_file = Reference {
            id: new_id(),
            snapshot_id: new_id(),
            from_symbol_id: a,
            target: ReferenceTarget::File(file_id.clone()),
            kind: ReferenceKind::Import,
            line: 1,
            column: 0,
        };
        let graph = ReferenceGraph::build(vec![reference_to_file]);
        assert!(graph.incoming(&file_id).is_empty());
    }
}
