//! Node identifiers.

index_type!(
    /// Index of a node inside a [`super::DirectedGraph`].
    ///
    /// Basic blocks and SSA region nodes are both addressed by `NodeId`; the index is
    /// stable for the lifetime of the graph because nodes are never removed.
    NodeId,
    "n"
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(4);
        assert_eq!(node.index(), 4);
        assert_eq!(format!("{node}"), "n4");
        assert_eq!(format!("{node:?}"), "NodeId(4)");
    }

    #[test]
    fn test_node_id_ordering_follows_index() {
        let set: BTreeSet<NodeId> = [3, 1, 2].into_iter().map(NodeId::from).collect();
        let ordered: Vec<usize> = set.into_iter().map(usize::from).collect();
        assert_eq!(ordered, vec![1, 2, 3]);
    }
}
