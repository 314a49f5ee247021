//! Edge identifiers.

index_type!(
    /// Index of an edge inside a [`super::DirectedGraph`].
    ///
    /// Edge payloads (for control flow graphs, the Normal/Back classification) are
    /// looked up and updated through this identifier.
    EdgeId,
    "e"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_id_formatting() {
        let edge = EdgeId::new(11);
        assert_eq!(edge.index(), 11);
        assert_eq!(edge.to_string(), "e11");
        assert_eq!(format!("{edge:?}"), "EdgeId(11)");
    }
}
