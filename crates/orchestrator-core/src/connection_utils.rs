//! Pure, stateless queries over a connection list.

use std::collections::HashSet;

use crate::model::{BlockId, Connection};

pub fn incoming<'a>(node: &BlockId, conns: &'a [Connection]) -> Vec<&'a Connection> {
    conns.iter().filter(|c| &c.target == node).collect()
}

pub fn outgoing<'a>(node: &BlockId, conns: &'a [Connection]) -> Vec<&'a Connection> {
    conns.iter().filter(|c| &c.source == node).collect()
}

/// Incoming edges whose source is inside `scope`.
pub fn internal<'a>(
    node: &BlockId,
    scope: &HashSet<BlockId>,
    conns: &'a [Connection],
) -> Vec<&'a Connection> {
    incoming(node, conns)
        .into_iter()
        .filter(|c| scope.contains(&c.source))
        .collect()
}

/// True iff some incoming edge's source is outside `scope`.
pub fn has_external_incoming(node: &BlockId, scope: &HashSet<BlockId>, conns: &[Connection]) -> bool {
    incoming(node, conns)
        .into_iter()
        .any(|c| !scope.contains(&c.source))
}

/// True iff `node` has no internal incoming edges but has some external ones
/// — i.e. it's where execution enters `scope` from outside.
pub fn is_entry_point(node: &BlockId, scope: &HashSet<BlockId>, conns: &[Connection]) -> bool {
    internal(node, scope, conns).is_empty() && has_external_incoming(node, scope, conns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conns() -> Vec<Connection> {
        vec![
            Connection::new("start", "a"),
            Connection::new("a", "b"),
            Connection::new("b", "c"),
            Connection::new("outside", "b"),
        ]
    }

    #[test]
    fn incoming_and_outgoing_partition_by_node() {
        let c = conns();
        let b = BlockId::new("b");
        assert_eq!(incoming(&b, &c).len(), 2);
        assert_eq!(outgoing(&b, &c).len(), 1);
    }

    #[test]
    fn scope_distinguishes_internal_from_external() {
        let c = conns();
        let scope: HashSet<BlockId> = ["a", "b", "c"].iter().map(|s| BlockId::new(*s)).collect();
        let b = BlockId::new("b");
        assert_eq!(internal(&b, &scope, &c).len(), 1);
        assert!(has_external_incoming(&b, &scope, &c));

        let a = BlockId::new("a");
        assert!(is_entry_point(&a, &scope, &c));
        assert!(!is_entry_point(&b, &scope, &c));
    }

    #[test]
    fn incoming_plus_outgoing_partitions_connection_list_per_node() {
        let c = conns();
        for node in ["start", "a", "b", "c", "outside"] {
            let id = BlockId::new(node);
            let touching_as_source = outgoing(&id, &c).len();
            let touching_as_target = incoming(&id, &c).len();
            let expected = c
                .iter()
                .filter(|conn| conn.source == id || conn.target == id)
                .count();
            // a node touching itself on both ends would double count; none do here.
            assert_eq!(touching_as_source + touching_as_target, expected);
        }
    }
}
