//! Static description of the decision loop's topology.
//!
//! The loop has a fixed shape, so the diagram is derived from
//! [`LoopState::successors`] instead of being registered at runtime.

use std::fmt::Write as _;

use crate::agent::LoopState;

/// Id of the virtual entry node.
pub const START: &str = "__start__";
/// Id of the virtual exit node.
pub const END: &str = "__end__";

/// A node of the loop diagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    /// Node id.
    pub id: &'static str,
}

/// A directed edge of the loop diagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    /// Source node id.
    pub from: &'static str,
    /// Target node id.
    pub to: &'static str,
    /// Whether the edge is taken depending on the model reply.
    pub conditional: bool,
}

/// Nodes and edges of the decision loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    /// Nodes, entry first and exit last.
    pub nodes: Vec<Node>,
    /// Edges, unconditional ones first.
    pub edges: Vec<Edge>,
}

/// Returns the topology of the decision loop.
pub fn topology() -> Topology {
    let mut nodes = vec![Node { id: START }];
    nodes.extend(
        [LoopState::Model, LoopState::Tool, LoopState::Done]
            .into_iter()
            .map(|state| Node {
                id: state.node_id(),
            }),
    );

    let mut edges = vec![Edge {
        from: START,
        to: LoopState::INITIAL.node_id(),
        conditional: false,
    }];
    for state in [LoopState::Model, LoopState::Tool] {
        let successors = state.successors();
        for next in successors {
            edges.push(Edge {
                from: state.node_id(),
                to: next.node_id(),
                conditional: successors.len() > 1,
            });
        }
    }
    edges.sort_by_key(|edge| edge.conditional);

    Topology { nodes, edges }
}

impl Topology {
    /// Renders the topology as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::new();
        out.push_str("%%{init: {'flowchart': {'curve': 'linear'}}}%%\n");
        out.push_str("graph TD;\n");
        for node in &self.nodes {
            // Writing into a `String` can't fail.
            let _ = match node.id {
                START => writeln!(out, "\t{0}([<p>{0}</p>]):::first", node.id),
                END => writeln!(out, "\t{0}([<p>{0}</p>]):::last", node.id),
                id => writeln!(out, "\t{id}({id})"),
            };
        }
        for edge in &self.edges {
            let arrow = if edge.conditional { "-.->" } else { "-->" };
            let _ = writeln!(out, "\t{} {arrow} {};", edge.from, edge.to);
        }
        out.push_str("\tclassDef default fill:#f2f0ff,line-height:1.2\n");
        out.push_str("\tclassDef first fill-opacity:0\n");
        out.push_str("\tclassDef last fill:#bfb6fc\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology() {
        let topology = topology();
        let ids: Vec<_> = topology.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![START, "agent", "tools", END]);

        let edges: Vec<_> = topology
            .edges
            .iter()
            .map(|e| (e.from, e.to, e.conditional))
            .collect();
        assert_eq!(
            edges,
            vec![
                (START, "agent", false),
                ("tools", "agent", false),
                ("agent", "tools", true),
                ("agent", END, true),
            ]
        );
    }

    #[test]
    fn test_mermaid() {
        let mermaid = topology().to_mermaid();
        assert!(mermaid.starts_with("%%{init:"));
        assert!(mermaid.contains("\tagent(agent)\n"));
        assert!(mermaid.contains("\t__start__ --> agent;\n"));
        assert!(mermaid.contains("\tagent -.-> __end__;\n"));
        assert!(mermaid.contains("\ttools --> agent;\n"));
    }
}
