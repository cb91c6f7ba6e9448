//! Graph views built by walking plug/socket edges from a start stage.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::registry::RegistrationPath;

use super::stage::{PlugRef, SocketRef, Stage};

/// Which edges a walk follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// From plugs to the sockets they pull from.
    Upstream,
    /// From sockets to the plugs attached to them.
    Downstream,
    #[default]
    All,
}

/// One plug/socket connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub plug: PlugRef,
    pub socket: SocketRef,
}

/// Stages reachable from a start stage, in discovery order, plus the edges
/// between them.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Arc<Stage>>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn nodes(&self) -> &[Arc<Stage>] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, stage_id: u32) -> bool {
        self.nodes.iter().any(|n| n.id() == stage_id)
    }

    /// Number of stages whose registration matches `pattern`.
    pub fn count_nodes(&self, pattern: &str) -> usize {
        let pattern = RegistrationPath::parse(pattern);
        self.nodes
            .iter()
            .filter(|n| pattern.matches(n.registration()))
            .count()
    }

    pub fn get_node(&self, index: usize) -> Option<&Arc<Stage>> {
        self.nodes.get(index)
    }

    /// The `index`-th stage among those matching `pattern`.
    pub fn get_node_matching(&self, index: usize, pattern: &str) -> Option<&Arc<Stage>> {
        let pattern = RegistrationPath::parse(pattern);
        self.nodes
            .iter()
            .filter(|n| pattern.matches(n.registration()))
            .nth(index)
    }
}

/// Walk the graph breadth-first from `start`, visiting each stage once.
pub fn build_graph(start: &Arc<Stage>, direction: Direction) -> Graph {
    let upstream = matches!(direction, Direction::Upstream | Direction::All);
    let downstream = matches!(direction, Direction::Downstream | Direction::All);

    let mut graph = Graph::default();
    let mut visited = HashSet::from([start.id()]);
    let mut queue = VecDeque::from([Arc::clone(start)]);

    while let Some(stage) = queue.pop_front() {
        if upstream {
            for plug in stage.plugs() {
                let Some(socket) = plug.remote() else {
                    continue;
                };
                let next = Arc::clone(socket.stage());
                graph.edges.push(Edge { plug, socket });
                if visited.insert(next.id()) {
                    queue.push_back(next);
                }
            }
        }
        if downstream {
            for socket in stage.sockets() {
                for plug in socket.plugs() {
                    let next = Arc::clone(plug.stage());
                    // Edges are recorded from the plug side when walking both ways.
                    if !upstream {
                        graph.edges.push(Edge {
                            plug,
                            socket: socket.clone(),
                        });
                    }
                    if visited.insert(next.id()) {
                        queue.push_back(next);
                    }
                }
            }
        }
        graph.nodes.push(stage);
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::connect;
    use crate::testing::{pass_stage, root_stage, sink_stage};

    /// root -> pass -> sink
    fn chain() -> (Arc<Stage>, Arc<Stage>, Arc<Stage>) {
        let root = root_stage();
        let pass = pass_stage();
        let sink = sink_stage();
        connect(&pass.plug(0).expect("plug"), &root.socket(0).expect("socket")).expect("root");
        connect(&sink.plug(0).expect("plug"), &pass.socket(0).expect("socket")).expect("pass");
        (root, pass, sink)
    }

    #[test]
    fn test_walk_all_from_either_end() {
        let (root, _pass, sink) = chain();
        let from_root = build_graph(&root, Direction::All);
        let from_sink = build_graph(&sink, Direction::All);
        assert_eq!(from_root.len(), 3);
        assert_eq!(from_sink.len(), 3);
        assert_eq!(from_root.edges().len(), 2);
        assert_eq!(from_sink.edges().len(), 2);
        assert_eq!(from_root.count_nodes("*"), 3);
    }

    #[test]
    fn test_directional_walks() {
        let (root, pass, sink) = chain();
        let up = build_graph(&pass, Direction::Upstream);
        assert_eq!(up.len(), 2);
        assert!(up.contains(root.id()));
        assert!(!up.contains(sink.id()));

        let down = build_graph(&pass, Direction::Downstream);
        assert_eq!(down.len(), 2);
        assert!(down.contains(sink.id()));
        assert_eq!(down.edges().len(), 1);
    }

    #[test]
    fn test_pattern_queries() {
        let (root, _pass, sink) = chain();
        let graph = build_graph(&sink, Direction::All);
        assert_eq!(graph.count_nodes("//colour/root"), 1);
        assert_eq!(graph.count_nodes("//colour/sink"), 1);
        assert_eq!(graph.count_nodes("//colour/missing"), 0);
        assert_eq!(
            graph.get_node_matching(0, "//colour/root").map(|n| n.id()),
            Some(root.id())
        );
        assert!(graph.get_node_matching(1, "//colour/root").is_none());
        assert_eq!(graph.get_node(0).map(|n| n.id()), Some(sink.id()));
        assert!(graph.get_node(3).is_none());
    }

    #[test]
    fn test_diamond_visits_each_stage_once() {
        let root = root_stage();
        let left = pass_stage();
        let right = pass_stage();
        let sink = sink_stage();
        let socket = root.socket(0).expect("socket");
        connect(&left.plug(0).expect("plug"), &socket).expect("left");
        connect(&right.plug(0).expect("plug"), &socket).expect("right");
        connect(&sink.plug(0).expect("plug"), &left.socket(0).expect("socket")).expect("sink");
        // Right branch merges back through the sink's second data plug.
        connect(&sink.plug(2).expect("plug"), &right.socket(0).expect("socket")).expect("merge");

        let graph = build_graph(&root, Direction::All);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.edges().len(), 4);
    }
}
