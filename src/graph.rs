// ============================================================================
// Compositing node graph
// ============================================================================
//
// A deliberately small stand-in for a node-based image-processing library:
// nodes carry an operation, inputs are connected per pad, and each node
// accepts at most one producer per pad. The projection walks these
// connections to decide how a layer and its mask reach the output.

use std::collections::HashMap;

use crate::canvas::LayerMode;
use crate::item::DrawableRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Input pads of a node. `Aux` carries what is shown, `Aux2` the mask that
/// modulates it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pad {
    Input,
    Aux,
    Aux2,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeOp {
    /// Reads a drawable's buffer.
    Source(DrawableRef),
    Translate { x: i32, y: i32 },
    Mode { mode: LayerMode, opacity: f64 },
}

#[derive(Clone, Debug)]
struct Node {
    op: NodeOp,
}

#[derive(Clone, Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    edges: HashMap<(NodeId, Pad), NodeId>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_node(&mut self, op: NodeOp) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { op });
        id
    }

    pub fn op(&self, node: NodeId) -> Option<&NodeOp> {
        self.nodes.get(node.0 as usize).map(|n| &n.op)
    }

    pub fn set_op(&mut self, node: NodeId, op: NodeOp) {
        if let Some(n) = self.nodes.get_mut(node.0 as usize) {
            n.op = op;
        }
    }

    /// Feed `from`'s output into `to`'s `pad`, replacing any previous producer.
    pub fn connect(&mut self, from: NodeId, to: NodeId, pad: Pad) {
        debug_assert!(from != to, "node connected to itself");
        log::trace!("graph: connect {:?} -> {:?}.{:?}", from, to, pad);
        self.edges.insert((to, pad), from);
    }

    pub fn disconnect(&mut self, to: NodeId, pad: Pad) {
        if self.edges.remove(&(to, pad)).is_some() {
            log::trace!("graph: disconnect {:?}.{:?}", to, pad);
        }
    }

    /// Producer currently feeding `to`'s `pad`.
    pub fn producer(&self, to: NodeId, pad: Pad) -> Option<NodeId> {
        self.edges.get(&(to, pad)).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

// ============================================================================
// PER-LAYER NODE STATE
// ============================================================================

/// Nodes owned by one layer once its graph has been requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerNodeSet {
    pub source: NodeId,
    pub layer_offset: NodeId,
    pub mode: NodeId,
    /// Created when the layer first gets a mask while built.
    pub mask_source: Option<NodeId>,
    pub mask_offset: Option<NodeId>,
}

/// Lazily built compositing nodes of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LayerNodes {
    #[default]
    NotBuilt,
    Built(LayerNodeSet),
}

impl LayerNodes {
    pub fn built(&self) -> Option<&LayerNodeSet> {
        match self {
            LayerNodes::Built(set) => Some(set),
            LayerNodes::NotBuilt => None,
        }
    }
}

/// What the mode node of a layer currently receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerRouting {
    /// The grayscale mask is shown in place of the layer.
    pub mask_on_aux: bool,
    /// The mask multiplies the layer's alpha.
    pub mask_on_aux2: bool,
}

impl LayerNodeSet {
    pub fn routing(&self, graph: &NodeGraph) -> LayerRouting {
        let mask_offset = self.mask_offset;
        let is_mask = |n: Option<NodeId>| n.is_some() && n == mask_offset;
        LayerRouting {
            mask_on_aux: is_mask(graph.producer(self.mode, Pad::Aux)),
            mask_on_aux2: is_mask(graph.producer(self.mode, Pad::Aux2)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemId;

    #[test]
    fn connect_replaces_previous_producer() {
        let mut g = NodeGraph::new();
        let a = g.create_node(NodeOp::Source(DrawableRef::Layer(ItemId(1))));
        let b = g.create_node(NodeOp::Translate { x: 0, y: 0 });
        let c = g.create_node(NodeOp::Mode { mode: LayerMode::Normal, opacity: 1.0 });
        g.connect(a, c, Pad::Aux);
        g.connect(b, c, Pad::Aux);
        assert_eq!(g.producer(c, Pad::Aux), Some(b));
        assert_eq!(g.edge_count(), 1);
        g.disconnect(c, Pad::Aux);
        assert_eq!(g.producer(c, Pad::Aux), None);
    }
}
