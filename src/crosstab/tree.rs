//! Arena-backed result tree.
//!
//! Nodes are addressed by stable index rather than nested owned objects
//! with back-pointers, so significance comparand lookups resolve through a
//! flat walk without reference cycles, and annotated trees share structure
//! with their source via the persistent vector.

use im::Vector;
use serde::{Deserialize, Serialize};

use crate::core::AverageResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosstabNode {
    pub label: String,
    pub result: AverageResult,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Name of the baseline cell this node is significance-tested against.
    pub comparand: Option<String>,
    /// Padding inserted by depth extension; presentation only, never a
    /// computed value of its own.
    pub synthetic: bool,
}

impl CrosstabNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// An owned node used while building or reshaping a tree, before it is
/// flattened into the arena.
#[derive(Debug, Clone)]
pub(crate) struct BuiltNode {
    pub label: String,
    pub result: AverageResult,
    pub comparand: Option<String>,
    pub synthetic: bool,
    pub children: Vec<BuiltNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosstabTree {
    nodes: Vector<CrosstabNode>,
    root: NodeId,
}

impl CrosstabTree {
    pub(crate) fn from_built(root: BuiltNode) -> Self {
        let mut nodes = Vector::new();
        let root_id = flatten_into(&mut nodes, root, None);
        CrosstabTree {
            nodes,
            root: root_id,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &CrosstabNode {
        &self.nodes[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Header column span: a leaf spans one column, an internal node spans
    /// the sum of its children.
    pub fn span(&self, id: NodeId) -> usize {
        let node = self.node(id);
        if node.is_leaf() {
            1
        } else {
            node.children.iter().map(|&c| self.span(c)).sum()
        }
    }

    /// Header row depth: 1 for a leaf, 1 + deepest child otherwise.
    pub fn depth(&self, id: NodeId) -> usize {
        let node = self.node(id);
        1 + node
            .children
            .iter()
            .map(|&c| self.depth(c))
            .max()
            .unwrap_or(0)
    }

    /// Replaces each node's result, producing a new tree with identical
    /// shape. Used by the significance engine to annotate without mutation.
    pub fn map_results<F>(&self, mut f: F) -> CrosstabTree
    where
        F: FnMut(NodeId, &CrosstabNode) -> AverageResult,
    {
        let nodes = self
            .ids()
            .map(|id| {
                let node = self.node(id);
                CrosstabNode {
                    result: f(id, node),
                    ..node.clone()
                }
            })
            .collect();
        CrosstabTree {
            nodes,
            root: self.root,
        }
    }

    /// Resolves a significance comparand by name: first among the node's
    /// siblings, then among each ancestor and that ancestor's siblings,
    /// walking towards the root.
    pub fn resolve_named(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut current = from;
        while let Some(parent) = self.node(current).parent {
            for &sibling in &self.node(parent).children {
                if sibling != current && self.node(sibling).label == name {
                    return Some(sibling);
                }
            }
            if self.node(parent).label == name {
                return Some(parent);
            }
            current = parent;
        }
        None
    }

    /// Does any node in the subtree carry data?
    pub fn subtree_has_data(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.result.has_data() || node.children.iter().any(|&c| self.subtree_has_data(c))
    }

    /// Drops non-root subtrees that are entirely "no data". Presentation
    /// shaping; computed values of surviving nodes are untouched.
    pub fn hide_empty_columns(&self) -> CrosstabTree {
        let mut root = self.to_built(self.root);
        prune_empty(self, self.root, &mut root);
        CrosstabTree::from_built(root)
    }

    /// Pads every leaf with synthetic wrapper children until all leaves sit
    /// at the same depth, so rendered header rows align across sibling
    /// subtrees. Never alters computed values, only tree shape.
    pub fn extend_to_uniform_depth(&self) -> CrosstabTree {
        let target = self.depth(self.root);
        let mut root = self.to_built(self.root);
        extend_node(&mut root, target);
        CrosstabTree::from_built(root)
    }

    pub(crate) fn to_built(&self, id: NodeId) -> BuiltNode {
        let node = self.node(id);
        BuiltNode {
            label: node.label.clone(),
            result: node.result.clone(),
            comparand: node.comparand.clone(),
            synthetic: node.synthetic,
            children: node.children.iter().map(|&c| self.to_built(c)).collect(),
        }
    }
}

fn flatten_into(
    nodes: &mut Vector<CrosstabNode>,
    built: BuiltNode,
    parent: Option<NodeId>,
) -> NodeId {
    let id = NodeId(nodes.len());
    nodes.push_back(CrosstabNode {
        label: built.label,
        result: built.result,
        parent,
        children: vec![],
        comparand: built.comparand,
        synthetic: built.synthetic,
    });
    let children: Vec<NodeId> = built
        .children
        .into_iter()
        .map(|child| flatten_into(nodes, child, Some(id)))
        .collect();
    let mut node = nodes[id.0].clone();
    node.children = children;
    nodes.set(id.0, node);
    id
}

fn prune_empty(tree: &CrosstabTree, id: NodeId, built: &mut BuiltNode) {
    let keep: Vec<bool> = tree
        .node(id)
        .children
        .iter()
        .map(|&c| tree.subtree_has_data(c))
        .collect();
    let mut index = 0;
    built.children.retain(|_| {
        let kept = keep[index];
        index += 1;
        kept
    });
    let kept_ids: Vec<NodeId> = tree
        .node(id)
        .children
        .iter()
        .copied()
        .filter(|&c| tree.subtree_has_data(c))
        .collect();
    for (child_built, child_id) in built.children.iter_mut().zip(kept_ids) {
        prune_empty(tree, child_id, child_built);
    }
}

fn extend_node(node: &mut BuiltNode, target_depth: usize) {
    if node.children.is_empty() {
        if target_depth > 1 {
            let mut wrapper = BuiltNode {
                label: node.label.clone(),
                result: node.result.clone(),
                comparand: None,
                synthetic: true,
                children: vec![],
            };
            extend_node(&mut wrapper, target_depth - 1);
            node.children.push(wrapper);
        }
    } else {
        for child in &mut node.children {
            extend_node(child, target_depth - 1);
        }
    }
}
