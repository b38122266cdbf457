//! Node hierarchy of one model.
//!
//! Nodes live in a flat arena and refer to each other by [`NodeId`]. The
//! tree is validated once when built, so traversal never has to guard
//! against cycles or dangling children.

use glam::Mat4;
use lantern_resources::NodeData;
use thiserror::Error;

/// Index of a node in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Structural problems in a node hierarchy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("Node {parent} lists child {child}, which does not exist")]
    ChildOutOfRange { parent: usize, child: usize },

    #[error("Root node {0} does not exist")]
    RootOutOfRange(usize),

    #[error("Node {0} has more than one parent")]
    MultipleParents(usize),

    #[error("Root node {0} is also a child")]
    RootHasParent(usize),

    #[error("Root node {0} is listed more than once")]
    DuplicateRoot(usize),

    #[error("Node {0} is part of a cycle")]
    Cycle(usize),

    #[error("Node {0} does not exist")]
    UnknownNode(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub local_transform: Mat4,
    pub mesh: Option<usize>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl NodeTree {
    /// Builds and validates the hierarchy described by `nodes`.
    pub fn from_data(nodes: &[NodeData], roots: &[usize]) -> Result<Self, SceneError> {
        let mut tree: Vec<Node> = nodes
            .iter()
            .map(|data| Node {
                name: data.name.clone(),
                local_transform: data.local_transform,
                mesh: data.mesh,
                children: data.children.iter().copied().map(NodeId).collect(),
                parent: None,
            })
            .collect();

        for (parent, data) in nodes.iter().enumerate() {
            for &child in &data.children {
                let node = tree
                    .get_mut(child)
                    .ok_or(SceneError::ChildOutOfRange { parent, child })?;
                if node.parent.is_some() {
                    return Err(SceneError::MultipleParents(child));
                }
                node.parent = Some(NodeId(parent));
            }
        }

        for (i, &root) in roots.iter().enumerate() {
            let node = tree.get(root).ok_or(SceneError::RootOutOfRange(root))?;
            if node.parent.is_some() {
                return Err(SceneError::RootHasParent(root));
            }
            if roots[..i].contains(&root) {
                return Err(SceneError::DuplicateRoot(root));
            }
        }

        // With at most one parent per node, a cycle shows up as a parent
        // chain longer than the node count.
        for start in 0..tree.len() {
            let mut current = tree[start].parent;
            let mut steps = 0;
            while let Some(NodeId(index)) = current {
                steps += 1;
                if steps > tree.len() {
                    return Err(SceneError::Cycle(start));
                }
                current = tree[index].parent;
            }
        }

        Ok(Self {
            nodes: tree,
            roots: roots.iter().copied().map(NodeId).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn set_local_transform(&mut self, id: NodeId, transform: Mat4) -> Result<(), SceneError> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(SceneError::UnknownNode(id.0))?;
        node.local_transform = transform;
        Ok(())
    }

    /// Product of local transforms from the root down to `id`.
    pub fn world_transform(&self, id: NodeId) -> Option<Mat4> {
        let mut node = self.get(id)?;
        let mut world = node.local_transform;
        while let Some(parent) = node.parent {
            node = self.get(parent)?;
            world = node.local_transform * world;
        }
        Some(world)
    }

    /// Depth-first pre-order walk from every root, in root order.
    ///
    /// `visit` receives each reachable node with its world transform.
    pub fn visit<F>(&self, mut visit: F)
    where
        F: FnMut(NodeId, &Node, Mat4),
    {
        for &root in &self.roots {
            self.visit_node(root, Mat4::IDENTITY, &mut visit);
        }
    }

    fn visit_node<F>(&self, id: NodeId, parent_world: Mat4, visit: &mut F)
    where
        F: FnMut(NodeId, &Node, Mat4),
    {
        let Some(node) = self.get(id) else {
            return;
        };
        let world = parent_world * node.local_transform;
        visit(id, node, world);
        for &child in &node.children {
            self.visit_node(child, world, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn node(name: &str, translation: Vec3, children: &[usize]) -> NodeData {
        NodeData::new(name, Mat4::from_translation(translation))
            .with_children(children.iter().copied())
    }

    #[test]
    fn test_world_transforms_accumulate() {
        let nodes = [
            node("root", Vec3::X, &[1]),
            node("child", Vec3::Y, &[2]),
            node("grandchild", Vec3::Z, &[]),
        ];
        let tree = NodeTree::from_data(&nodes, &[0]).unwrap();

        let world = tree.world_transform(NodeId(2)).unwrap();
        assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::ONE);
        assert_eq!(tree.get(NodeId(2)).unwrap().parent(), Some(NodeId(1)));
    }

    #[test]
    fn test_visit_order_and_world_matrices() {
        let nodes = [
            node("a", Vec3::X, &[2, 3]),
            node("b", Vec3::NEG_X, &[]),
            node("a.0", Vec3::Y, &[]),
            node("a.1", Vec3::Z, &[]),
        ];
        let tree = NodeTree::from_data(&nodes, &[0, 1]).unwrap();

        let mut visited = Vec::new();
        tree.visit(|id, _, world| visited.push((id.0, world.transform_point3(Vec3::ZERO))));

        assert_eq!(
            visited,
            vec![
                (0, Vec3::X),
                (2, Vec3::new(1.0, 1.0, 0.0)),
                (3, Vec3::new(1.0, 0.0, 1.0)),
                (1, Vec3::NEG_X),
            ]
        );
    }

    #[test]
    fn test_unreachable_nodes_are_skipped() {
        let nodes = [node("root", Vec3::ZERO, &[]), node("orphan", Vec3::ZERO, &[])];
        let tree = NodeTree::from_data(&nodes, &[0]).unwrap();
        let mut count = 0;
        tree.visit(|_, _, _| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_child_out_of_range() {
        let nodes = [node("root", Vec3::ZERO, &[5])];
        assert_eq!(
            NodeTree::from_data(&nodes, &[0]),
            Err(SceneError::ChildOutOfRange {
                parent: 0,
                child: 5
            })
        );
    }

    #[test]
    fn test_repeated_root_rejected() {
        let nodes = [node("root", Vec3::ZERO, &[])];
        assert_eq!(
            NodeTree::from_data(&nodes, &[0, 0]),
            Err(SceneError::DuplicateRoot(0))
        );
    }

    #[test]
    fn test_multiple_parents() {
        let nodes = [
            node("a", Vec3::ZERO, &[2]),
            node("b", Vec3::ZERO, &[2]),
            node("c", Vec3::ZERO, &[]),
        ];
        assert_eq!(
            NodeTree::from_data(&nodes, &[0, 1]),
            Err(SceneError::MultipleParents(2))
        );
    }

    #[test]
    fn test_cycle_detected() {
        let nodes = [
            node("root", Vec3::ZERO, &[]),
            node("x", Vec3::ZERO, &[2]),
            node("y", Vec3::ZERO, &[1]),
        ];
        assert!(matches!(
            NodeTree::from_data(&nodes, &[0]),
            Err(SceneError::Cycle(_))
        ));
    }

    #[test]
    fn test_self_parent_is_cycle() {
        let nodes = [node("loop", Vec3::ZERO, &[0])];
        assert!(matches!(
            NodeTree::from_data(&nodes, &[]),
            Err(SceneError::Cycle(0))
        ));
    }

    #[test]
    fn test_root_must_not_have_parent() {
        let nodes = [node("a", Vec3::ZERO, &[1]), node("b", Vec3::ZERO, &[])];
        assert_eq!(
            NodeTree::from_data(&nodes, &[0, 1]),
            Err(SceneError::RootHasParent(1))
        );
        assert_eq!(
            NodeTree::from_data(&nodes, &[7]),
            Err(SceneError::RootOutOfRange(7))
        );
    }

    #[test]
    fn test_set_local_transform() {
        let nodes = [node("root", Vec3::ZERO, &[])];
        let mut tree = NodeTree::from_data(&nodes, &[0]).unwrap();
        tree.set_local_transform(NodeId(0), Mat4::from_translation(Vec3::Y))
            .unwrap();
        assert_eq!(
            tree.world_transform(NodeId(0)).unwrap().transform_point3(Vec3::ZERO),
            Vec3::Y
        );
        assert_eq!(
            tree.set_local_transform(NodeId(3), Mat4::IDENTITY),
            Err(SceneError::UnknownNode(3))
        );
    }
}
