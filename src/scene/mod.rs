//! The canonical in-memory scene graph every decoder produces.
//!
//! A `Scene` exclusively owns its node tree, meshes, materials and
//! animations; destroying it destroys everything it transitively references.
//! Meshes and materials are linked by index so that reordering stays cheap
//! and the graph cannot contain reference cycles.

pub mod anim;
pub mod material;
pub mod mesh;

pub use self::{
    anim::{Animation, NodeChannel, QuatKey, VectorKey},
    material::{Material, PropertyKey, PropertyValue, TextureKind, TextureStack},
    mesh::{
        Bone, Face, Mesh, TexCoordChannel, VertexWeight, MAX_COLOR_CHANNELS,
        MAX_TEXCOORD_CHANNELS,
    },
};

use crate::math::Mat4;

bitflags! {
    pub struct SceneFlags: u32 {
        /// The imported data is not a complete renderable scene, for example
        /// a material library or an animation skeleton without meshes.
        const INCOMPLETE = 0x1;

        /// Set by the validation step once the scene has passed it.
        const VALIDATED = 0x2;

        /// There is nothing but an animation skeleton in this scene.
        const ANIM_SKELETON_ONLY = 0x4;
    }
}

/// A node in the imported hierarchy.
///
/// Nodes own their children outright; there are no parent pointers, so the
/// tree shape is guaranteed by construction. Mesh membership is expressed as
/// indices into [`Scene::meshes`].
#[derive(Clone, Debug, Default)]
pub struct Node {
    pub children: Vec<Node>,

    /// Indices into the owning scene's mesh array.
    pub meshes: Vec<usize>,

    /// May be empty; helper nodes frequently are unnamed.
    pub name: String,

    /// Transformation relative to the parent node.
    pub transform: Mat4,
}

impl Node {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            children: vec![],
            meshes: vec![],
            name: name.into(),
            transform: Mat4::IDENTITY,
        }
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }

    /// Depth-first search for a node by case-sensitive name.
    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }

        self.children.iter().find_map(|child| child.find(name))
    }

    /// Calls `f` for every node of the subtree in depth-first order.
    pub fn visit(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

/// The root of everything an importer returns.
#[derive(Debug, Default)]
pub struct Scene {
    pub animations: Vec<Animation>,
    pub flags: SceneFlags,
    pub materials: Vec<Material>,
    pub meshes: Vec<Mesh>,
    pub root: Node,
}

impl Default for SceneFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of the face counts of all meshes.
    pub fn face_count(&self) -> usize {
        self.meshes.iter().map(|mesh| mesh.faces.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn node_count_and_find() {
        let mut root = Node::new("root");
        let mut arm = Node::new("arm");
        arm.children.push(Node::new("hand"));
        root.children.push(arm);
        root.children.push(Node::new("leg"));

        assert_eq!(root.count(), 4);
        assert!(root.find("hand").is_some());
        assert!(root.find("HAND").is_none());
    }

    #[test]
    pub fn visit_is_depth_first() {
        let mut root = Node::new("a");
        let mut b = Node::new("b");
        b.children.push(Node::new("c"));
        root.children.push(b);
        root.children.push(Node::new("d"));

        let mut order = vec![];
        root.visit(&mut |node| order.push(node.name.clone()));

        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }
}
