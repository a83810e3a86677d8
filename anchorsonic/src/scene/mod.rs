//! Scene graph: the listener and source nodes an engine renders.
//!
//! Every engine owns a root object. Nodes are created against an engine, attached to
//! its root once, and stay attached until the engine tears its scene down. After
//! construction the only thing that changes is a node's transform.
//!
//! ```no_run
//! use anchorsonic::engine::AnchorSonicEngine;
//! use anchorsonic::config::EngineDesc;
//! use anchorsonic::math::{Mat4, Vec3};
//! use anchorsonic::scene::{Listener, Mesh, Shape, Source};
//!
//! let engine = AnchorSonicEngine::new(EngineDesc::default())?;
//! let listener = Listener::new(&engine);
//! engine.root().add_child(&listener)?;
//!
//! let shape = Shape::new(&engine, Mesh::icosahedron(0.0142, false));
//! let source = Source::new(&engine, vec![shape])?;
//! source.set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0)))?;
//! engine.root().add_child(&source)?;
//! # Ok::<(), anchorsonic::AnchorSonicError>(())
//! ```

mod node;
mod shape;

pub use node::{Listener, MIN_SOURCE_DISTANCE, Node, NodeId, NodeKind, SceneNode, Source};
pub(crate) use node::TransformReader;
pub use shape::{Mesh, Shape};

use crate::error::SceneError;
use std::sync::{Mutex, PoisonError};

/// Root object of an engine's scene graph.
#[derive(Debug)]
pub struct SceneRoot {
    engine_id: u64,
    children: Mutex<Vec<Node>>,
}

impl SceneRoot {
    pub(crate) fn new(engine_id: u64) -> Self {
        Self {
            engine_id,
            children: Mutex::new(Vec::new()),
        }
    }

    /// Attaches `node` to the root.
    ///
    /// # Errors
    ///
    /// - [`SceneError::ForeignNode`] if the node was created for another engine
    /// - [`SceneError::AlreadyAttached`] if it is attached already
    pub fn add_child(&self, node: &impl SceneNode) -> Result<(), SceneError> {
        let node = node.node();
        if node.engine_id() != self.engine_id {
            return Err(SceneError::ForeignNode(node.id().raw()));
        }
        if !node.mark_attached() {
            return Err(SceneError::AlreadyAttached(node.id().raw()));
        }
        self.lock_children().push(node.clone());
        log::debug!("Attached {:?} {} to engine root", node.kind(), node.id());
        Ok(())
    }

    pub fn children(&self) -> Vec<Node> {
        self.lock_children().clone()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.lock_children().iter().any(|node| node.id() == id)
    }

    /// Detaches every child. Returns how many were attached.
    pub(crate) fn detach_all(&self) -> usize {
        let children = std::mem::take(&mut *self.lock_children());
        for node in &children {
            node.mark_detached();
        }
        children.len()
    }

    fn lock_children(&self) -> std::sync::MutexGuard<'_, Vec<Node>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineDesc;
    use crate::engine::AnchorSonicEngine;

    #[test]
    fn add_child_once_per_node() {
        let engine = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let listener = Listener::new(&engine);
        engine.root().add_child(&listener).unwrap();
        assert!(listener.is_attached());
        assert!(engine.root().contains(listener.id()));
        assert_eq!(
            engine.root().add_child(&listener),
            Err(SceneError::AlreadyAttached(listener.id().raw()))
        );
        assert_eq!(engine.root().children().len(), 1);
    }

    #[test]
    fn nodes_stay_with_their_engine() {
        let a = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let b = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let listener = Listener::new(&a);
        assert_eq!(
            b.root().add_child(&listener),
            Err(SceneError::ForeignNode(listener.id().raw()))
        );

        let shape = Shape::new(&a, Mesh::icosahedron(0.1, false));
        assert!(matches!(
            Source::new(&b, vec![shape]),
            Err(SceneError::ForeignNode(_))
        ));
    }

    #[test]
    fn source_min_distance_follows_shapes() {
        let engine = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let bare = Source::new(&engine, Vec::new()).unwrap();
        assert_eq!(bare.min_distance(), MIN_SOURCE_DISTANCE);

        let shape = Shape::new(&engine, Mesh::icosahedron(0.0142, false));
        let source = Source::new(&engine, vec![shape]).unwrap();
        assert!((source.min_distance() - 0.0142).abs() < 1e-6);
        assert_eq!(source.shapes().len(), 1);
    }

    #[test]
    fn detach_all_clears_the_root() {
        let engine = AnchorSonicEngine::new(EngineDesc::default()).unwrap();
        let listener = Listener::new(&engine);
        engine.root().add_child(&listener).unwrap();
        assert_eq!(engine.root().detach_all(), 1);
        assert!(!listener.is_attached());
        assert!(engine.root().children().is_empty());
    }
}
