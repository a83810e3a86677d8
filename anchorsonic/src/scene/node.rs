use crate::engine::AnchorSonicEngine;
use crate::error::SceneError;
use crate::math::Mat4;
use crate::scene::Shape;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a scene node, unique across every engine in the process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Listener,
    Source,
}

#[derive(Debug)]
struct NodeCore {
    id: NodeId,
    kind: NodeKind,
    engine_id: u64,
    transform: Mutex<Mat4>,
    attached: AtomicBool,
}

/// Shared handle to a node in an engine's scene graph.
///
/// Clones refer to the same node. The transform is the only state that changes after
/// construction; it is written whole under a mutex so the render thread never sees a
/// partially updated matrix.
#[derive(Debug, Clone)]
pub struct Node {
    core: Arc<NodeCore>,
}

impl Node {
    fn new(engine_id: u64, kind: NodeKind) -> Self {
        Self {
            core: Arc::new(NodeCore {
                id: NodeId::next(),
                kind,
                engine_id,
                transform: Mutex::new(Mat4::IDENTITY),
                attached: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.core.id
    }

    pub fn kind(&self) -> NodeKind {
        self.core.kind
    }

    /// World transform of the node.
    pub fn transform(&self) -> Mat4 {
        *self
            .core
            .transform
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the world transform.
    ///
    /// # Errors
    ///
    /// [`SceneError::InvalidTransform`] if any element is NaN or infinite; the previous
    /// transform is kept.
    pub fn set_transform(&self, transform: Mat4) -> Result<(), SceneError> {
        if !transform.is_finite() {
            return Err(SceneError::InvalidTransform(self.core.id.raw()));
        }
        *self
            .core
            .transform
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = transform;
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.core.attached.load(Ordering::Acquire)
    }

    pub(crate) fn engine_id(&self) -> u64 {
        self.core.engine_id
    }

    /// Marks the node attached; false if it already was.
    pub(crate) fn mark_attached(&self) -> bool {
        !self.core.attached.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn mark_detached(&self) {
        self.core.attached.store(false, Ordering::Release);
    }

    pub(crate) fn reader(&self) -> TransformReader {
        TransformReader {
            last: self.transform(),
            node: self.clone(),
        }
    }
}

/// Render-side view of a node transform.
///
/// Never blocks: if the writer holds the lock, the last value read is reused.
#[derive(Debug)]
pub(crate) struct TransformReader {
    node: Node,
    last: Mat4,
}

impl TransformReader {
    pub fn read(&mut self) -> Mat4 {
        if let Ok(transform) = self.node.core.transform.try_lock() {
            self.last = *transform;
        }
        self.last
    }
}

/// Anything that can be placed under the engine root.
pub trait SceneNode {
    fn node(&self) -> &Node;
}

impl SceneNode for Node {
    fn node(&self) -> &Node {
        self
    }
}

/// The point the scene is heard from.
#[derive(Debug, Clone)]
pub struct Listener {
    node: Node,
}

impl Listener {
    pub fn new(engine: &AnchorSonicEngine) -> Self {
        let node = Node::new(engine.id(), NodeKind::Listener);
        log::debug!("Created listener {}", node.id());
        Self { node }
    }
}

impl std::ops::Deref for Listener {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}

impl SceneNode for Listener {
    fn node(&self) -> &Node {
        &self.node
    }
}

/// An emitter with a fixed set of shapes.
#[derive(Debug, Clone)]
pub struct Source {
    node: Node,
    shapes: Arc<[Shape]>,
}

impl Source {
    /// Creates a source owning `shapes`.
    ///
    /// # Errors
    ///
    /// [`SceneError::ForeignNode`] if a shape was created for a different engine.
    pub fn new(engine: &AnchorSonicEngine, shapes: Vec<Shape>) -> Result<Self, SceneError> {
        let node = Node::new(engine.id(), NodeKind::Source);
        if shapes.iter().any(|shape| shape.engine_id() != engine.id()) {
            return Err(SceneError::ForeignNode(node.id().raw()));
        }
        log::debug!("Created source {} with {} shape(s)", node.id(), shapes.len());
        Ok(Self {
            node,
            shapes: shapes.into(),
        })
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    /// Closest distance at which the listener can hear the source's surface.
    pub fn min_distance(&self) -> f32 {
        self.shapes
            .iter()
            .map(Shape::bounding_radius)
            .fold(MIN_SOURCE_DISTANCE, f32::max)
    }
}

/// Lower bound for the render distance of a point-like source (1 mm).
pub const MIN_SOURCE_DISTANCE: f32 = 0.001;

impl std::ops::Deref for Source {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}

impl SceneNode for Source {
    fn node(&self) -> &Node {
        &self.node
    }
}
