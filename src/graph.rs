//! Boundary to the node graph: what the cache asks of it and what it hands back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;

use crate::foundation::core::{Rational, TimeRange};
use crate::foundation::error::{FrameCacheError, FrameCacheResult};
use crate::render::event::SchedulerEvent;
use crate::render::params::RenderParams;
use crate::render::texture::{Texture, TextureBackend};

/// Well-known table key carrying interleaved audio bytes.
pub const SAMPLES_KEY: &str = "samples";
/// Well-known table key carrying a rendered texture.
pub const TEXTURE_KEY: &str = "texture";

/// Opaque id of a graph node output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// A node output requested over a time range (zero-length for a single frame).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeDependency {
    pub node: NodeId,
    pub range: TimeRange,
}

impl NodeDependency {
    pub fn new(node: NodeId, range: TimeRange) -> Self {
        Self { node, range }
    }

    pub fn at(node: NodeId, time: Rational) -> Self {
        Self {
            node,
            range: TimeRange::at(time),
        }
    }

    pub fn time(&self) -> Rational {
        self.range.start
    }
}

/// A single value produced by a node.
#[derive(Clone, Debug)]
pub enum NodeValue {
    Texture(Arc<dyn Texture>),
    Samples(Vec<u8>),
    Rational(Rational),
    Float(f64),
    Text(String),
}

/// Named outputs of a node evaluation.
#[derive(Clone, Debug, Default)]
pub struct NodeValueTable {
    values: BTreeMap<String, NodeValue>,
}

impl NodeValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: NodeValue) -> Option<NodeValue> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&NodeValue> {
        self.values.get(key)
    }

    pub fn take(&mut self, key: &str) -> Option<NodeValue> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Remove and return the texture stored under [`TEXTURE_KEY`].
    pub fn take_texture(&mut self) -> Option<Arc<dyn Texture>> {
        match self.take(TEXTURE_KEY)? {
            NodeValue::Texture(t) => Some(t),
            other => {
                self.insert(TEXTURE_KEY, other);
                None
            }
        }
    }

    /// Remove and return the bytes stored under [`SAMPLES_KEY`]; empty when absent.
    pub fn take_samples(&mut self) -> Vec<u8> {
        match self.take(SAMPLES_KEY) {
            Some(NodeValue::Samples(s)) => s,
            Some(other) => {
                self.insert(SAMPLES_KEY, other);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Union with `other`; keys already present here are kept.
    pub fn merge_missing(&mut self, other: NodeValueTable) {
        for (k, v) in other.values {
            self.values.entry(k).or_insert(v);
        }
    }
}

/// The node graph as seen by the cache: a synchronous, possibly recursive evaluator.
pub trait NodeGraph: Send + Sync {
    fn evaluate(
        &self,
        ctx: &RenderContext,
        dep: &NodeDependency,
    ) -> FrameCacheResult<NodeValueTable>;
}

/// Who is driving an evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerRole {
    /// Render worker `index` of the pool; index 0 is the master.
    Render { index: usize },
    /// The audio block renderer.
    Audio,
    /// A caller outside any pool (tests, tools).
    Detached,
}

#[derive(Clone)]
pub(crate) struct SiblingRoute {
    pub(crate) tx: Sender<SchedulerEvent>,
    pub(crate) generation: u64,
}

/// Explicit render-context handle passed into every graph evaluation.
#[derive(Clone)]
pub struct RenderContext {
    role: WorkerRole,
    params: Option<RenderParams>,
    textures: Option<Arc<dyn TextureBackend>>,
    cancelled: Arc<AtomicBool>,
    siblings: Option<SiblingRoute>,
}

impl RenderContext {
    pub fn detached() -> Self {
        Self::with_role(WorkerRole::Detached)
    }

    pub fn with_role(role: WorkerRole) -> Self {
        Self {
            role,
            params: None,
            textures: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            siblings: None,
        }
    }

    /// Attach a texture factory rendering at the effective dimensions of `params`.
    pub fn with_textures(
        mut self,
        textures: Arc<dyn TextureBackend>,
        params: RenderParams,
    ) -> Self {
        self.textures = Some(textures);
        self.params = Some(params);
        self
    }

    pub(crate) fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub(crate) fn with_siblings(mut self, route: SiblingRoute) -> Self {
        self.siblings = Some(route);
        self
    }

    pub fn role(&self) -> WorkerRole {
        self.role
    }

    pub fn params(&self) -> Option<&RenderParams> {
        self.params.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the owning worker was cancelled; long evaluations should poll this.
    pub fn check_cancelled(&self) -> FrameCacheResult<()> {
        if self.is_cancelled() {
            return Err(FrameCacheError::cancelled("render worker cancelled"));
        }
        Ok(())
    }

    /// Ask the pool to pre-render `dep` on an idle worker. Best effort; `false` when no route.
    pub fn request_sibling(&self, dep: NodeDependency) -> bool {
        let Some(route) = &self.siblings else {
            return false;
        };
        route
            .tx
            .send(SchedulerEvent::RequestSibling {
                generation: route.generation,
                dep,
            })
            .is_ok()
    }

    /// Allocate a texture at the effective render dimensions.
    pub fn create_texture(&self) -> FrameCacheResult<Arc<dyn Texture>> {
        let (Some(textures), Some(params)) = (&self.textures, &self.params) else {
            return Err(FrameCacheError::render(
                "render context has no texture backend",
            ));
        };
        textures.create(
            params.effective_width(),
            params.effective_height(),
            params.format,
        )
    }
}
