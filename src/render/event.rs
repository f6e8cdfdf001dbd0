use std::path::PathBuf;
use std::sync::Arc;

use crate::foundation::error::FrameCacheResult;
use crate::graph::NodeDependency;
use crate::render::texture::Texture;

/// Signals sent from worker threads to the scheduler.
///
/// Every event carries the pool generation it was produced under; the scheduler drops events of
/// pools it has already stopped.
#[derive(Debug)]
pub(crate) enum SchedulerEvent {
    /// A render worker finished a primary item.
    RenderFinished {
        generation: u64,
        worker: usize,
        dep: NodeDependency,
        result: FrameCacheResult<Option<Arc<dyn Texture>>>,
    },
    /// A graph evaluation asked for `dep` to be pre-rendered on an idle sibling.
    RequestSibling {
        generation: u64,
        dep: NodeDependency,
    },
    /// A download worker finished persisting a frame.
    DownloadFinished {
        generation: u64,
        path: PathBuf,
        result: FrameCacheResult<()>,
    },
}

impl SchedulerEvent {
    pub(crate) fn generation(&self) -> u64 {
        match self {
            SchedulerEvent::RenderFinished { generation, .. }
            | SchedulerEvent::RequestSibling { generation, .. }
            | SchedulerEvent::DownloadFinished { generation, .. } => *generation,
        }
    }
}
