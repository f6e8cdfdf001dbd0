use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::foundation::error::{FrameCacheError, FrameCacheResult};
use crate::graph::{NodeDependency, NodeGraph, RenderContext, SiblingRoute, WorkerRole};
use crate::render::event::SchedulerEvent;
use crate::render::params::RenderParams;
use crate::render::texture::TextureBackend;

struct WorkerShared {
    cancelled: Arc<AtomicBool>,
    /// Items queued or in progress.
    pending: AtomicUsize,
}

/// A background thread evaluating the graph one dependency at a time.
///
/// Primary items always get in and are served before queued prefetch items; prefetch items are
/// only accepted while the worker is idle.
pub(crate) struct RenderWorker {
    index: usize,
    shared: Arc<WorkerShared>,
    primary_tx: Option<Sender<NodeDependency>>,
    prefetch_tx: Option<Sender<NodeDependency>>,
    join: Option<JoinHandle<()>>,
}

impl RenderWorker {
    fn spawn(
        index: usize,
        generation: u64,
        graph: Arc<dyn NodeGraph>,
        ctx: RenderContext,
        events: Sender<SchedulerEvent>,
    ) -> FrameCacheResult<Self> {
        let shared = Arc::new(WorkerShared {
            cancelled: Arc::new(AtomicBool::new(false)),
            pending: AtomicUsize::new(0),
        });
        let ctx = ctx.with_cancel_flag(Arc::clone(&shared.cancelled));
        let (primary_tx, primary_rx) = crossbeam_channel::unbounded::<NodeDependency>();
        let (prefetch_tx, prefetch_rx) = crossbeam_channel::unbounded::<NodeDependency>();

        let shared_for_thread = Arc::clone(&shared);
        let join = std::thread::Builder::new()
            .name(format!("framecache-render-{index}"))
            .spawn(move || {
                render_worker_main(RenderWorkerArgs {
                    index,
                    generation,
                    shared: shared_for_thread,
                    graph,
                    ctx,
                    primary_rx,
                    prefetch_rx,
                    events,
                })
            })
            .map_err(|e| FrameCacheError::render(format!("spawn render worker failed: {e}")))?;

        Ok(Self {
            index,
            shared,
            primary_tx: Some(primary_tx),
            prefetch_tx: Some(prefetch_tx),
            join: Some(join),
        })
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire) == 0
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Queue `dep`; returns whether the worker took it.
    pub(crate) fn queue(&self, dep: NodeDependency, primary: bool) -> bool {
        if self.is_cancelled() {
            return false;
        }

        if primary {
            let Some(tx) = &self.primary_tx else {
                return false;
            };
            self.shared.pending.fetch_add(1, Ordering::AcqRel);
            if tx.send(dep).is_err() {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                return false;
            }
            return true;
        }

        let Some(tx) = &self.prefetch_tx else {
            return false;
        };
        if self
            .shared
            .pending
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if tx.send(dep).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Stop accepting work and make the thread exit after its current evaluation.
    pub(crate) fn cancel(&mut self) {
        self.shared.cancelled.store(true, Ordering::Release);
        self.primary_tx = None;
        self.prefetch_tx = None;
    }

    fn join(&mut self) {
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            tracing::error!(worker = self.index, "render worker panicked");
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.cancel();
        self.join();
    }
}

struct RenderWorkerArgs {
    index: usize,
    generation: u64,
    shared: Arc<WorkerShared>,
    graph: Arc<dyn NodeGraph>,
    ctx: RenderContext,
    primary_rx: Receiver<NodeDependency>,
    prefetch_rx: Receiver<NodeDependency>,
    events: Sender<SchedulerEvent>,
}

fn render_worker_main(args: RenderWorkerArgs) {
    let RenderWorkerArgs {
        index,
        generation,
        shared,
        graph,
        ctx,
        primary_rx,
        prefetch_rx,
        events,
    } = args;
    lower_current_thread_priority("render", index);
    tracing::debug!(worker = index, generation, "render worker started");

    while let Some((dep, primary)) = next_item(&primary_rx, &prefetch_rx) {
        if shared.cancelled.load(Ordering::Acquire) {
            break;
        }

        let result = graph
            .evaluate(&ctx, &dep)
            .map(|mut table| table.take_texture());
        shared.pending.fetch_sub(1, Ordering::AcqRel);

        // Cancelled mid-render: the result is dropped, never committed.
        if shared.cancelled.load(Ordering::Acquire) {
            break;
        }

        if primary {
            let event = SchedulerEvent::RenderFinished {
                generation,
                worker: index,
                dep,
                result,
            };
            if events.send(event).is_err() {
                break;
            }
        } else if let Err(e) = result {
            tracing::debug!(worker = index, time = %dep.time(), "sibling prefetch failed: {e}");
        }
    }

    tracing::debug!(worker = index, generation, "render worker stopped");
}

/// Drop the calling thread to the lowest scheduling priority so interactive work preempts it.
///
/// Returns whether the priority was applied; failure is logged and the worker keeps running.
pub(crate) fn lower_current_thread_priority(pool: &str, index: usize) -> bool {
    match thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Min) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(pool, worker = index, "could not lower worker priority: {e:?}");
            false
        }
    }
}

fn next_item(
    primary_rx: &Receiver<NodeDependency>,
    prefetch_rx: &Receiver<NodeDependency>,
) -> Option<(NodeDependency, bool)> {
    if let Ok(dep) = primary_rx.try_recv() {
        return Some((dep, true));
    }
    crossbeam_channel::select! {
        recv(primary_rx) -> msg => msg.ok().map(|dep| (dep, true)),
        recv(prefetch_rx) -> msg => msg.ok().map(|dep| (dep, false)),
    }
}

/// Fixed-size set of [`RenderWorker`]s; worker 0 is the master that takes primary items.
pub(crate) struct RenderWorkerPool {
    workers: Vec<RenderWorker>,
}

impl RenderWorkerPool {
    pub(crate) fn start(
        size: usize,
        generation: u64,
        graph: Arc<dyn NodeGraph>,
        textures: Arc<dyn TextureBackend>,
        params: RenderParams,
        events: Sender<SchedulerEvent>,
    ) -> FrameCacheResult<Self> {
        let size = size.max(1);
        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let ctx = RenderContext::with_role(WorkerRole::Render { index })
                .with_textures(Arc::clone(&textures), params)
                .with_siblings(SiblingRoute {
                    tx: events.clone(),
                    generation,
                });
            workers.push(RenderWorker::spawn(
                index,
                generation,
                Arc::clone(&graph),
                ctx,
                events.clone(),
            )?);
        }
        Ok(Self { workers })
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn master(&self) -> Option<&RenderWorker> {
        self.workers.first()
    }

    /// Hand `dep` to the master worker as the primary render.
    pub(crate) fn queue_primary(&self, dep: NodeDependency) -> bool {
        self.master().is_some_and(|w| w.queue(dep, true))
    }

    /// Offer `dep` to each worker in turn; the first idle one takes it.
    pub(crate) fn request_sibling(&self, dep: NodeDependency) -> Option<usize> {
        self.workers
            .iter()
            .filter(|w| w.is_idle())
            .find(|w| w.queue(dep, false))
            .map(RenderWorker::index)
    }

    /// Cancel every worker, then wait for all threads to exit.
    pub(crate) fn shutdown(mut self) {
        for w in &mut self.workers {
            w.cancel();
        }
        for w in &mut self.workers {
            w.join();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/worker.rs"]
mod tests;
