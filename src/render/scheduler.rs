use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::cache::identity::CacheIdentity;
use crate::cache::image_io::ImageIo;
use crate::cache::path::CachePaths;
use crate::config::SchedulerOpts;
use crate::foundation::core::Rational;
use crate::foundation::error::{FrameCacheError, FrameCacheResult};
use crate::graph::{NodeDependency, NodeGraph, NodeId};
use crate::render::download::DownloadWorkerPool;
use crate::render::event::SchedulerEvent;
use crate::render::params::RenderParams;
use crate::render::texture::{Texture, TextureBackend};
use crate::render::worker::RenderWorkerPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// No worker pools exist.
    Stopped,
    /// Pools are up; nothing has been rendered yet.
    Started,
    /// Pools are up and no primary render is in flight.
    Idle,
    /// The master worker is rendering the current cache frame.
    Caching,
}

/// Counters accumulated over the scheduler's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub frames_rendered: u64,
    pub frames_written: u64,
    pub frames_removed: u64,
    pub render_failures: u64,
    pub write_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Worker pools; only exist between `start()` and `stop()`.
struct Running {
    render: RenderWorkerPool,
    download: DownloadWorkerPool,
}

/// Where the read path lands cached frames. Sized for the current parameters.
struct ReadTarget {
    master_texture: Arc<dyn Texture>,
    readback: Vec<u8>,
}

/// Single-threaded coordinator of the frame cache.
///
/// Owns the invalidation queue and both worker pools. Workers report back over a channel and
/// the owner of the scheduler pumps it with [`CacheScheduler::process_events`] or
/// [`CacheScheduler::run_until_idle`]; all state transitions happen on that caller's thread.
pub struct CacheScheduler {
    opts: SchedulerOpts,
    paths: CachePaths,
    graph: Arc<dyn NodeGraph>,
    textures: Arc<dyn TextureBackend>,
    image_io: Arc<dyn ImageIo>,

    input: Option<NodeId>,
    params: RenderParams,
    timebase: Option<Rational>,
    sequence_length: Option<Rational>,
    cache_name: String,
    cache_time: i64,
    identity: Option<CacheIdentity>,

    state: SchedulerState,
    queue: VecDeque<Rational>,
    queued: HashSet<Rational>,
    cache_frame: Option<Rational>,
    pending_downloads: usize,
    generation: u64,
    running: Option<Running>,
    read_target: Option<ReadTarget>,
    stats: CacheStats,

    events_tx: Sender<SchedulerEvent>,
    events_rx: Receiver<SchedulerEvent>,
}

impl CacheScheduler {
    pub fn new(
        opts: SchedulerOpts,
        graph: Arc<dyn NodeGraph>,
        textures: Arc<dyn TextureBackend>,
        image_io: Arc<dyn ImageIo>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            paths: CachePaths::new(opts.cache_root.clone()),
            opts,
            graph,
            textures,
            image_io,
            input: None,
            params: RenderParams::default(),
            timebase: None,
            sequence_length: None,
            cache_name: String::new(),
            cache_time: 0,
            identity: None,
            state: SchedulerState::Stopped,
            queue: VecDeque::new(),
            queued: HashSet::new(),
            cache_frame: None,
            pending_downloads: 0,
            generation: 0,
            running: None,
            read_target: None,
            stats: CacheStats::default(),
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_caching(&self) -> bool {
        self.cache_frame.is_some()
    }

    /// Timestamp the master worker is currently rendering.
    pub fn cache_frame(&self) -> Option<Rational> {
        self.cache_frame
    }

    /// Pending timestamps in render order.
    pub fn queued_frames(&self) -> Vec<Rational> {
        self.queue.iter().copied().collect()
    }

    pub fn pending_downloads(&self) -> usize {
        self.pending_downloads
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    pub fn effective_dimensions(&self) -> (u32, u32) {
        (self.params.effective_width(), self.params.effective_height())
    }

    pub fn cache_identity(&self) -> Option<&CacheIdentity> {
        self.identity.as_ref()
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    pub fn timebase(&self) -> Option<Rational> {
        self.timebase
    }

    /// Number of render workers while started.
    pub fn render_worker_count(&self) -> usize {
        self.running.as_ref().map_or(0, |r| r.render.len())
    }

    /// Number of download workers while started.
    pub fn download_worker_count(&self) -> usize {
        self.running.as_ref().map_or(0, |r| r.download.len())
    }

    /// Connect (or disconnect with `None`) the node output being cached.
    pub fn set_input(&mut self, input: Option<NodeId>) {
        self.input = input;
        self.cache_next();
    }

    pub fn set_timebase(&mut self, timebase: Rational) -> FrameCacheResult<()> {
        if !timebase.is_positive() {
            return Err(FrameCacheError::validation("timebase must be > 0"));
        }
        self.timebase = Some(timebase);
        Ok(())
    }

    /// Upper bound for invalidation ranges; `None` leaves them unclamped.
    pub fn set_sequence_length(&mut self, length: Option<Rational>) {
        self.sequence_length = length;
    }

    /// Reset the cache name, stamping it with the current wall-clock time.
    pub fn set_cache_name(&mut self, name: &str) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        self.set_cache_name_at(name, now_ms);
    }

    /// Reset the cache name with an explicit generation time in milliseconds.
    pub fn set_cache_name_at(&mut self, name: &str, generation_time_ms: i64) {
        self.cache_name = name.to_string();
        self.cache_time = generation_time_ms;
        self.regenerate_identity();
    }

    /// Replace the render parameters, stopping the pipeline.
    ///
    /// A zero divider keeps the current one.
    #[tracing::instrument(skip(self))]
    pub fn set_parameters(&mut self, params: RenderParams) {
        self.stop();

        let divider = if params.divider > 0 {
            params.divider
        } else {
            self.params.divider
        };
        self.params = RenderParams { divider, ..params };
        self.regenerate_identity();
        self.cache_next();
    }

    #[tracing::instrument(skip(self))]
    pub fn set_divider(&mut self, divider: u32) -> FrameCacheResult<()> {
        if divider == 0 {
            return Err(FrameCacheError::validation("divider must be >= 1"));
        }
        self.stop();
        self.params.divider = divider;
        self.regenerate_identity();
        self.cache_next();
        Ok(())
    }

    fn regenerate_identity(&mut self) {
        self.identity = CacheIdentity::for_params(&self.cache_name, self.cache_time, &self.params);
        match &self.identity {
            Some(id) => tracing::debug!(identity = %id, "cache identity regenerated"),
            None => tracing::debug!("caching disabled: no cache name or empty frame size"),
        }
    }

    /// Bring up both worker pools, the master texture and the readback buffer.
    ///
    /// No-op when already started.
    #[tracing::instrument(skip(self))]
    pub fn start(&mut self) -> FrameCacheResult<()> {
        if self.running.is_some() {
            return Ok(());
        }
        self.opts.validate()?;
        self.ensure_read_target()?;

        self.generation += 1;
        let render = RenderWorkerPool::start(
            self.opts.render_thread_count(),
            self.generation,
            Arc::clone(&self.graph),
            Arc::clone(&self.textures),
            self.params,
            self.events_tx.clone(),
        )?;
        let download = DownloadWorkerPool::start(
            self.opts.download_thread_count(),
            self.generation,
            Arc::clone(&self.image_io),
            self.events_tx.clone(),
        )?;

        tracing::info!(
            generation = self.generation,
            render_workers = render.len(),
            download_workers = download.len(),
            width = self.params.effective_width(),
            height = self.params.effective_height(),
            "cache pipeline started"
        );
        self.running = Some(Running { render, download });
        self.state = SchedulerState::Started;
        Ok(())
    }

    /// Create the master texture and readback buffer if they do not exist yet.
    fn ensure_read_target(&mut self) -> FrameCacheResult<&mut ReadTarget> {
        let target = match self.read_target.take() {
            Some(target) => target,
            None => {
                self.params.validate()?;
                ReadTarget {
                    master_texture: self.textures.create(
                        self.params.effective_width(),
                        self.params.effective_height(),
                        self.params.format,
                    )?,
                    readback: vec![0u8; self.params.frame_buffer_size()],
                }
            }
        };
        Ok(self.read_target.insert(target))
    }

    /// Cancel every worker and release the master texture and readback buffer.
    ///
    /// The invalidation queue survives; the frame in flight is dropped.
    #[tracing::instrument(skip(self))]
    pub fn stop(&mut self) {
        self.read_target = None;
        let Some(running) = self.running.take() else {
            return;
        };
        running.render.shutdown();
        running.download.shutdown();

        if let Some(frame) = self.cache_frame.take() {
            tracing::debug!(time = %frame, "in-flight render dropped");
        }
        self.pending_downloads = 0;
        self.state = SchedulerState::Stopped;
        tracing::info!(generation = self.generation, "cache pipeline stopped");
    }

    /// Stop the pipeline and let go of every worker resource.
    pub fn release(&mut self) {
        self.stop();
    }

    /// Queue every timebase grid point in `[start, end]`, then advance.
    #[tracing::instrument(skip(self, start, end), fields(start = %start, end = %end))]
    pub fn invalidate_cache(&mut self, start: Rational, end: Rational) -> FrameCacheResult<()> {
        let Some(timebase) = self.timebase else {
            tracing::warn!("invalidation ignored: no timebase set");
            return Ok(());
        };

        let end = match self.sequence_length {
            Some(length) => end.min(length),
            None if end == Rational::MAX => {
                tracing::warn!("unbounded invalidation ignored: no sequence length set");
                return Ok(());
            }
            None => end,
        };

        let mut t = start.snap_floor(timebase)?;
        let mut added = 0usize;
        while t <= end {
            if self.queued.insert(t) {
                self.queue.push_back(t);
                added += 1;
            }
            let next = t + timebase;
            if next <= t {
                break;
            }
            t = next;
        }
        tracing::debug!(added, queued = self.queue.len(), "cache invalidated");

        self.cache_next();
        Ok(())
    }

    /// Hand the next queued timestamp to the master worker unless a render is in flight.
    fn cache_next(&mut self) {
        if self.cache_frame.is_some() || self.queue.is_empty() {
            return;
        }
        let Some(input) = self.input else {
            return;
        };
        if self.identity.is_none() {
            tracing::debug!("caching disabled; queue left pending");
            return;
        }
        if let Err(e) = self.start() {
            tracing::error!("cache pipeline failed to start: {e}");
            return;
        }
        let Some(running) = &self.running else {
            return;
        };
        let Some(frame) = self.queue.pop_front() else {
            return;
        };
        self.queued.remove(&frame);

        if running.render.queue_primary(NodeDependency::at(input, frame)) {
            tracing::trace!(time = %frame, "caching frame");
            self.cache_frame = Some(frame);
            self.state = SchedulerState::Caching;
        } else {
            tracing::warn!(time = %frame, "master worker rejected cache frame");
        }
    }

    /// Handle every event already waiting; returns how many were handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Pump events until no render is in flight, the queue is drained and every download has
    /// landed.
    ///
    /// Returns `false` if `timeout` elapsed first, or if the queue is stuck because caching is
    /// disabled, the input is disconnected or the pipeline failed to start.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_events();
            if !self.is_busy() {
                return self.queue.is_empty();
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.events_rx.recv_timeout(remaining) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return !self.is_busy(),
            }
        }
    }

    fn is_busy(&self) -> bool {
        self.cache_frame.is_some() || self.pending_downloads > 0
    }

    fn handle_event(&mut self, event: SchedulerEvent) {
        if self.running.is_none() || event.generation() != self.generation {
            tracing::trace!(generation = event.generation(), "stale worker event dropped");
            return;
        }

        match event {
            SchedulerEvent::RenderFinished {
                worker,
                dep,
                result,
                ..
            } => self.on_render_finished(worker, dep, result),
            SchedulerEvent::RequestSibling { dep, .. } => {
                let Some(running) = &self.running else {
                    return;
                };
                match running.render.request_sibling(dep) {
                    Some(worker) => tracing::trace!(worker, time = %dep.time(), "sibling prefetch"),
                    None => tracing::trace!(time = %dep.time(), "no idle sibling for prefetch"),
                }
            }
            SchedulerEvent::DownloadFinished { path, result, .. } => {
                self.pending_downloads = self.pending_downloads.saturating_sub(1);
                match result {
                    Ok(()) => {
                        self.stats.frames_written += 1;
                        tracing::trace!(path = %path.display(), "frame cached");
                    }
                    Err(_) => self.stats.write_failures += 1,
                }
            }
        }
    }

    fn on_render_finished(
        &mut self,
        worker: usize,
        dep: NodeDependency,
        result: FrameCacheResult<Option<Arc<dyn Texture>>>,
    ) {
        if worker != 0 || self.cache_frame != Some(dep.time()) {
            tracing::trace!(worker, time = %dep.time(), "unexpected render completion ignored");
            return;
        }
        let frame = dep.time();
        self.cache_frame = None;
        self.state = SchedulerState::Idle;

        let path = match &self.identity {
            Some(id) => self.paths.frame_path(id, frame),
            None => Err(FrameCacheError::validation("no cache identity")),
        };
        match path {
            Ok(path) => match result {
                Ok(Some(texture)) => {
                    self.stats.frames_rendered += 1;
                    let dispatched = self
                        .running
                        .as_mut()
                        .and_then(|r| r.download.dispatch(texture, path));
                    match dispatched {
                        Some(_) => self.pending_downloads += 1,
                        None => tracing::warn!(time = %frame, "no download worker took frame"),
                    }
                }
                Ok(None) => self.remove_stale_frame(&path),
                Err(e) => {
                    self.stats.render_failures += 1;
                    tracing::warn!(time = %frame, "render failed: {e}");
                    self.remove_stale_frame(&path);
                }
            },
            Err(e) => tracing::warn!(time = %frame, "cannot resolve cache path: {e}"),
        }

        self.cache_next();
    }

    fn remove_stale_frame(&mut self, path: &Path) {
        if !path.exists() {
            return;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                self.stats.frames_removed += 1;
                tracing::debug!(path = %path.display(), "stale cache frame removed");
            }
            Err(e) => tracing::warn!(path = %path.display(), "failed to remove stale frame: {e}"),
        }
    }

    /// Serve the cached frame of `output` at `time` through the master texture.
    ///
    /// Misses return `None` and never queue a render. Only the master texture and readback
    /// buffer are created here; no worker is started.
    #[tracing::instrument(skip(self, time), fields(time = %time))]
    pub fn value(&mut self, output: NodeId, time: Rational) -> Option<Arc<dyn Texture>> {
        if self.input != Some(output) {
            tracing::warn!(output = output.0, "requested output is not connected");
            return None;
        }
        let Some(identity) = &self.identity else {
            tracing::warn!("no cache identity; caching is disabled");
            return None;
        };
        if self.timebase.is_none() {
            tracing::warn!("no timebase set");
            return None;
        }

        let path = match self.paths.frame_path(identity, time) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("cannot resolve cache path: {e}");
                return None;
            }
        };
        if !path.is_file() {
            self.stats.cache_misses += 1;
            return None;
        }

        let format = self.params.format;
        let image_io = Arc::clone(&self.image_io);
        let target = match self.ensure_read_target() {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!("cannot create master texture: {e}");
                return None;
            }
        };
        let loaded = image_io.open(&path).and_then(|mut input| {
            let read = input.read_image(format, &mut target.readback);
            input.close();
            read
        });
        let uploaded = loaded.and_then(|()| target.master_texture.upload(&target.readback));
        let texture = Arc::clone(&target.master_texture);

        match uploaded {
            Ok(()) => {
                self.stats.cache_hits += 1;
                Some(texture)
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), "cached frame unreadable: {e}");
                self.stats.cache_misses += 1;
                None
            }
        }
    }
}

impl Drop for CacheScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/scheduler.rs"]
mod tests;
