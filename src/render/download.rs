use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::cache::image_io::ImageIo;
use crate::foundation::error::{FrameCacheError, FrameCacheResult};
use crate::render::event::SchedulerEvent;
use crate::render::texture::Texture;
use crate::render::worker::lower_current_thread_priority;

struct DownloadJob {
    texture: Arc<dyn Texture>,
    path: PathBuf,
}

/// A background thread reading textures back and writing them as cache files, in FIFO order.
pub(crate) struct DownloadWorker {
    index: usize,
    cancelled: Arc<AtomicBool>,
    tx: Option<Sender<DownloadJob>>,
    join: Option<JoinHandle<()>>,
}

impl DownloadWorker {
    fn spawn(
        index: usize,
        generation: u64,
        image_io: Arc<dyn ImageIo>,
        events: Sender<SchedulerEvent>,
    ) -> FrameCacheResult<Self> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::unbounded::<DownloadJob>();

        let cancelled_for_thread = Arc::clone(&cancelled);
        let join = std::thread::Builder::new()
            .name(format!("framecache-download-{index}"))
            .spawn(move || {
                download_worker_main(index, generation, cancelled_for_thread, image_io, rx, events)
            })
            .map_err(|e| FrameCacheError::render(format!("spawn download worker failed: {e}")))?;

        Ok(Self {
            index,
            cancelled,
            tx: Some(tx),
            join: Some(join),
        })
    }

    fn queue(&self, texture: Arc<dyn Texture>, path: PathBuf) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.send(DownloadJob { texture, path }).is_ok())
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.tx = None;
    }

    fn join(&mut self) {
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            tracing::error!(worker = self.index, "download worker panicked");
        }
    }
}

impl Drop for DownloadWorker {
    fn drop(&mut self) {
        self.cancel();
        self.join();
    }
}

fn download_worker_main(
    index: usize,
    generation: u64,
    cancelled: Arc<AtomicBool>,
    image_io: Arc<dyn ImageIo>,
    rx: Receiver<DownloadJob>,
    events: Sender<SchedulerEvent>,
) {
    lower_current_thread_priority("download", index);
    while let Ok(job) = rx.recv() {
        if cancelled.load(Ordering::Acquire) {
            break;
        }

        let pixels = job.texture.download();
        // A cancelled download must not write to the cache.
        if cancelled.load(Ordering::Acquire) {
            break;
        }

        let tex = &job.texture;
        let result = pixels.and_then(|pixels| {
            image_io.write(&job.path, &pixels, tex.width(), tex.height(), tex.format())
        });
        if let Err(e) = &result {
            tracing::warn!(worker = index, path = %job.path.display(), "cache write failed: {e}");
        }

        let event = SchedulerEvent::DownloadFinished {
            generation,
            path: job.path,
            result,
        };
        if events.send(event).is_err() {
            break;
        }
    }
}

/// Fixed-size set of [`DownloadWorker`]s fed round-robin.
pub(crate) struct DownloadWorkerPool {
    workers: Vec<DownloadWorker>,
    last_used: usize,
}

impl DownloadWorkerPool {
    pub(crate) fn start(
        size: usize,
        generation: u64,
        image_io: Arc<dyn ImageIo>,
        events: Sender<SchedulerEvent>,
    ) -> FrameCacheResult<Self> {
        let size = size.max(1);
        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            workers.push(DownloadWorker::spawn(
                index,
                generation,
                Arc::clone(&image_io),
                events.clone(),
            )?);
        }
        Ok(Self {
            workers,
            last_used: 0,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    /// Queue a texture on the next worker in turn; returns the worker index that took it.
    pub(crate) fn dispatch(&mut self, texture: Arc<dyn Texture>, path: PathBuf) -> Option<usize> {
        if self.workers.is_empty() {
            return None;
        }
        let index = self.last_used % self.workers.len();
        self.last_used = self.last_used.wrapping_add(1);
        self.workers[index].queue(texture, path).then_some(index)
    }

    pub(crate) fn shutdown(mut self) {
        for w in &mut self.workers {
            w.cancel();
        }
        for w in &mut self.workers {
            w.join();
        }
    }
}
