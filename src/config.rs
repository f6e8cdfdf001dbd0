use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::core::Rational;
use crate::foundation::error::{FrameCacheError, FrameCacheResult};
use crate::render::params::RenderParams;

/// Pool sizing and storage location of a [`CacheScheduler`](crate::CacheScheduler).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SchedulerOpts {
    /// Base directory holding one subdirectory per cache identity.
    pub cache_root: PathBuf,
    /// Render worker count; hardware concurrency when unset.
    pub render_threads: Option<usize>,
    /// Download worker count; hardware concurrency when unset.
    pub download_threads: Option<usize>,
}

impl Default for SchedulerOpts {
    fn default() -> Self {
        Self {
            cache_root: std::env::temp_dir().join("framecache"),
            render_threads: None,
            download_threads: None,
        }
    }
}

impl SchedulerOpts {
    pub fn validate(&self) -> FrameCacheResult<()> {
        if self.render_threads == Some(0) || self.download_threads == Some(0) {
            return Err(FrameCacheError::validation(
                "worker thread counts must be >= 1 when set",
            ));
        }
        Ok(())
    }

    pub fn render_thread_count(&self) -> usize {
        self.render_threads.unwrap_or_else(hardware_concurrency)
    }

    pub fn download_thread_count(&self) -> usize {
        self.download_threads.unwrap_or_else(hardware_concurrency)
    }
}

/// Ideal number of concurrently running threads on this machine.
pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Everything needed to bring up a cache pipeline, as stored in a JSON settings file.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameCacheConfig {
    pub cache_name: String,
    pub timebase: Rational,
    pub render: RenderParams,
    #[serde(default)]
    pub scheduler: SchedulerOpts,
}

impl FrameCacheConfig {
    pub fn from_json_path(path: &Path) -> FrameCacheResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| FrameCacheError::validation(format!("parse config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> FrameCacheResult<()> {
        if !self.timebase.is_positive() {
            return Err(FrameCacheError::validation("timebase must be > 0"));
        }
        self.render.validate()?;
        self.scheduler.validate()
    }
}
