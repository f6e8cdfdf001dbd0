//! Framecache renders frames of a node graph on background threads and keeps them on disk.
//!
//! The moving parts:
//!
//! - A [`CacheScheduler`] owning the invalidation queue, a render worker pool and a download
//!   worker pool
//! - [`CacheIdentity`] and [`CachePaths`] deciding where a frame lives on disk
//! - An [`AudioBlockRenderer`] mixing the blocks of a track into one sample buffer
//!
//! The node graph, textures and the image codec are reached through the [`NodeGraph`],
//! [`TextureBackend`] and [`ImageIo`] traits.
#![forbid(unsafe_code)]

pub mod audio;
pub mod cache;
pub mod config;
mod foundation;
pub mod graph;
pub mod render;

pub use crate::foundation::core::{Rational, TimeRange};
pub use crate::foundation::error::{FrameCacheError, FrameCacheResult};

pub use crate::audio::params::{AudioRenderingParams, ChannelLayout, SampleFormat};
pub use crate::audio::render::{AudioBlockRenderer, AudioTrack, Block, BlockList};
pub use crate::cache::identity::CacheIdentity;
pub use crate::cache::image_io::{ExrImageIo, ImageInput, ImageIo};
pub use crate::cache::path::{CachePaths, FRAME_EXTENSION};
pub use crate::config::{FrameCacheConfig, SchedulerOpts};
pub use crate::graph::{
    NodeDependency, NodeGraph, NodeId, NodeValue, NodeValueTable, RenderContext, SAMPLES_KEY,
    TEXTURE_KEY, WorkerRole,
};
pub use crate::render::params::{PixelFormat, RenderMode, RenderParams};
pub use crate::render::scheduler::{CacheScheduler, CacheStats, SchedulerState};
pub use crate::render::texture::{CpuTexture, CpuTextureBackend, Texture, TextureBackend};
