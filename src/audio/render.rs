use std::sync::Arc;

use crate::audio::params::AudioRenderingParams;
use crate::foundation::core::{Rational, TimeRange};
use crate::foundation::error::{FrameCacheError, FrameCacheResult};
use crate::graph::{
    NodeDependency, NodeGraph, NodeId, NodeValue, NodeValueTable, RenderContext, SAMPLES_KEY,
    WorkerRole,
};

/// A clip on a track.
///
/// `range` is where the block sits on the timeline; `media` is the span of its source it plays.
/// Their length ratio is the playback speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub node: NodeId,
    pub range: TimeRange,
    pub media: TimeRange,
    pub reversed: bool,
}

impl Block {
    /// A block playing its media at normal speed.
    pub fn new(node: NodeId, range: TimeRange) -> Self {
        Self {
            node,
            range,
            media: range,
            reversed: false,
        }
    }

    pub fn with_media(mut self, media: TimeRange) -> Self {
        self.media = media;
        self
    }

    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    pub fn length(&self) -> Rational {
        self.range.length()
    }

    pub fn media_length(&self) -> Rational {
        self.media.length()
    }

    /// Media length over timeline length; 1.0 for zero-length blocks.
    pub fn speed(&self) -> f64 {
        let length = self.length();
        if length.is_zero() {
            return 1.0;
        }
        self.media_length().to_f64() / length.to_f64()
    }
}

/// Source of the blocks to mix.
pub trait AudioTrack {
    /// Blocks sharing a non-empty span with `range`, in track order.
    fn blocks_at_time_range(&self, range: TimeRange) -> Vec<Block>;
}

/// A track backed by a plain list of blocks.
#[derive(Clone, Debug, Default)]
pub struct BlockList {
    blocks: Vec<Block>,
}

impl BlockList {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

impl AudioTrack for BlockList {
    fn blocks_at_time_range(&self, range: TimeRange) -> Vec<Block> {
        self.blocks
            .iter()
            .filter(|b| b.range.overlaps(range))
            .copied()
            .collect()
    }
}

/// Mixes the blocks of a track into one interleaved sample buffer.
pub struct AudioBlockRenderer {
    params: AudioRenderingParams,
    graph: Arc<dyn NodeGraph>,
    ctx: RenderContext,
}

impl AudioBlockRenderer {
    pub fn new(params: AudioRenderingParams, graph: Arc<dyn NodeGraph>) -> Self {
        Self {
            params,
            graph,
            ctx: RenderContext::with_role(WorkerRole::Audio),
        }
    }

    pub fn params(&self) -> &AudioRenderingParams {
        &self.params
    }

    pub fn set_params(&mut self, params: AudioRenderingParams) {
        self.params = params;
    }

    /// Render `range` of `track`, returning the composited samples only.
    pub fn render(&self, track: &dyn AudioTrack, range: TimeRange) -> FrameCacheResult<Vec<u8>> {
        Ok(self.render_block(track, range)?.take_samples())
    }

    /// Render `range` of `track`.
    ///
    /// The returned table holds the union of every block's outputs (first block wins per key)
    /// and, under [`SAMPLES_KEY`], exactly `time_to_bytes(range.length())` bytes of audio.
    /// Spans without a block, or whose block produced fewer samples than it covers, are silent.
    #[tracing::instrument(skip_all, fields(start = %range.start, end = %range.end))]
    pub fn render_block(
        &self,
        track: &dyn AudioTrack,
        range: TimeRange,
    ) -> FrameCacheResult<NodeValueTable> {
        let mut output = vec![0u8; self.params.time_to_bytes(range.length())];
        let mut merged = NodeValueTable::new();

        for block in track.blocks_at_time_range(range) {
            let Some(span) = block.range.intersect(range) else {
                continue;
            };

            let dep = NodeDependency::new(block.node, span);
            let mut table = match self.graph.evaluate(&self.ctx, &dep) {
                Ok(table) => table,
                Err(e @ FrameCacheError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(node = block.node.0, "audio block render failed: {e}");
                    NodeValueTable::new()
                }
            };
            let mut samples = table.take_samples();

            let frame = self.params.bytes_per_sample_frame();
            samples.truncate(samples.len() - samples.len() % frame);

            let offset = self.params.time_to_bytes(span.start - range.start);
            let max_copy = self.params.time_to_bytes(span.length());

            if !samples.is_empty() {
                if block.media_length() != block.length() {
                    let limit = self.params.bytes_to_samples(max_copy);
                    samples = self.resample(&samples, block.speed(), limit, block.reversed);
                } else if block.reversed {
                    reverse_sample_frames(&mut samples, frame);
                }
            }

            composite(&mut output, offset, max_copy, &samples);

            merged.merge_missing(table);
        }

        merged.insert(SAMPLES_KEY, NodeValue::Samples(output));
        Ok(merged)
    }

    /// Nearest-neighbor time stretch: stretched frame `k` copies source frame `floor(k * speed)`.
    ///
    /// At most `limit` frames are produced. When `reversed`, they are the tail of the stretched
    /// buffer played backwards, as if the whole buffer had been reversed and then clipped.
    fn resample(&self, samples: &[u8], speed: f64, limit: usize, reversed: bool) -> Vec<u8> {
        let frame = self.params.bytes_per_sample_frame();
        if !speed.is_finite() || speed <= 0.0 {
            tracing::warn!(speed, "invalid block speed, samples left unadjusted");
            let mut out = samples.to_vec();
            if reversed {
                reverse_sample_frames(&mut out, frame);
            }
            return out;
        }

        let count = self.params.bytes_to_samples(samples.len());
        if count == 0 {
            return Vec::new();
        }
        let stretched = stretched_len(count, speed);
        let take = stretched.min(limit);
        let mut out = Vec::with_capacity(take * frame);

        for n in 0..take {
            let k = if reversed { stretched - 1 - n } else { n };
            let source = ((k as f64 * speed).floor() as usize).min(count - 1);
            let start = self.params.samples_to_bytes(source);
            out.extend_from_slice(&samples[start..start + frame]);
        }
        out
    }
}

/// Number of `k >= 0` with `k * speed < count`.
fn stretched_len(count: usize, speed: f64) -> usize {
    let mut n = (count as f64 / speed).ceil() as usize;
    if n < 1 << 53 {
        while n > 0 && (n - 1) as f64 * speed >= count as f64 {
            n -= 1;
        }
    }
    n
}

/// Reverse the order of whole `frame`-byte samples in place.
fn reverse_sample_frames(samples: &mut [u8], frame: usize) {
    if frame == 0 {
        return;
    }
    let count = samples.len() / frame;
    for i in 0..count / 2 {
        let j = count - 1 - i;
        let (head, tail) = samples.split_at_mut(j * frame);
        head[i * frame..(i + 1) * frame].swap_with_slice(&mut tail[..frame]);
    }
}

/// Copy `samples` into `output` at `offset`, at most `max_copy` bytes, and silence the rest of
/// that span.
fn composite(output: &mut [u8], offset: usize, max_copy: usize, samples: &[u8]) {
    let end = offset.saturating_add(max_copy).min(output.len());
    let Some(dest) = output.get_mut(offset..end) else {
        return;
    };
    let copied = samples.len().min(dest.len());
    dest[..copied].copy_from_slice(&samples[..copied]);
    dest[copied..].fill(0);
}

#[cfg(test)]
#[path = "../../tests/unit/audio/render.rs"]
mod tests;
