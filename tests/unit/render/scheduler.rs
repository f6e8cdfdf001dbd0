use std::path::PathBuf;

use super::*;
use crate::cache::image_io::ExrImageIo;
use crate::graph::{NodeValue, NodeValueTable, RenderContext, TEXTURE_KEY};
use crate::render::params::PixelFormat;
use crate::render::texture::CpuTextureBackend;

const INPUT: NodeId = NodeId(9);

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "framecache_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn r(num: i64, den: i64) -> Rational {
    Rational::new(num, den).unwrap()
}

/// Fills every frame with a constant byte.
struct SolidGraph;

impl NodeGraph for SolidGraph {
    fn evaluate(
        &self,
        ctx: &RenderContext,
        _dep: &NodeDependency,
    ) -> FrameCacheResult<NodeValueTable> {
        let tex = ctx.create_texture()?;
        tex.upload(&vec![200u8; tex.byte_len()])?;
        let mut table = NodeValueTable::new();
        table.insert(TEXTURE_KEY, NodeValue::Texture(tex));
        Ok(table)
    }
}

fn scheduler(name: &str) -> CacheScheduler {
    let opts = SchedulerOpts {
        cache_root: temp_dir(name),
        render_threads: Some(2),
        download_threads: Some(2),
    };
    let mut s = CacheScheduler::new(
        opts,
        Arc::new(SolidGraph),
        Arc::new(CpuTextureBackend),
        Arc::new(ExrImageIo),
    );
    s.set_parameters(RenderParams {
        width: 8,
        height: 4,
        format: PixelFormat::Rgba8,
        ..RenderParams::default()
    });
    s.set_cache_name_at("sequence", 1_700_000_000_000);
    s
}

#[test]
fn invalidation_snaps_to_the_timebase_grid() {
    let mut s = scheduler("snap");
    s.set_timebase(r(1, 24)).unwrap();

    s.invalidate_cache(r(3, 100), r(9, 100)).unwrap();
    assert_eq!(s.queued_frames(), vec![r(0, 1), r(1, 24), r(1, 12)]);
    assert_eq!(s.state(), SchedulerState::Stopped);
}

#[test]
fn overlapping_invalidations_never_duplicate() {
    let mut s = scheduler("dedupe");
    s.set_timebase(Rational::from_int(1)).unwrap();

    s.invalidate_cache(Rational::from_int(0), Rational::from_int(10))
        .unwrap();
    s.invalidate_cache(Rational::from_int(5), Rational::from_int(15))
        .unwrap();

    let expected = (0..=15).map(Rational::from_int).collect::<Vec<_>>();
    assert_eq!(s.queued_frames(), expected);
}

#[test]
fn invalidation_needs_a_timebase_and_a_bound() {
    let mut s = scheduler("bounds");
    s.invalidate_cache(Rational::zero(), Rational::from_int(2))
        .unwrap();
    assert!(s.queued_frames().is_empty());

    s.set_timebase(Rational::from_int(1)).unwrap();
    s.invalidate_cache(Rational::zero(), Rational::MAX).unwrap();
    assert!(s.queued_frames().is_empty());

    s.set_sequence_length(Some(Rational::from_int(3)));
    s.invalidate_cache(Rational::zero(), Rational::MAX).unwrap();
    assert_eq!(s.queued_frames().len(), 4);
}

#[test]
fn zero_timebase_is_rejected() {
    let mut s = scheduler("timebase");
    assert!(s.set_timebase(Rational::zero()).is_err());
    assert_eq!(s.timebase(), None);
}

#[test]
fn divider_change_stops_and_regenerates_identity() {
    let mut s = scheduler("divider");
    s.start().unwrap();
    assert_eq!(s.state(), SchedulerState::Started);
    assert_eq!(s.render_worker_count(), 2);
    assert_eq!(s.download_worker_count(), 2);
    let before = s.cache_identity().cloned().unwrap();

    s.set_divider(2).unwrap();
    assert_eq!(s.state(), SchedulerState::Stopped);
    assert_eq!(s.render_worker_count(), 0);
    assert_eq!(s.effective_dimensions(), (4, 2));
    let after = s.cache_identity().cloned().unwrap();
    assert_ne!(before, after);

    assert!(s.set_divider(0).is_err());
    assert_eq!(s.params().divider, 2);
}

#[test]
fn zero_divider_in_parameters_keeps_current_divider() {
    let mut s = scheduler("keep_divider");
    s.set_divider(2).unwrap();
    s.set_parameters(RenderParams {
        width: 16,
        height: 16,
        format: PixelFormat::Rgba8,
        divider: 0,
        ..RenderParams::default()
    });
    assert_eq!(s.params().divider, 2);
    assert_eq!(s.effective_dimensions(), (8, 8));
}

#[test]
fn empty_cache_name_disables_caching() {
    let mut s = scheduler("disabled");
    s.set_cache_name_at("", 0);
    assert!(s.cache_identity().is_none());

    s.set_timebase(Rational::from_int(1)).unwrap();
    s.set_input(Some(INPUT));
    s.invalidate_cache(Rational::zero(), Rational::from_int(1))
        .unwrap();
    assert!(!s.is_caching());
    assert_eq!(s.state(), SchedulerState::Stopped);
    assert!(s.value(INPUT, Rational::zero()).is_none());
}

#[test]
fn read_path_reports_each_missing_precondition() {
    let mut s = scheduler("read_path");
    assert!(s.value(INPUT, Rational::zero()).is_none());

    s.set_input(Some(INPUT));
    assert!(s.value(INPUT, Rational::zero()).is_none());
    assert!(s.value(NodeId(1), Rational::zero()).is_none());

    s.set_timebase(Rational::from_int(1)).unwrap();
    assert!(s.value(INPUT, Rational::zero()).is_none());
    assert_eq!(s.stats().cache_misses, 1);
    assert_eq!(s.state(), SchedulerState::Stopped);
}

#[test]
fn read_path_serves_cached_frame_without_queueing() {
    let mut s = scheduler("read_hit");
    s.set_timebase(Rational::from_int(1)).unwrap();
    s.set_input(Some(INPUT));

    let id = s.cache_identity().cloned().unwrap();
    let path = s.paths().frame_path(&id, Rational::from_int(3)).unwrap();
    let pixels = (0..8 * 4 * 4).map(|i| i as u8).collect::<Vec<_>>();
    ExrImageIo
        .write(&path, &pixels, 8, 4, PixelFormat::Rgba8)
        .unwrap();

    let tex = s.value(INPUT, Rational::from_int(3)).unwrap();
    assert_eq!(tex.download().unwrap(), pixels);
    assert_eq!(s.stats().cache_hits, 1);
    // Reading never spins up the worker pools.
    assert_eq!(s.render_worker_count(), 0);
    assert_eq!(s.download_worker_count(), 0);
    assert_eq!(s.state(), SchedulerState::Stopped);

    assert!(s.value(INPUT, Rational::from_int(4)).is_none());
    assert!(s.queued_frames().is_empty());
    assert!(!s.is_caching());
}

#[test]
fn stale_generation_events_are_dropped() {
    let mut s = scheduler("stale");
    s.start().unwrap();
    s.cache_frame = Some(Rational::zero());

    s.events_tx
        .send(SchedulerEvent::RenderFinished {
            generation: s.generation - 1,
            worker: 0,
            dep: NodeDependency::at(INPUT, Rational::zero()),
            result: Ok(None),
        })
        .unwrap();
    assert_eq!(s.process_events(), 1);
    assert!(s.is_caching());

    s.events_tx
        .send(SchedulerEvent::RenderFinished {
            generation: s.generation,
            worker: 1,
            dep: NodeDependency::at(INPUT, Rational::zero()),
            result: Ok(None),
        })
        .unwrap();
    s.process_events();
    assert!(s.is_caching());

    s.events_tx
        .send(SchedulerEvent::RenderFinished {
            generation: s.generation,
            worker: 0,
            dep: NodeDependency::at(INPUT, Rational::zero()),
            result: Ok(None),
        })
        .unwrap();
    s.process_events();
    assert!(!s.is_caching());
    assert_eq!(s.state(), SchedulerState::Idle);
}

#[test]
fn invalidated_range_is_rendered_and_written() {
    let mut s = scheduler("render_flow");
    s.set_timebase(Rational::from_int(1)).unwrap();
    s.set_input(Some(INPUT));

    s.invalidate_cache(Rational::zero(), Rational::from_int(2))
        .unwrap();
    assert!(s.is_caching());
    assert_eq!(s.state(), SchedulerState::Caching);
    assert!(s.run_until_idle(Duration::from_secs(30)));

    let stats = s.stats();
    assert_eq!(stats.frames_rendered, 3);
    assert_eq!(stats.frames_written, 3);
    assert_eq!(s.state(), SchedulerState::Idle);

    let id = s.cache_identity().cloned().unwrap();
    assert_eq!(
        s.paths().cached_frames(&id).unwrap(),
        vec![r(0, 1), r(1, 1), r(2, 1)]
    );
    let tex = s.value(INPUT, Rational::from_int(1)).unwrap();
    assert!(tex.download().unwrap().iter().all(|&b| b == 200));

    s.release();
    assert_eq!(s.state(), SchedulerState::Stopped);
}

#[test]
fn cache_name_reset_changes_identity() {
    let mut s = scheduler("rename");
    s.set_cache_name("first");
    let first = s.cache_identity().cloned().unwrap();
    s.set_cache_name("second");
    assert_ne!(s.cache_identity().cloned().unwrap(), first);
}
