use std::time::Duration;

use super::*;
use crate::foundation::core::Rational;
use crate::graph::{NodeId, NodeValue, NodeValueTable, TEXTURE_KEY};
use crate::render::params::PixelFormat;
use crate::render::texture::CpuTextureBackend;

const WAIT: Duration = Duration::from_secs(5);

struct GateGraph {
    started: Sender<NodeDependency>,
    gate: Receiver<()>,
}

impl NodeGraph for GateGraph {
    fn evaluate(
        &self,
        ctx: &RenderContext,
        dep: &NodeDependency,
    ) -> FrameCacheResult<NodeValueTable> {
        let _ = self.started.send(*dep);
        let _ = self.gate.recv_timeout(WAIT);
        let mut table = NodeValueTable::new();
        table.insert(TEXTURE_KEY, NodeValue::Texture(ctx.create_texture()?));
        Ok(table)
    }
}

fn params() -> RenderParams {
    RenderParams {
        width: 4,
        height: 4,
        format: PixelFormat::Rgba8,
        ..RenderParams::default()
    }
}

fn dep(frame: i64) -> NodeDependency {
    NodeDependency::at(NodeId(1), Rational::from_int(frame))
}

struct Harness {
    pool: RenderWorkerPool,
    started_rx: Receiver<NodeDependency>,
    gate_tx: Sender<()>,
    events_rx: Receiver<SchedulerEvent>,
}

fn harness(size: usize) -> Harness {
    let (started_tx, started_rx) = crossbeam_channel::unbounded();
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let graph = Arc::new(GateGraph {
        started: started_tx,
        gate: gate_rx,
    });
    let pool = RenderWorkerPool::start(
        size,
        7,
        graph,
        Arc::new(CpuTextureBackend),
        params(),
        events_tx,
    )
    .unwrap();
    Harness {
        pool,
        started_rx,
        gate_tx,
        events_rx,
    }
}

#[test]
fn primary_render_reports_to_scheduler() {
    let h = harness(1);
    assert!(h.pool.queue_primary(dep(3)));
    assert_eq!(h.started_rx.recv_timeout(WAIT).unwrap(), dep(3));
    h.gate_tx.send(()).unwrap();

    match h.events_rx.recv_timeout(WAIT).unwrap() {
        SchedulerEvent::RenderFinished {
            generation,
            worker,
            dep: done,
            result,
        } => {
            assert_eq!(generation, 7);
            assert_eq!(worker, 0);
            assert_eq!(done, dep(3));
            let tex = result.unwrap().unwrap();
            assert_eq!((tex.width(), tex.height()), (4, 4));
        }
        other => panic!("unexpected event {other:?}"),
    }
    h.pool.shutdown();
}

#[test]
fn busy_worker_rejects_prefetch_but_accepts_primary() {
    let h = harness(1);
    assert!(h.pool.queue_primary(dep(0)));
    h.started_rx.recv_timeout(WAIT).unwrap();

    assert_eq!(h.pool.request_sibling(dep(1)), None);
    assert!(h.pool.queue_primary(dep(2)));

    h.gate_tx.send(()).unwrap();
    h.gate_tx.send(()).unwrap();
    for _ in 0..2 {
        h.events_rx.recv_timeout(WAIT).unwrap();
    }
    assert!(h.pool.master().unwrap().is_idle());
    assert_eq!(h.pool.request_sibling(dep(1)), Some(0));
    h.gate_tx.send(()).unwrap();
    h.pool.shutdown();
}

#[test]
fn first_idle_sibling_takes_prefetch() {
    let h = harness(3);
    assert!(h.pool.queue_primary(dep(0)));
    h.started_rx.recv_timeout(WAIT).unwrap();

    assert_eq!(h.pool.request_sibling(dep(5)), Some(1));
    assert_eq!(h.pool.request_sibling(dep(6)), Some(2));
    assert_eq!(h.pool.request_sibling(dep(7)), None);
    assert_eq!(h.pool.len(), 3);

    for _ in 0..3 {
        h.gate_tx.send(()).unwrap();
    }
    // Only the primary item reports back.
    assert!(matches!(
        h.events_rx.recv_timeout(WAIT).unwrap(),
        SchedulerEvent::RenderFinished { .. }
    ));
    h.pool.shutdown();
}

#[test]
fn cancelled_worker_drops_result_and_rejects_work() {
    let mut h = harness(1);
    assert!(h.pool.queue_primary(dep(0)));
    h.started_rx.recv_timeout(WAIT).unwrap();

    h.pool.workers[0].cancel();
    assert!(!h.pool.queue_primary(dep(1)));
    assert_eq!(h.pool.request_sibling(dep(1)), None);

    h.gate_tx.send(()).unwrap();
    h.pool.shutdown();
    assert!(h.events_rx.try_recv().is_err());
}

#[test]
fn worker_threads_lower_their_priority() {
    let (first, second) = std::thread::spawn(|| {
        (
            lower_current_thread_priority("render", 0),
            lower_current_thread_priority("render", 0),
        )
    })
    .join()
    .unwrap();
    // Repeating it is a no-op.
    assert_eq!(first, second);
}
