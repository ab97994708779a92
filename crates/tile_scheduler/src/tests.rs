use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::executor::{LocalPool, block_on};
use futures::task::LocalSpawnExt;
use render_protocol::{FetchError, TileRequest};
use tiles::TILE_LINES;

use super::*;

const FFT_SIZE: u32 = 16;

/// Viewport showing `tile_count` whole tiles at stride 1.
fn params(tile_count: u32) -> RenderParams {
    RenderParams {
        scroll_offset_x: 0.0,
        fft_size: FFT_SIZE,
        stride: 1,
        total_samples: 1 << 24,
        viewport_width: tile_count * TILE_LINES,
        viewport_height: 100,
        power_min: -100.0,
        power_max: 0.0,
        zoom_y: 1.0,
        scroll_offset_y_norm: 0.0,
    }
}

fn tile(index: u64) -> TileAddress {
    TileAddress::for_index(index, FFT_SIZE, 1)
}

fn full_tile() -> Vec<f32> {
    vec![-40.0; (FFT_SIZE * 4) as usize]
}

#[derive(Debug, Default)]
struct MemorySink {
    tiles: HashMap<TileAddress, usize>,
    refuse: HashSet<TileAddress>,
    presents: usize,
}

impl TileSink for MemorySink {
    type UploadError = &'static str;

    fn contains(&self, address: &TileAddress) -> bool {
        self.tiles.contains_key(address)
    }

    fn upload(&mut self, address: TileAddress, values: Vec<f32>) -> Result<(), Self::UploadError> {
        if self.refuse.contains(&address) {
            return Err("refused");
        }
        self.tiles.insert(address, values.len());
        Ok(())
    }

    fn present(&mut self) {
        self.presents += 1;
    }
}

/// Answers every request immediately from a fixed table.
#[derive(Default)]
struct ReadySource {
    responses: HashMap<u64, Result<Vec<f32>, FetchError>>,
    requests: RefCell<Vec<TileRequest>>,
}

impl TileSource for ReadySource {
    fn fetch_tile(
        &self,
        request: TileRequest,
    ) -> impl Future<Output = Result<Vec<f32>, FetchError>> {
        self.requests.borrow_mut().push(request);
        let response = self
            .responses
            .get(&request.sample_start)
            .cloned()
            .unwrap_or_else(|| Ok(full_tile()));
        futures::future::ready(response)
    }
}

/// Holds every request open until the test answers it.
#[derive(Default)]
struct ManualSource {
    pending: RefCell<Vec<(TileRequest, oneshot::Sender<Result<Vec<f32>, FetchError>>)>>,
}

impl ManualSource {
    fn pending_starts(&self) -> Vec<u64> {
        self.pending
            .borrow()
            .iter()
            .map(|(request, _)| request.sample_start)
            .collect()
    }

    fn resolve_all(&self) {
        for (_, sender) in self.pending.borrow_mut().drain(..) {
            let _ = sender.send(Ok(full_tile()));
        }
    }
}

impl TileSource for ManualSource {
    fn fetch_tile(
        &self,
        request: TileRequest,
    ) -> impl Future<Output = Result<Vec<f32>, FetchError>> {
        let (sender, receiver) = oneshot::channel();
        self.pending.borrow_mut().push((request, sender));
        async move { receiver.await.unwrap_or(Err(FetchError::Unavailable)) }
    }
}

fn spawn_pass(
    pool: &LocalPool,
    scheduler: &TileScheduler,
    generation: Generation,
    params: RenderParams,
    source: &Rc<ManualSource>,
    sink: &Rc<RefCell<MemorySink>>,
) -> Rc<RefCell<Option<PassReport>>> {
    let report = Rc::new(RefCell::new(None));
    let scheduler = scheduler.clone();
    let source = Rc::clone(source);
    let sink = Rc::clone(sink);
    let slot = Rc::clone(&report);
    pool.spawner()
        .spawn_local(async move {
            let finished = scheduler
                .run_pass(generation, params, &*source, &*sink)
                .await;
            *slot.borrow_mut() = Some(finished);
        })
        .expect("spawn pass");
    report
}

#[test]
fn generation_advances_monotonically() {
    let generation = RenderGeneration::default();
    let first = generation.advance();
    let second = generation.advance();
    assert!(second > first);
    assert!(!generation.is_current(first));
    assert!(generation.is_current(second));
    assert_eq!(generation.clone().current(), second);
}

#[test]
fn pass_fetches_missing_tiles_in_batches_and_presents_after_each() {
    let scheduler = TileScheduler::new(TileSchedulerConfig {
        max_concurrent_fetches: 2,
    });
    let source = ReadySource::default();
    let sink = RefCell::new(MemorySink::default());

    let report = block_on(scheduler.schedule(params(5), &source, &sink));

    assert_eq!(report.requested, 5);
    assert_eq!(report.uploaded, 5);
    assert!(!report.superseded);
    let sink = sink.into_inner();
    assert_eq!(sink.tiles.len(), 5);
    // One immediate present plus one per batch of two.
    assert_eq!(sink.presents, 1 + 3);
    let starts: Vec<u64> = source
        .requests
        .borrow()
        .iter()
        .map(|request| request.sample_start)
        .collect();
    assert_eq!(starts, (0..5).map(|index| tile(index).sample_start).collect::<Vec<_>>());
}

#[test]
fn cached_tiles_are_not_requested_again() {
    let scheduler = TileScheduler::default();
    let source = ReadySource::default();
    let mut memory = MemorySink::default();
    memory.tiles.insert(tile(1), 1);
    memory.tiles.insert(tile(2), 1);
    let sink = RefCell::new(memory);

    assert_eq!(
        TileScheduler::needed_tiles(&params(4), &*sink.borrow()),
        vec![tile(0), tile(3)]
    );
    let report = block_on(scheduler.schedule(params(4), &source, &sink));

    assert_eq!(report.requested, 2);
    assert_eq!(source.requests.borrow().len(), 2);
}

#[test]
fn failures_and_rejections_leave_tiles_uncached() {
    let scheduler = TileScheduler::default();
    let mut source = ReadySource::default();
    source
        .responses
        .insert(tile(0).sample_start, Err(FetchError::Failed("disk".into())));
    source.responses.insert(tile(1).sample_start, Ok(Vec::new()));
    let mut memory = MemorySink::default();
    memory.refuse.insert(tile(2));
    let sink = RefCell::new(memory);

    let report = block_on(scheduler.schedule(params(4), &source, &sink));

    assert_eq!(report.failed, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.uploaded, 1);
    let sink = sink.into_inner();
    assert_eq!(sink.tiles.keys().copied().collect::<Vec<_>>(), vec![tile(3)]);
}

#[test]
fn only_one_batch_is_in_flight_at_a_time() {
    let mut pool = LocalPool::new();
    let scheduler = TileScheduler::new(TileSchedulerConfig {
        max_concurrent_fetches: 3,
    });
    let source = Rc::new(ManualSource::default());
    let sink = Rc::new(RefCell::new(MemorySink::default()));

    let generation = scheduler.begin_pass();
    let report = spawn_pass(&pool, &scheduler, generation, params(7), &source, &sink);

    pool.run_until_stalled();
    assert_eq!(source.pending_starts().len(), 3);
    source.resolve_all();
    pool.run_until_stalled();
    assert_eq!(sink.borrow().tiles.len(), 3);
    assert_eq!(source.pending_starts().len(), 3);
    source.resolve_all();
    pool.run_until_stalled();
    assert_eq!(source.pending_starts(), vec![tile(6).sample_start]);
    source.resolve_all();
    pool.run_until_stalled();

    let report = report.borrow().expect("pass finished");
    assert_eq!(report.uploaded, 7);
    assert_eq!(sink.borrow().tiles.len(), 7);
}

#[test]
fn result_arriving_after_two_generation_bumps_is_dropped() {
    let mut pool = LocalPool::new();
    let scheduler = TileScheduler::default();
    let source = Rc::new(ManualSource::default());
    let sink = Rc::new(RefCell::new(MemorySink::default()));

    let generation = scheduler.begin_pass();
    let report = spawn_pass(&pool, &scheduler, generation, params(2), &source, &sink);
    pool.run_until_stalled();
    assert_eq!(source.pending_starts().len(), 2);
    let presents_before = sink.borrow().presents;

    scheduler.begin_pass();
    scheduler.begin_pass();
    source.resolve_all();
    pool.run_until_stalled();

    let report = report.borrow().expect("pass finished");
    assert_eq!(report.stale, 2);
    assert_eq!(report.uploaded, 0);
    assert!(report.superseded);
    let sink = sink.borrow();
    assert!(sink.tiles.is_empty());
    assert_eq!(sink.presents, presents_before);
}

#[test]
fn superseded_pass_stops_issuing_batches() {
    let mut pool = LocalPool::new();
    let scheduler = TileScheduler::new(TileSchedulerConfig {
        max_concurrent_fetches: 1,
    });
    let source = Rc::new(ManualSource::default());
    let sink = Rc::new(RefCell::new(MemorySink::default()));

    let old = scheduler.begin_pass();
    let old_report = spawn_pass(&pool, &scheduler, old, params(3), &source, &sink);
    pool.run_until_stalled();
    assert_eq!(source.pending_starts(), vec![tile(0).sample_start]);

    // A scroll to a different window starts a newer pass before the old fetch lands.
    let scrolled = RenderParams {
        scroll_offset_x: f64::from(TILE_LINES) * 10.0,
        ..params(1)
    };
    let new = scheduler.begin_pass();
    let new_report = spawn_pass(&pool, &scheduler, new, scrolled, &source, &sink);
    pool.run_until_stalled();
    assert_eq!(
        source.pending_starts(),
        vec![tile(0).sample_start, tile(10).sample_start]
    );

    source.resolve_all();
    pool.run_until_stalled();

    let old_report = old_report.borrow().expect("old pass finished");
    assert_eq!(old_report.stale, 1);
    assert!(old_report.superseded);
    let new_report = new_report.borrow().expect("new pass finished");
    assert_eq!(new_report.uploaded, 1);
    assert!(source.pending_starts().is_empty());
    let sink = sink.borrow();
    assert_eq!(sink.tiles.keys().copied().collect::<Vec<_>>(), vec![tile(10)]);
}

#[test]
fn pass_started_with_an_old_generation_does_nothing() {
    let scheduler = TileScheduler::default();
    let source = ReadySource::default();
    let sink = RefCell::new(MemorySink::default());

    let old = scheduler.begin_pass();
    scheduler.begin_pass();
    let report = block_on(scheduler.run_pass(old, params(2), &source, &sink));

    assert!(report.superseded);
    assert!(source.requests.borrow().is_empty());
    assert_eq!(sink.into_inner().presents, 0);
}
