//! Keeps the tile cache fed with the tiles the current viewport needs.
//!
//! Every change to tile addressing starts a pass under a new [`Generation`]. A pass
//! fetches the missing tiles in fixed-size concurrent batches and drops any result
//! that arrives after its generation was superseded. Fetches are never aborted.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use futures::future::join_all;
use render_protocol::{RenderParams, TileSource};
use serde::{Deserialize, Serialize};
use tiles::{TileAddress, visible_tiles};

pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSchedulerConfig {
    pub max_concurrent_fetches: usize,
}

impl Default for TileSchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic render generation shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct RenderGeneration(Rc<Cell<u64>>);

impl RenderGeneration {
    pub fn advance(&self) -> Generation {
        let next = self.0.get() + 1;
        self.0.set(next);
        Generation(next)
    }

    pub fn current(&self) -> Generation {
        Generation(self.0.get())
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.0.get() == generation.0
    }
}

/// Destination of fetched tiles, usually the renderer plus its output surface.
pub trait TileSink {
    type UploadError: fmt::Display;

    fn contains(&self, address: &TileAddress) -> bool;

    /// Must leave `address` uncached when it returns an error.
    fn upload(&mut self, address: TileAddress, values: Vec<f32>) -> Result<(), Self::UploadError>;

    /// Redraws the current view from whatever is cached.
    fn present(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub generation: Generation,
    /// Tiles missing from the sink when the pass started.
    pub requested: usize,
    pub uploaded: usize,
    /// Fetches that failed or came back empty.
    pub failed: usize,
    /// Uploads the sink refused.
    pub rejected: usize,
    /// Results dropped because a newer pass started while they were in flight.
    pub stale: usize,
    /// The pass stopped before issuing every batch.
    pub superseded: bool,
}

impl PassReport {
    fn new(generation: Generation) -> Self {
        Self {
            generation,
            requested: 0,
            uploaded: 0,
            failed: 0,
            rejected: 0,
            stale: 0,
            superseded: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TileScheduler {
    config: TileSchedulerConfig,
    generation: RenderGeneration,
}

impl TileScheduler {
    pub fn new(config: TileSchedulerConfig) -> Self {
        Self {
            config,
            generation: RenderGeneration::default(),
        }
    }

    pub fn config(&self) -> TileSchedulerConfig {
        self.config
    }

    pub fn generation(&self) -> &RenderGeneration {
        &self.generation
    }

    /// Invalidates every in-flight pass and returns the generation of the next one.
    pub fn begin_pass(&self) -> Generation {
        self.generation.advance()
    }

    /// Visible tiles the sink does not hold yet, in ascending sample order.
    pub fn needed_tiles<K: TileSink>(params: &RenderParams, sink: &K) -> Vec<TileAddress> {
        visible_tiles(params)
            .into_iter()
            .filter(|address| !sink.contains(address))
            .collect()
    }

    /// Starts a new pass for `params` and runs it to completion.
    pub async fn schedule<S, K>(
        &self,
        params: RenderParams,
        source: &S,
        sink: &RefCell<K>,
    ) -> PassReport
    where
        S: TileSource,
        K: TileSink,
    {
        let generation = self.begin_pass();
        self.run_pass(generation, params, source, sink).await
    }

    /// Runs the pass started as `generation`.
    ///
    /// `sink` is only borrowed between fetches, never across an await.
    pub async fn run_pass<S, K>(
        &self,
        generation: Generation,
        params: RenderParams,
        source: &S,
        sink: &RefCell<K>,
    ) -> PassReport
    where
        S: TileSource,
        K: TileSink,
    {
        let mut report = PassReport::new(generation);
        if !self.generation.is_current(generation) {
            report.superseded = true;
            return report;
        }

        sink.borrow_mut().present();
        let needed = Self::needed_tiles(&params, &*sink.borrow());
        report.requested = needed.len();
        if needed.is_empty() {
            return report;
        }
        tracing::debug!(
            generation = generation.value(),
            needed = needed.len(),
            stride = params.stride,
            fft_size = params.fft_size,
            "tile pass started"
        );

        for batch in needed.chunks(self.config.max_concurrent_fetches.max(1)) {
            if !self.generation.is_current(generation) {
                report.superseded = true;
                break;
            }

            let results = join_all(batch.iter().map(|address| async move {
                (*address, source.fetch_tile(address.request()).await)
            }))
            .await;

            for (address, result) in results {
                if !self.generation.is_current(generation) {
                    report.stale += 1;
                    tracing::debug!(
                        generation = generation.value(),
                        sample_start = address.sample_start,
                        "dropped stale tile result"
                    );
                    continue;
                }
                match result {
                    Ok(values) if values.is_empty() => {
                        report.failed += 1;
                        tracing::debug!(sample_start = address.sample_start, "tile not available yet");
                    }
                    Ok(values) => match sink.borrow_mut().upload(address, values) {
                        Ok(()) => report.uploaded += 1,
                        Err(error) => {
                            report.rejected += 1;
                            tracing::warn!(
                                sample_start = address.sample_start,
                                fft_size = address.fft_size,
                                stride = address.stride,
                                %error,
                                "tile upload rejected"
                            );
                        }
                    },
                    Err(error) => {
                        report.failed += 1;
                        tracing::debug!(sample_start = address.sample_start, %error, "tile fetch failed");
                    }
                }
            }

            if !self.generation.is_current(generation) {
                report.superseded = true;
                break;
            }
            sink.borrow_mut().present();
        }
        report
    }
}

#[cfg(test)]
mod tests;
