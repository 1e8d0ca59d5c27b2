//! Chunk Assembler (C2): turns the endpoint's variable-sized packets into
//! fixed-frame-count [`Chunk`]s, synthesizing silence to cover reported
//! data-discontinuities (§4.2).

use crate::types::{AudioFormat, Chunk};
use std::sync::Arc;

pub struct ChunkAssembler {
    format: AudioFormat,
    chunk_frames: u32,
    staging: Vec<f32>,
    /// Parallel to `staging`: `true` at index `i` iff `staging[i]` was
    /// synthesized (gap padding or teardown fill) rather than real captured
    /// audio. A chunk's `silent` flag is read off this, never inferred from
    /// sample values (§4.2).
    staging_synthetic: Vec<bool>,
    next_sequence: u64,
}

impl ChunkAssembler {
    pub fn new(format: AudioFormat, chunk_frames: u32) -> Self {
        let capacity = format.frame_size_samples(chunk_frames) * 2;
        Self {
            format,
            chunk_frames,
            staging: Vec::with_capacity(capacity),
            staging_synthetic: Vec::with_capacity(capacity),
            next_sequence: 0,
        }
    }

    fn samples_per_chunk(&self) -> usize {
        self.format.frame_size_samples(self.chunk_frames)
    }

    /// Appends interleaved samples and emits any whole chunks to `sink`.
    pub fn feed(&mut self, samples: &[f32], timestamp_100ns: u64, sink: &mut dyn FnMut(Chunk)) {
        self.staging.extend_from_slice(samples);
        self.staging_synthetic.resize(self.staging.len(), false);
        self.drain_complete_chunks(timestamp_100ns, sink);
    }

    /// Emits fully-silent chunks covering at least `frame_count` frames of
    /// reported gap, before any subsequent `feed` call's samples are staged.
    pub fn mark_gap(&mut self, frame_count: u32, timestamp_100ns: u64, sink: &mut dyn FnMut(Chunk)) {
        let silence_samples = self.format.frame_size_samples(frame_count);
        self.staging.extend(std::iter::repeat(0.0f32).take(silence_samples));
        self.staging_synthetic.resize(self.staging.len(), true);
        self.drain_complete_chunks(timestamp_100ns, sink);
    }

    /// Pads any residual staging with synthesized silence into one final
    /// chunk and emits it. Called during teardown.
    pub fn flush(&mut self, timestamp_100ns: u64, sink: &mut dyn FnMut(Chunk)) {
        if self.staging.is_empty() {
            return;
        }
        let needed = self.samples_per_chunk();
        if self.staging.len() < needed {
            self.staging.resize(needed, 0.0);
            self.staging_synthetic.resize(needed, true);
        }
        self.drain_complete_chunks(timestamp_100ns, sink);
    }

    fn drain_complete_chunks(&mut self, timestamp_100ns: u64, sink: &mut dyn FnMut(Chunk)) {
        let needed = self.samples_per_chunk();
        while self.staging.len() >= needed {
            let tail = self.staging.split_off(needed);
            let samples: Vec<f32> = std::mem::replace(&mut self.staging, tail);
            let synthetic_tail = self.staging_synthetic.split_off(needed);
            let synthetic: Vec<bool> =
                std::mem::replace(&mut self.staging_synthetic, synthetic_tail);
            let chunk_silent = synthetic.iter().all(|&s| s);
            sink(Chunk {
                samples: Arc::from(samples),
                frame_count: self.chunk_frames,
                sequence: self.next_sequence,
                silent: chunk_silent,
                timestamp_100ns,
            });
            self.next_sequence += 1;
        }
    }
}
