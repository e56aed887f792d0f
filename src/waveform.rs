//! Precomputed single-tone I/Q table.
//!
//! The table holds exactly two cycles of the tone as interleaved `[I, Q]` byte pairs, so a
//! reader can wrap from the last byte back to the first without a phase discontinuity.

use std::f64::consts::PI;

use crate::{Error, Result};

/// Sample value for zero amplitude.
pub const MIDSCALE: u8 = 127;

/// Fixed value of every quadrature sample.
pub const QUADRATURE_LEVEL: u8 = 0;

/// Number of tone cycles stored in a table.
const CYCLES: usize = 2;

/// Two cycles of a cosine tone as interleaved unsigned I/Q bytes.
///
/// Amplitude -1 maps to 0, 0 to [`MIDSCALE`] and +1 to 254. The length is always
/// `4 * (sample_rate / tone_hz)`: positive and even.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformTable {
    samples: Box<[u8]>,
    samples_per_cycle: usize,
}

impl WaveformTable {
    /// Builds the table for a tone of `tone_hz` at `sample_rate` I/Q pairs per second.
    ///
    /// `sample_rate / tone_hz` is truncated, so rates that are not a multiple of the tone
    /// produce a slightly higher tone than requested.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if `tone_hz` is zero or greater than `sample_rate`.
    pub fn new(sample_rate: u32, tone_hz: u32) -> Result<Self> {
        if tone_hz == 0 {
            return Err(Error::Argument("tone frequency must be non-zero"));
        }
        if tone_hz > sample_rate {
            return Err(Error::Argument(
                "tone frequency must not exceed the sample rate",
            ));
        }

        let samples_per_cycle = (sample_rate / tone_hz) as usize;
        let cycle_len = 2 * samples_per_cycle;
        let mut samples = vec![QUADRATURE_LEVEL; CYCLES * cycle_len];

        for (k, pair) in samples[..cycle_len].chunks_exact_mut(2).enumerate() {
            let phase = k as f64 / samples_per_cycle as f64;
            pair[0] = in_phase(phase);
        }
        for cycle in 1..CYCLES {
            samples.copy_within(..cycle_len, cycle * cycle_len);
        }

        Ok(Self {
            samples: samples.into_boxed_slice(),
            samples_per_cycle,
        })
    }

    /// Number of I/Q pairs in one tone cycle.
    pub fn samples_per_cycle(&self) -> usize {
        self.samples_per_cycle
    }

    /// Length of the table in bytes.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the table holds no samples, which construction rules out.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw interleaved bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.samples
    }
}

/// `phase` is in cycles, so `1.0` is a full turn.
fn in_phase(phase: f64) -> u8 {
    let value = f64::from(MIDSCALE) * (2.0 * PI * phase).cos();
    (f64::from(MIDSCALE) + value.round()) as u8
}
