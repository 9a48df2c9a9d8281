//! Time sampling - maps sample indices to times.
//!
//! Properties are sampled over time. A `TimeSampling` describes when each
//! sample index was recorded; samplings are shared by index through the
//! archive's time-sampling table, with index 0 always being the identity
//! sampling (uniform, one second per sample, starting at 0).

use crate::util::Chrono;

/// Absolute tolerance for all time comparisons.
pub const TIME_EPSILON: Chrono = 1e-9;

/// Sentinel sample count meaning "as many samples as were written".
/// Stored in the time-sampling table for acyclic samplings.
pub const ACYCLIC_NUM_SAMPLES: u32 = u32::MAX;

/// Sentinel time-per-cycle marking an acyclic sampling on disk.
pub const ACYCLIC_TIME_PER_CYCLE: Chrono = f64::MAX / 32.0;

/// Kind of time sampling.
#[derive(Clone, Debug, PartialEq)]
pub enum TimeSamplingKind {
    /// Samples at regular intervals: start_time + index * time_per_cycle.
    Uniform {
        time_per_cycle: Chrono,
        start_time: Chrono,
    },

    /// Repeating pattern of per-cycle offsets, shifted by a whole number
    /// of cycles: times[index % N] + (index / N) * time_per_cycle.
    Cyclic {
        time_per_cycle: Chrono,
        times: Vec<Chrono>,
    },

    /// Explicit, strictly increasing time for each sample.
    Acyclic { times: Vec<Chrono> },
}

impl TimeSamplingKind {
    #[inline]
    pub fn is_uniform(&self) -> bool {
        matches!(self, Self::Uniform { .. })
    }

    #[inline]
    pub fn is_cyclic(&self) -> bool {
        matches!(self, Self::Cyclic { .. })
    }

    #[inline]
    pub fn is_acyclic(&self) -> bool {
        matches!(self, Self::Acyclic { .. })
    }

    /// Number of stored times per cycle (1 for uniform).
    pub fn samples_per_cycle(&self) -> usize {
        match self {
            Self::Uniform { .. } => 1,
            Self::Cyclic { times, .. } => times.len(),
            Self::Acyclic { times } => times.len(),
        }
    }
}

impl Default for TimeSamplingKind {
    fn default() -> Self {
        Self::Uniform {
            time_per_cycle: 1.0,
            start_time: 0.0,
        }
    }
}

/// Immutable time sampling shared by properties through the archive table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSampling {
    pub kind: TimeSamplingKind,
}

impl TimeSampling {
    /// The identity sampling: one sample per second starting at 0.
    /// Always present at table index 0.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create uniform time sampling.
    pub fn uniform(time_per_cycle: Chrono, start_time: Chrono) -> Self {
        Self {
            kind: TimeSamplingKind::Uniform {
                time_per_cycle,
                start_time,
            },
        }
    }

    /// Create cyclic time sampling from per-cycle offsets.
    pub fn cyclic(time_per_cycle: Chrono, times: Vec<Chrono>) -> Self {
        Self {
            kind: TimeSamplingKind::Cyclic {
                time_per_cycle,
                times,
            },
        }
    }

    /// Create acyclic time sampling from explicit times.
    pub fn acyclic(times: Vec<Chrono>) -> Self {
        Self {
            kind: TimeSamplingKind::Acyclic { times },
        }
    }

    /// Get the time for a sample index.
    ///
    /// Acyclic samplings clamp past-the-end indices to the last stored time.
    pub fn time_at(&self, index: usize) -> Chrono {
        match &self.kind {
            TimeSamplingKind::Uniform {
                time_per_cycle,
                start_time,
            } => *start_time + (index as Chrono) * *time_per_cycle,
            TimeSamplingKind::Cyclic {
                time_per_cycle,
                times,
            } => {
                if times.is_empty() {
                    return 0.0;
                }
                let cycle = index / times.len();
                let local = index % times.len();
                times[local] + (cycle as Chrono) * *time_per_cycle
            }
            TimeSamplingKind::Acyclic { times } => match times.get(index) {
                Some(t) => *t,
                None => times.last().copied().unwrap_or(0.0),
            },
        }
    }

    /// Largest index whose time is <= the given time (within tolerance),
    /// clamped to [0, num_samples - 1]. Returns the index and its time.
    pub fn floor_index(&self, time: Chrono, num_samples: usize) -> (usize, Chrono) {
        if num_samples == 0 {
            return (0, 0.0);
        }

        match &self.kind {
            TimeSamplingKind::Uniform {
                time_per_cycle,
                start_time,
            } => {
                if time <= *start_time + TIME_EPSILON {
                    return (0, *start_time);
                }
                let idx = ((time - start_time + TIME_EPSILON) / time_per_cycle) as usize;
                let idx = idx.min(num_samples - 1);
                (idx, self.time_at(idx))
            }
            TimeSamplingKind::Cyclic { .. } | TimeSamplingKind::Acyclic { .. } => {
                let mut lo = 0;
                let mut hi = num_samples;
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    if self.time_at(mid) <= time + TIME_EPSILON {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                let idx = lo.saturating_sub(1);
                (idx, self.time_at(idx))
            }
        }
    }

    /// Smallest index whose time is >= the given time (within tolerance),
    /// clamped to [0, num_samples - 1]. Returns the index and its time.
    pub fn ceil_index(&self, time: Chrono, num_samples: usize) -> (usize, Chrono) {
        if num_samples == 0 {
            return (0, 0.0);
        }

        let (floor_idx, floor_time) = self.floor_index(time, num_samples);
        if floor_time >= time - TIME_EPSILON {
            return (floor_idx, floor_time);
        }

        let ceil_idx = (floor_idx + 1).min(num_samples - 1);
        (ceil_idx, self.time_at(ceil_idx))
    }

    /// Index whose time is closest to the given time; exact ties resolve
    /// to the earlier index. Clamped to [0, num_samples - 1].
    pub fn nearest_index(&self, time: Chrono, num_samples: usize) -> (usize, Chrono) {
        if num_samples == 0 {
            return (0, 0.0);
        }

        let (floor_idx, floor_time) = self.floor_index(time, num_samples);
        if floor_idx + 1 >= num_samples || time <= floor_time {
            return (floor_idx, floor_time);
        }

        let ceil_idx = floor_idx + 1;
        let ceil_time = self.time_at(ceil_idx);

        if time - floor_time <= ceil_time - time {
            (floor_idx, floor_time)
        } else {
            (ceil_idx, ceil_time)
        }
    }
}
