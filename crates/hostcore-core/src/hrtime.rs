//! High-resolution time exposed through a field buffer.

use std::time::{Duration, Instant};

use crate::field_buffer::FieldBuffer;

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Slot layout of [`HrTime::fields`].
pub mod hrtime_fields {
    pub const SECONDS_HIGH: usize = 0;
    pub const SECONDS_LOW: usize = 1;
    pub const NANOSECONDS: usize = 2;
    pub const FIELDS_COUNT: usize = 3;
}

/// Monotonic clock anchored at host creation.
#[derive(Debug, Clone)]
pub struct HrTime {
    origin: Instant,
    fields: FieldBuffer<u32>,
}

impl Default for HrTime {
    fn default() -> Self {
        Self::new()
    }
}

impl HrTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            fields: FieldBuffer::new(hrtime_fields::FIELDS_COUNT),
        }
    }

    /// Shared `[seconds_high, seconds_low, nanoseconds]` slots written by
    /// [`hrtime`](Self::hrtime).
    pub fn fields(&self) -> &FieldBuffer<u32> {
        &self.fields
    }

    /// Write the elapsed time into the field buffer and return it.
    pub fn hrtime(&self) -> [u32; 3] {
        let encoded = encode(self.origin.elapsed());
        for (slot, value) in encoded.iter().enumerate() {
            self.fields.set(slot, *value);
        }
        encoded
    }

    /// Elapsed nanoseconds as a single integer.
    pub fn hrtime_bigint(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Seconds since host creation.
    pub fn uptime(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Split a duration into `[seconds_high, seconds_low, nanoseconds]`.
pub fn encode(t: Duration) -> [u32; 3] {
    let secs = t.as_secs();
    [(secs >> 32) as u32, (secs & 0xffff_ffff) as u32, t.subsec_nanos()]
}

/// Inverse of [`encode`].
pub fn decode(fields: [u32; 3]) -> Duration {
    let secs = (u64::from(fields[0]) << 32) | u64::from(fields[1]);
    Duration::new(secs, fields[2])
}
