//! Simple random number generator for reproducible weight initialisation.
//!
//! A lightweight xorshift PRNG plus the [`WeightInit`] capability the network
//! uses to fill freshly allocated weight buffers with Gaussian samples.

/// Capability consumed by network initialisation: fill a buffer with samples
/// drawn from `Normal(mean, std_dev)`.
pub trait WeightInit {
    fn fill_normal(&mut self, buffer: &mut [f32], mean: f32, std_dev: f32);
}

/// Simple RNG for reproducibility without external crates.
///
/// Uses xorshift for fast, deterministic generation.
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }

    /// Basic xorshift to generate u32.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }

    /// Convert to [0, 1].
    pub fn next_f32(&mut self) -> f32 {
        self.next_u32() as f32 / u32::MAX as f32
    }

    /// One standard-normal sample via the Box-Muller transform.
    pub fn next_standard_normal(&mut self) -> f32 {
        // u1 must stay away from zero for the logarithm.
        let u1 = (self.next_u32() as f64 + 1.0) / (u32::MAX as f64 + 2.0);
        let u2 = self.next_u32() as f64 / u32::MAX as f64;
        ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
    }

    /// Integer sample in [0, upper).
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            (self.next_u32() as usize) % upper
        }
    }

    /// Fisher-Yates shuffle for usize slices.
    pub fn shuffle_usize(&mut self, data: &mut [usize]) {
        if data.len() <= 1 {
            return;
        }
        for i in (1..data.len()).rev() {
            let j = self.gen_usize(i + 1);
            data.swap(i, j);
        }
    }
}

impl WeightInit for SimpleRng {
    fn fill_normal(&mut self, buffer: &mut [f32], mean: f32, std_dev: f32) {
        for value in buffer.iter_mut() {
            *value = mean + std_dev * self.next_standard_normal();
        }
    }
}
