// Random sources: the `RandomSource` trait, a minimal xorshift PRNG
// (no external crates), and fixed-sample sources for tests.
//
// This is NOT cryptographically secure.
// It is used only for controlled noise/exploration and reproducible runs.

/// Uniform `[0, 1)` sample source consumed by the lattice, bias field and
/// bias producers.
///
/// Object-safe so producers can take `&mut dyn RandomSource`.
pub trait RandomSource {
    /// Next sample in `[0, 1)`.
    fn next_f32(&mut self) -> f32;

    /// Uniform index in `[0, n)`. Returns 0 when `n == 0`.
    fn next_below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let i = (self.next_f32() * n as f32) as usize;
        i.min(n - 1)
    }

    /// Uniform value in `[low, high)`.
    fn next_range(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }
}

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    pub fn state(&self) -> u64 {
        self.state
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    pub fn next_f32_01(&mut self) -> f32 {
        // 24 mantissa bits so the result never rounds up to 1.0.
        let x = self.next_u32() >> 8;
        (x as f32) / ((1u32 << 24) as f32)
    }

    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low) as u64;
        let v = self.next_u64() % span;
        low + v as usize
    }
}

impl RandomSource for Prng {
    #[inline]
    fn next_f32(&mut self) -> f32 {
        self.next_f32_01()
    }

    fn next_below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.gen_range_usize(0, n)
    }
}

/// Returns the same sample forever. Used to force branches in tests
/// (`0.0` always passes every `r < p` check with `p > 0`).
#[derive(Debug, Clone, Copy)]
pub struct ConstantSource(pub f32);

impl RandomSource for ConstantSource {
    fn next_f32(&mut self) -> f32 {
        self.0.clamp(0.0, 1.0 - f32::EPSILON)
    }
}

/// Cycles through a fixed list of samples.
#[derive(Debug, Clone)]
pub struct SequenceSource {
    values: Vec<f32>,
    cursor: usize,
}

impl SequenceSource {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, cursor: 0 }
    }
}

impl RandomSource for SequenceSource {
    fn next_f32(&mut self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        let v = self.values[self.cursor % self.values.len()];
        self.cursor = self.cursor.wrapping_add(1);
        v.clamp(0.0, 1.0 - f32::EPSILON)
    }
}
