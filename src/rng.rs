use rand_core::{Error, RngCore};
use std::time::{SystemTime, UNIX_EPOCH};

// xoshiro256** (https://prng.di.unimi.it/), seeded through SplitMix64.
// Each chunk of trials gets its own stream; streams are never shared across threads.

const GOLDEN_GAMMA: u64 = 0x9e3779b97f4a7c15;

#[derive(Clone, Debug)]
pub struct Rng {
    state: [u64; 4],
}

#[inline]
fn splitmix64(s: &mut u64) -> u64 {
    *s = s.wrapping_add(GOLDEN_GAMMA);
    let mut z = *s;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

impl Rng {
    pub fn from_seed(mut seed: u64) -> Self {
        Rng {
            state: [
                splitmix64(&mut seed),
                splitmix64(&mut seed),
                splitmix64(&mut seed),
                splitmix64(&mut seed),
            ],
        }
    }

    /// Clock nanoseconds mixed with a heap address, so two processes started in
    /// the same instant still diverge.
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let heap_var = Box::new(0u8);
        let ptr_val = &*heap_var as *const u8 as u64;
        Self::from_seed(nanos ^ ptr_val.rotate_left(32))
    }

    /// Independent stream `index` under `base_seed`. The index is scrambled
    /// before seeding so neighbouring chunks do not start from neighbouring
    /// SplitMix states.
    pub fn stream(base_seed: u64, index: u64) -> Self {
        let mut mix = index.wrapping_mul(GOLDEN_GAMMA) ^ base_seed;
        Self::from_seed(splitmix64(&mut mix))
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let result = self.state[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;

        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);

        result
    }

    /// Uniform in [0, 1) with the full 53-bit mantissa.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) * (1.0 / 9007199254740992.0)
    }
}

impl Default for Rng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for Rng {
    fn next_u32(&mut self) -> u32 {
        (Rng::next_u64(self) >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        Rng::next_u64(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = Rng::next_u64(self).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Rng::from_seed(42);
        let mut b = Rng::from_seed(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn streams_diverge() {
        let mut a = Rng::stream(7, 0);
        let mut b = Rng::stream(7, 1);
        let same = (0..64).filter(|_| a.next_u64() == b.next_u64()).count();
        assert_eq!(same, 0);
    }

    #[test]
    fn next_f64_is_in_unit_interval_with_sane_mean() {
        let mut rng = Rng::from_seed(9);
        let n = 200_000;
        let mut sum = 0.0;
        for _ in 0..n {
            let x = rng.next_f64();
            assert!((0.0..1.0).contains(&x));
            sum += x;
        }
        assert!((sum / n as f64 - 0.5).abs() < 0.005);
    }

    #[test]
    fn fill_bytes_handles_ragged_tail() {
        let mut rng = Rng::from_seed(3);
        let mut buf = [0u8; 13];
        rng.fill_bytes(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
