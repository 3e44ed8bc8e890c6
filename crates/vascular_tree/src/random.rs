//! Random draws used by growth and distribution.
//!
//! All stochastic code takes an explicit `&mut dyn Rng`; nothing here holds a generator.
use rand::Rng;
use rand_distr::{Binomial, Distribution, Poisson};

/// Generate a random float in the range [0, 1).
#[inline]
pub(crate) fn rand01(rng: &mut dyn Rng) -> f64 {
    (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// Uniform float in `[lo, hi)`.
#[inline]
pub(crate) fn uniform(lo: f64, hi: f64, rng: &mut dyn Rng) -> f64 {
    lo + (hi - lo) * rand01(rng)
}

/// Uniform index in `0..len`. `len` must be non-zero.
#[inline]
pub(crate) fn index(len: usize, rng: &mut dyn Rng) -> usize {
    ((rand01(rng) * len as f64) as usize).min(len - 1)
}

#[inline]
pub(crate) fn bernoulli(p: f64, rng: &mut dyn Rng) -> bool {
    rand01(rng) < p
}

/// Exact Poisson draw. Non-positive or non-finite means yield zero.
pub(crate) fn poisson(lambda: f64, rng: &mut dyn Rng) -> u64 {
    match Poisson::new(lambda) {
        Ok(d) => d.sample(rng) as u64,
        Err(_) => 0,
    }
}

/// Exact binomial draw with `n` trials of probability `p`. `p` is clamped to `[0, 1]`; NaN
/// yields zero.
pub(crate) fn binomial(n: u64, p: f64, rng: &mut dyn Rng) -> u64 {
    if p.is_nan() {
        return 0;
    }
    match Binomial::new(n, p.clamp(0.0, 1.0)) {
        Ok(d) => d.sample(rng),
        Err(_) => 0,
    }
}

/// Fisher–Yates shuffle.
pub(crate) fn shuffle<T>(items: &mut [T], rng: &mut dyn Rng) {
    for i in (1..items.len()).rev() {
        let j = index(i + 1, rng);
        items.swap(i, j);
    }
}

/// Deterministic splitmix64 stream used to derive per-task seeds from one master seed.
#[derive(Debug, Clone)]
pub struct SeedSequence {
    state: u64,
}

impl SeedSequence {
    pub fn new(master: u64) -> Self {
        Self { state: master }
    }
}

impl Iterator for SeedSequence {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Some(z ^ (z >> 31))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::convert::Infallible;

    use rand::rngs::StdRng;
    use rand::{SeedableRng, TryRng};

    use super::*;

    pub(crate) struct FixedRng {
        pub(crate) value: u64,
    }

    impl TryRng for FixedRng {
        type Error = Infallible;

        fn try_next_u32(&mut self) -> Result<u32, Infallible> {
            Ok((self.value >> 32) as u32)
        }

        fn try_next_u64(&mut self) -> Result<u64, Infallible> {
            Ok(self.value)
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Infallible> {
            let bytes = self.value.to_le_bytes();
            for (i, b) in dest.iter_mut().enumerate() {
                *b = bytes[i % 8];
            }
            Ok(())
        }
    }

    #[test]
    fn rand01_bounds() {
        assert_eq!(rand01(&mut FixedRng { value: 0 }), 0.0);
        let top = rand01(&mut FixedRng { value: u64::MAX });
        assert!(top < 1.0);
        assert!(top > 0.999_999);
    }

    #[test]
    fn index_never_reaches_len() {
        let mut rng = FixedRng { value: u64::MAX };
        assert_eq!(index(5, &mut rng), 4);
    }

    fn mean_and_variance(xs: &[u64]) -> (f64, f64) {
        let n = xs.len() as f64;
        let mean = xs.iter().map(|&x| x as f64).sum::<f64>() / n;
        let var = xs.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn poisson_matches_its_moments() {
        let mut rng = StdRng::seed_from_u64(3);
        for lambda in [0.5, 4.0, 80.0, 5_000.0] {
            let xs: Vec<u64> = (0..20_000).map(|_| poisson(lambda, &mut rng)).collect();
            let (mean, var) = mean_and_variance(&xs);
            assert!((mean - lambda).abs() < 0.03 * lambda + 0.02, "{lambda}: {mean}");
            assert!((var - lambda).abs() < 0.08 * lambda + 0.05, "{lambda}: {var}");
        }
        assert_eq!(poisson(0.0, &mut rng), 0);
        assert_eq!(poisson(-1.0, &mut rng), 0);
        assert_eq!(poisson(f64::NAN, &mut rng), 0);
    }

    #[test]
    fn binomial_matches_its_moments() {
        let mut rng = StdRng::seed_from_u64(11);
        for (n, p) in [(10u64, 0.3), (1_000, 0.01), (100_000, 0.4)] {
            let xs: Vec<u64> = (0..4_000).map(|_| binomial(n, p, &mut rng)).collect();
            assert!(xs.iter().all(|&k| k <= n));
            let (mean, var) = mean_and_variance(&xs);
            let expected = n as f64 * p;
            let expected_var = expected * (1.0 - p);
            assert!((mean - expected).abs() < 0.03 * expected, "{n} {p}: {mean}");
            assert!((var - expected_var).abs() < 0.1 * expected_var, "{n} {p}: {var}");
        }
    }

    #[test]
    fn large_binomial_draws_are_whole_counts_near_the_mean() {
        let mut rng = StdRng::seed_from_u64(21);
        let xs: Vec<u64> = (0..200).map(|_| binomial(100_000, 0.4, &mut rng)).collect();
        // Every draw stays within ten standard deviations of n * p.
        assert!(xs.iter().all(|&k| k.abs_diff(40_000) < 1_550));
        let mut distinct = xs.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert!(distinct.len() > 50);
    }

    #[test]
    fn binomial_degenerate_probabilities() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(binomial(7, 0.0, &mut rng), 0);
        assert_eq!(binomial(7, -0.5, &mut rng), 0);
        assert_eq!(binomial(7, 1.0, &mut rng), 7);
        assert_eq!(binomial(7, 1.5, &mut rng), 7);
        assert_eq!(binomial(7, f64::NAN, &mut rng), 0);
        assert_eq!(binomial(0, 0.5, &mut rng), 0);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut v: Vec<u32> = (0..50).collect();
        shuffle(&mut v, &mut rng);
        let mut sorted = v.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(v, sorted);
    }

    #[test]
    fn seed_sequence_is_deterministic_and_distinct() {
        let a: Vec<u64> = SeedSequence::new(42).take(4).collect();
        let b: Vec<u64> = SeedSequence::new(42).take(4).collect();
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] != w[1]));
    }
}
