use rand_distr::LogNormal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Seed offset for all random generators, set by the runner once per iteration
pub static RAND_SEED: AtomicU64 = AtomicU64::new(0);

/// Combine a per-purpose salt with the current iteration seed
pub fn get_seed(salt: u64) -> u64 {
    salt.wrapping_add(RAND_SEED.load(Ordering::Relaxed).wrapping_mul(1_000_003))
}

/// Convert mean and standard deviation to log-normal distribution parameters
/// Returns (μ, σ) for LogNormal(μ, σ):
/// - σ = sqrt(ln(1 + s²/m²))
/// - μ = ln(m) - σ²/2
fn lognormal_from_mean_stddev(mean: f64, stddev: f64) -> (f64, f64) {
    let variance = stddev * stddev;
    let sigma_squared = (1.0 + variance / (mean * mean)).ln();
    let sigma = sigma_squared.sqrt();
    let mu = mean.ln() - sigma_squared / 2.0;
    (mu, sigma)
}

/// Create a log-normal distribution from mean and standard deviation
/// Panics if mean is not positive
pub fn lognormal_dist(mean: f64, stddev: f64) -> LogNormal<f64> {
    assert!(mean > 0.0, "log-normal mean must be positive, got {}", mean);
    let (mu, sigma) = lognormal_from_mean_stddev(mean, stddev);
    LogNormal::new(mu, sigma).expect("sigma derived from mean/stddev is always finite and non-negative")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::Distribution;

    #[test]
    fn test_lognormal_dist_mean() {
        let dist = lognormal_dist(10.0, 3.0);
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20000;
        let mean = (0..n).map(|_| dist.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 10.0).abs() < 0.2, "sample mean {}", mean);
    }

    #[test]
    fn test_get_seed_depends_on_salt() {
        assert_ne!(get_seed(1), get_seed(2));
    }
}
