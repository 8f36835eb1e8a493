//! Gaussian-process surrogate used by the Bayesian optimizer.
//!
//! Inputs are normalized to `[0, 1]^d` and outputs standardized before
//! fitting. The kernel is Matérn 5/2 with ARD lengthscales set to the
//! per-dimension standard deviation of the training inputs. Fitting is a
//! Cholesky factorization of `K + alpha * I`.

use nalgebra::{DMatrix, DVector, Dyn, linalg::Cholesky};

/// Maximum number of training points used per fit.
/// Caps the cost at O(`MAX_TRAIN_POINTS`^3) per suggestion.
pub(crate) const MAX_TRAIN_POINTS: usize = 100;

/// √5.
const SQRT_5: f64 = 2.236_067_977_499_79;

/// Floor for ARD lengthscales.
const MIN_LENGTHSCALE: f64 = 0.01;

/// A fitted GP, ready for predictions in standardized output units.
pub(crate) struct GaussianProcess {
    cholesky: Cholesky<f64, Dyn>,
    weights: DVector<f64>,
    x_train: Vec<Vec<f64>>,
    lengthscales: Vec<f64>,
    y_best: f64,
}

impl GaussianProcess {
    /// Fits a GP to normalized inputs and raw outputs.
    ///
    /// Returns `None` for empty data or when the kernel matrix is not
    /// positive definite.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn fit(x_train: &[Vec<f64>], y_train: &[f64], alpha: f64) -> Option<Self> {
        let n = y_train.len();
        if n == 0 || x_train.len() != n {
            return None;
        }

        let y_mean = y_train.iter().sum::<f64>() / n as f64;
        let y_var = if n > 1 {
            y_train.iter().map(|&y| (y - y_mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            1.0
        };
        let y_std = y_var.sqrt().max(1e-10);
        let y: Vec<f64> = y_train.iter().map(|&y| (y - y_mean) / y_std).collect();
        let y_best = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let d = x_train[0].len();
        let lengthscales: Vec<f64> = (0..d)
            .map(|j| {
                let mean = x_train.iter().map(|x| x[j]).sum::<f64>() / n as f64;
                let var = x_train.iter().map(|x| (x[j] - mean).powi(2)).sum::<f64>() / n as f64;
                var.sqrt().max(MIN_LENGTHSCALE)
            })
            .collect();

        let k = DMatrix::from_fn(n, n, |i, j| {
            let k = matern52(&x_train[i], &x_train[j], &lengthscales);
            if i == j { k + alpha } else { k }
        });
        let cholesky = Cholesky::new(k)?;
        let weights = cholesky.solve(&DVector::from_column_slice(&y));

        Some(Self {
            cholesky,
            weights,
            x_train: x_train.to_vec(),
            lengthscales,
            y_best,
        })
    }

    /// Posterior mean and standard deviation at `x`.
    pub(crate) fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_fn(self.x_train.len(), |i, _| {
            matern52(x, &self.x_train[i], &self.lengthscales)
        });
        let mean = k_star.dot(&self.weights);
        let v = self.cholesky.solve(&k_star);
        // Unit signal variance: outputs are standardized.
        let var = (1.0 - k_star.dot(&v)).max(0.0);
        (mean, var.sqrt())
    }

    /// Best standardized training output.
    pub(crate) fn y_best(&self) -> f64 {
        self.y_best
    }
}

/// `k(a, b) = (1 + √5 r + 5/3 r²) exp(-√5 r)` with `r` the ARD-scaled distance.
fn matern52(a: &[f64], b: &[f64], lengthscales: &[f64]) -> f64 {
    let r_sq: f64 = a
        .iter()
        .zip(b)
        .zip(lengthscales)
        .map(|((x, y), l)| ((x - y) / l).powi(2))
        .sum();
    let sqrt5_r = SQRT_5 * r_sq.sqrt();
    (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

/// Standard normal PDF.
pub(crate) fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF (Hart rational approximation).
pub(crate) fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let poly = t
        * (0.319_381_530
            + t * (-0.356_563_782 + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    let upper = norm_pdf(x.abs()) * poly;

    if x >= 0.0 { 1.0 - upper } else { upper }
}

/// Maps `value` from `[lo, hi]` into `[0, 1]`.
pub(crate) fn to_normalized(value: f64, lo: f64, hi: f64) -> f64 {
    if (hi - lo).abs() < 1e-15 {
        0.5
    } else {
        (value - lo) / (hi - lo)
    }
}

/// Maps `value` from `[0, 1]` back into `[lo, hi]`.
pub(crate) fn from_normalized(value: f64, lo: f64, hi: f64) -> f64 {
    (lo + value * (hi - lo)).clamp(lo, hi)
}
