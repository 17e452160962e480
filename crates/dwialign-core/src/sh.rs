use ndarray::Array2;

/// Number of real even spherical-harmonic coefficients up to order `lmax`.
pub fn num_coefficients(lmax: usize) -> usize {
    (lmax + 1) * (lmax + 2) / 2
}

/// Largest even order whose basis is determined by `count` samples.
pub fn max_order_for(count: usize) -> usize {
    let mut lmax = 0;
    while num_coefficients(lmax + 2) <= count {
        lmax += 2;
    }
    lmax
}

/// Evaluate the real even spherical-harmonic basis for a set of unit
/// directions. Returns a (directions × coefficients) matrix with the usual
/// packing: coefficient `l(l+1)/2 + m` for even `l ≤ lmax`, `m ∈ [-l, l]`.
pub fn basis_matrix(directions: &[[f64; 3]], lmax: usize) -> Array2<f64> {
    let ncoef = num_coefficients(lmax);
    let mut basis = Array2::<f64>::zeros((directions.len(), ncoef));
    for (i, dir) in directions.iter().enumerate() {
        let row = evaluate(dir, lmax);
        for (j, v) in row.into_iter().enumerate() {
            basis[[i, j]] = v;
        }
    }
    basis
}

/// Evaluate the basis for a single unit direction.
pub fn evaluate(direction: &[f64; 3], lmax: usize) -> Vec<f64> {
    let cos_theta = direction[2].clamp(-1.0, 1.0);
    let phi = direction[1].atan2(direction[0]);
    let mut out = vec![0.0; num_coefficients(lmax)];

    for l in (0..=lmax).step_by(2) {
        let base = l * (l + 1) / 2;
        out[base] = normalisation(l, 0) * legendre(l, 0, cos_theta);
        for m in 1..=l {
            let plm = legendre(l, m, cos_theta);
            let n = std::f64::consts::SQRT_2 * normalisation(l, m) * plm;
            out[base + m] = n * (m as f64 * phi).cos();
            out[base - m] = n * (m as f64 * phi).sin();
        }
    }
    out
}

/// Weighted least-squares fit of SH coefficients to per-direction samples,
/// solved through the normal equations with a small ridge term.
///
/// Returns `None` when the system is singular (e.g. all weights zero).
pub fn fit_weighted(basis: &Array2<f64>, samples: &[f64], weights: &[f64]) -> Option<Vec<f64>> {
    let (n, ncoef) = basis.dim();
    debug_assert_eq!(n, samples.len());
    debug_assert_eq!(n, weights.len());

    let mut a = Array2::<f64>::zeros((ncoef, ncoef));
    let mut b = vec![0.0f64; ncoef];
    for i in 0..n {
        let w = weights[i];
        if w <= 0.0 {
            continue;
        }
        for j in 0..ncoef {
            let bj = basis[[i, j]];
            b[j] += w * bj * samples[i];
            for k in j..ncoef {
                a[[j, k]] += w * bj * basis[[i, k]];
            }
        }
    }
    let trace: f64 = (0..ncoef).map(|j| a[[j, j]]).sum();
    if trace <= 0.0 || !trace.is_finite() {
        return None;
    }
    let ridge = 1e-9 * trace;
    for j in 0..ncoef {
        a[[j, j]] += ridge;
        for k in 0..j {
            a[[j, k]] = a[[k, j]];
        }
    }
    cholesky_solve(a, b)
}

/// Solve a symmetric positive-definite system in place.
fn cholesky_solve(mut a: Array2<f64>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for j in 0..n {
        let mut d = a[[j, j]];
        for k in 0..j {
            d -= a[[j, k]] * a[[j, k]];
        }
        if d <= 0.0 || !d.is_finite() {
            return None;
        }
        let d = d.sqrt();
        a[[j, j]] = d;
        for i in (j + 1)..n {
            let mut s = a[[i, j]];
            for k in 0..j {
                s -= a[[i, k]] * a[[j, k]];
            }
            a[[i, j]] = s / d;
        }
    }
    // Forward then backward substitution.
    for i in 0..n {
        let mut s = b[i];
        for k in 0..i {
            s -= a[[i, k]] * b[k];
        }
        b[i] = s / a[[i, i]];
    }
    for i in (0..n).rev() {
        let mut s = b[i];
        for k in (i + 1)..n {
            s -= a[[k, i]] * b[k];
        }
        b[i] = s / a[[i, i]];
    }
    Some(b)
}

fn normalisation(l: usize, m: usize) -> f64 {
    let mut ratio = 1.0f64;
    // (l-m)! / (l+m)!
    for k in (l - m + 1)..=(l + m) {
        ratio /= k as f64;
    }
    ((2 * l + 1) as f64 / (4.0 * std::f64::consts::PI) * ratio).sqrt()
}

/// Associated Legendre polynomial P_l^m (no Condon-Shortley phase removal).
fn legendre(l: usize, m: usize, x: f64) -> f64 {
    let somx2 = ((1.0 - x) * (1.0 + x)).max(0.0).sqrt();
    let mut pmm = 1.0f64;
    for k in 1..=m {
        pmm *= -((2 * k - 1) as f64) * somx2;
    }
    if l == m {
        return pmm;
    }
    let mut pmmp1 = x * (2 * m + 1) as f64 * pmm;
    if l == m + 1 {
        return pmmp1;
    }
    let mut pll = 0.0;
    for ll in (m + 2)..=l {
        pll = (x * (2 * ll - 1) as f64 * pmmp1 - (ll + m - 1) as f64 * pmm) / (ll - m) as f64;
        pmm = pmmp1;
        pmmp1 = pll;
    }
    pll
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coefficient_counts() {
        assert_eq!(num_coefficients(0), 1);
        assert_eq!(num_coefficients(2), 6);
        assert_eq!(num_coefficients(4), 15);
    }

    #[test]
    fn order_zero_is_constant() {
        let a = evaluate(&[0.0, 0.0, 1.0], 0)[0];
        let b = evaluate(&[0.7071067811865476, 0.7071067811865476, 0.0], 0)[0];
        let expected = 1.0 / (4.0 * std::f64::consts::PI).sqrt();
        assert!((a - expected).abs() < 1e-12);
        assert!((b - expected).abs() < 1e-12);
    }

    #[test]
    fn fit_recovers_constant_signal() {
        let dirs = [
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [-0.5773502691896258, 0.5773502691896258, 0.5773502691896258],
        ];
        let basis = basis_matrix(&dirs, 0);
        let samples = vec![3.0; 4];
        let weights = vec![1.0; 4];
        let coef = fit_weighted(&basis, &samples, &weights).unwrap();
        // Reprojection reproduces the constant.
        let predicted = basis[[0, 0]] * coef[0];
        assert!((predicted - 3.0).abs() < 1e-6);
    }

    #[test]
    fn fit_with_zero_weights_is_singular() {
        let dirs = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let basis = basis_matrix(&dirs, 0);
        assert!(fit_weighted(&basis, &[1.0, 1.0], &[0.0, 0.0]).is_none());
    }
}
