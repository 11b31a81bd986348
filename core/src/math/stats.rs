use ndarray::ArrayView1;

pub struct StatsHelper;

/// Least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Population mean and standard deviation (`ddof = 0`), `None` when empty.
    pub fn mean_std(values: ArrayView1<f64>) -> Option<(f64, f64)> {
        let mean = values.mean()?;
        Some((mean, values.std(0.0)))
    }

    /// First-degree least-squares fit.
    ///
    /// Returns `None` with fewer than two points or when every `x` is identical,
    /// since the slope is undefined there.
    pub fn linear_fit(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Option<LinearFit> {
        if x.len() != y.len() || x.len() < 2 {
            return None;
        }
        let x_mean = x.mean()?;
        let y_mean = y.mean()?;
        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (&xi, &yi) in x.iter().zip(y.iter()) {
            let dx = xi - x_mean;
            sxx += dx * dx;
            sxy += dx * (yi - y_mean);
        }
        if sxx <= f64::EPSILON * x_mean.abs().max(1.0) {
            return None;
        }
        let slope = sxy / sxx;
        Some(LinearFit {
            slope,
            intercept: y_mean - slope * x_mean,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(StatsHelper::mean(&[]), 0.0);
        assert_eq!(StatsHelper::mean(&[2.0, 4.0]), 3.0);
    }

    #[test]
    fn mean_std_uses_population_statistics() {
        let values = array![1.0, 3.0];
        let (mean, std) = StatsHelper::mean_std(values.view()).unwrap();
        assert_eq!(mean, 2.0);
        assert!((std - 1.0).abs() < 1e-12);
        assert!(StatsHelper::mean_std(Array1::<f64>::zeros(0).view()).is_none());
    }

    #[test]
    fn linear_fit_recovers_line() {
        let x = array![0.0, 1.0, 2.0, 3.0];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let fit = StatsHelper::linear_fit(x.view(), y.view()).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
    }

    #[test]
    fn linear_fit_rejects_underdetermined_input() {
        let single = array![1.0];
        assert!(StatsHelper::linear_fit(single.view(), single.view()).is_none());
        let flat_x = array![2.0, 2.0, 2.0];
        let y = array![1.0, 2.0, 3.0];
        assert!(StatsHelper::linear_fit(flat_x.view(), y.view()).is_none());
    }
}
