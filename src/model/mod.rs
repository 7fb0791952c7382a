use std::fmt::{Display, Formatter};
use std::ops::{Add, Div, Mul, Sub};

use crate::util::Engineering;

pub mod stats;

/// A value with its standard error.
///
/// Arithmetic propagates errors to first order, treating operands as
/// independent.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub error: f64,
}

impl Measurement {
    pub fn new(value: f64, error: f64) -> Self {
        Measurement {
            value,
            error: error.abs(),
        }
    }

    pub fn exact(value: f64) -> Self {
        Measurement::new(value, 0.0)
    }

    /// Mean and standard error of the mean of repeated readings.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        Some(Measurement::new(
            stats::mean(samples)?,
            stats::standard_error(samples)?,
        ))
    }

    pub fn relative_error(&self) -> f64 {
        (self.error / self.value).abs()
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite() && self.error.is_finite()
    }
}

impl Add for Measurement {
    type Output = Measurement;

    fn add(self, rhs: Measurement) -> Measurement {
        Measurement::new(self.value + rhs.value, self.error.hypot(rhs.error))
    }
}

impl Sub for Measurement {
    type Output = Measurement;

    fn sub(self, rhs: Measurement) -> Measurement {
        Measurement::new(self.value - rhs.value, self.error.hypot(rhs.error))
    }
}

impl Mul for Measurement {
    type Output = Measurement;

    fn mul(self, rhs: Measurement) -> Measurement {
        Measurement::new(
            self.value * rhs.value,
            (rhs.value * self.error).hypot(self.value * rhs.error),
        )
    }
}

impl Div for Measurement {
    type Output = Measurement;

    fn div(self, rhs: Measurement) -> Measurement {
        let value = self.value / rhs.value;
        Measurement::new(
            value,
            (self.error / rhs.value).hypot(value * rhs.error / rhs.value),
        )
    }
}

impl Mul<f64> for Measurement {
    type Output = Measurement;

    fn mul(self, k: f64) -> Measurement {
        Measurement::new(self.value * k, self.error * k)
    }
}

impl Div<f64> for Measurement {
    type Output = Measurement;

    fn div(self, k: f64) -> Measurement {
        Measurement::new(self.value / k, self.error / k)
    }
}

impl Display for Measurement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ± {}", Engineering(self.value), Engineering(self.error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sum_and_difference_add_in_quadrature() {
        let a = Measurement::new(3.0, 0.3);
        let b = Measurement::new(1.0, 0.4);
        assert_abs_diff_eq!((a + b).value, 4.0);
        assert_abs_diff_eq!((a - b).value, 2.0);
        assert_abs_diff_eq!((a - b).error, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn product_error_follows_partial_derivatives() {
        let v = Measurement::new(2.0, 0.1);
        let i = Measurement::new(0.5, 0.02);
        let p = v * i;
        assert_abs_diff_eq!(p.value, 1.0);
        let expected = ((0.5f64 * 0.1).powi(2) + (2.0f64 * 0.02).powi(2)).sqrt();
        assert_abs_diff_eq!(p.error, expected, epsilon = 1e-12);
    }

    #[test]
    fn quotient_error_follows_partial_derivatives() {
        let v = Measurement::new(2.0, 0.1);
        let i = Measurement::new(0.5, 0.02);
        let r = v / i;
        assert_abs_diff_eq!(r.value, 4.0);
        let expected = ((0.1f64 / 0.5).powi(2) + (2.0f64 * 0.02 / 0.25).powi(2)).sqrt();
        assert_abs_diff_eq!(r.error, expected, epsilon = 1e-12);
    }

    #[test]
    fn scaling_scales_error() {
        let m = Measurement::new(0.47, 0.01) / 4.7;
        assert_abs_diff_eq!(m.value, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(m.error, 0.01 / 4.7, epsilon = 1e-12);
        assert_abs_diff_eq!((Measurement::new(1.0, 0.1) * -3.0).error, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn division_by_zero_current_is_not_finite() {
        let r = Measurement::new(1.0, 0.1) / Measurement::exact(0.0);
        assert!(!r.is_finite());
    }

    #[test]
    fn samples_give_mean_and_standard_error() {
        let m = Measurement::from_samples(&[1.0, 2.0, 3.0]).unwrap();
        assert_abs_diff_eq!(m.value, 2.0);
        assert_abs_diff_eq!(m.error, 1.0 / 3.0f64.sqrt(), epsilon = 1e-12);
        assert_eq!(Measurement::from_samples(&[]), None);
    }
}
