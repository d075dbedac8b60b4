//! Feature standardization
//!
//! Centers each feature column on its training mean and divides by its
//! population standard deviation. Columns with zero variance keep a scale
//! of 1 so they pass through centered but otherwise unchanged.

use crate::error::{HvacError, Result};
use crate::models::{FeatureVector, NUM_FEATURES};
use serde::{Deserialize, Serialize};

/// Fitted normalization parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub mean: [f64; NUM_FEATURES],
    pub scale: [f64; NUM_FEATURES],
    /// Number of rows the parameters were fitted on
    pub samples_seen: usize,
}

impl ScalerState {
    /// Fit per-column mean and standard deviation
    pub fn fit(rows: &[FeatureVector]) -> Result<Self> {
        if rows.is_empty() {
            return Err(HvacError::InvalidDataset(
                "cannot fit scaler on an empty dataset".to_string(),
            ));
        }
        let n = rows.len() as f64;

        let mut mean = [0.0; NUM_FEATURES];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row.0) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = [0.0; NUM_FEATURES];
        for row in rows {
            for ((v, x), m) in var.iter_mut().zip(row.0).zip(mean) {
                *v += (x - m).powi(2);
            }
        }

        let mut scale = [1.0; NUM_FEATURES];
        for (s, v) in scale.iter_mut().zip(var) {
            let std = (v / n).sqrt();
            if std.is_finite() && std > f64::EPSILON {
                *s = std;
            }
        }

        Ok(Self {
            mean,
            scale,
            samples_seen: rows.len(),
        })
    }

    /// Apply `(x - mean) / scale` per column
    pub fn transform(&self, features: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; NUM_FEATURES];
        for (i, o) in out.iter_mut().enumerate() {
            *o = (features.0[i] - self.mean[i]) / self.scale[i];
        }
        FeatureVector(out)
    }

    /// Every mean finite and every scale finite and non-zero
    pub fn validate(&self) -> std::result::Result<(), String> {
        for i in 0..NUM_FEATURES {
            if !self.mean[i].is_finite() {
                return Err(format!("non-finite mean for feature {}", i));
            }
            if !self.scale[i].is_finite() || self.scale[i] == 0.0 {
                return Err(format!("unusable scale for feature {}", i));
            }
        }
        Ok(())
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rows() -> Vec<FeatureVector> {
        vec![
            FeatureVector([20.0, 40.0, 400.0, 0.0]),
            FeatureVector([22.0, 50.0, 600.0, 1.0]),
            FeatureVector([24.0, 60.0, 800.0, 1.0]),
            FeatureVector([26.0, 50.0, 600.0, 0.0]),
        ]
    }

    #[test]
    fn test_fit_mean_and_scale() {
        let state = ScalerState::fit(&rows()).unwrap();
        assert_eq!(state.mean, [23.0, 50.0, 600.0, 0.5]);
        assert!((state.scale[0] - 5.0f64.sqrt()).abs() < 1e-12);
        assert!((state.scale[3] - 0.5).abs() < 1e-12);
        assert_eq!(state.samples_seen, 4);
    }

    #[test]
    fn test_transformed_columns_standardized() {
        let data = rows();
        let state = ScalerState::fit(&data).unwrap();
        let out = state.transform_all(&data);
        for col in 0..NUM_FEATURES {
            let mean: f64 = out.iter().map(|r| r.0[col]).sum::<f64>() / out.len() as f64;
            let var: f64 = out.iter().map(|r| (r.0[col] - mean).powi(2)).sum::<f64>() / out.len() as f64;
            assert!(mean.abs() < 1e-9);
            assert!((var - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_variance_column_scale_one() {
        let data = vec![
            FeatureVector([20.0, 40.0, 400.0, 0.0]),
            FeatureVector([22.0, 40.0, 400.0, 0.0]),
        ];
        let state = ScalerState::fit(&data).unwrap();
        assert_eq!(state.scale[1], 1.0);
        assert_eq!(state.scale[2], 1.0);
        assert_eq!(state.scale[3], 1.0);
        let out = state.transform(&FeatureVector([21.0, 45.0, 400.0, 1.0]));
        assert_eq!(out.0[1], 5.0);
        assert_eq!(out.0[3], 1.0);
    }

    #[test]
    fn test_empty_rows_rejected() {
        assert!(matches!(ScalerState::fit(&[]), Err(HvacError::InvalidDataset(_))));
    }

    #[test]
    fn test_serde_preserves_state() {
        let state = ScalerState::fit(&rows()).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: ScalerState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }

    proptest! {
        #[test]
        fn prop_transform_is_deterministic(
            data in prop::collection::vec(
                (0.0f64..40.0, 0.0f64..100.0, 300u32..2000, 0u8..=1),
                1..50,
            ),
            pick in any::<prop::sample::Index>(),
        ) {
            let rows: Vec<FeatureVector> = data
                .iter()
                .map(|(t, h, c, o)| FeatureVector([*t, *h, *c as f64, *o as f64]))
                .collect();
            let state = ScalerState::fit(&rows).unwrap();
            let row = rows[pick.index(rows.len())];
            let first = state.transform(&row);
            let second = state.transform(&row);
            prop_assert_eq!(first, second);
            prop_assert!(first.0.iter().all(|v| v.is_finite()));
        }
    }
}
