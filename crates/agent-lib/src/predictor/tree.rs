//! Regression tree
//!
//! CART-style tree stored as a flat node array. Splits are chosen by
//! maximum reduction of squared error over every feature; thresholds sit
//! halfway between consecutive distinct feature values. Nodes are built
//! from an explicit work stack so deep trees cannot exhaust the call stack.

use crate::error::{HvacError, Result};
use crate::models::{FeatureVector, NUM_FEATURES};
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum depth, None for unlimited
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs before it may split
    pub min_samples_split: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

/// Tree node in array representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    Split {
        feature: u8,
        threshold: f64,
        left: u32,
        right: u32,
    },
    Leaf {
        value: f64,
        samples: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

struct Split {
    feature: usize,
    threshold: f64,
}

impl RegressionTree {
    /// Fit on the rows selected by `indices` (repeats allowed, as in bootstrap samples)
    pub fn fit(
        x: &[FeatureVector],
        y: &[f64],
        indices: Vec<usize>,
        config: &TreeConfig,
    ) -> Result<Self> {
        if x.len() != y.len() {
            return Err(HvacError::InvalidDataset(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        if indices.is_empty() {
            return Err(HvacError::InvalidDataset(
                "cannot fit a tree on zero samples".to_string(),
            ));
        }

        let mut nodes = vec![placeholder()];
        let mut work = vec![(0usize, indices, 0usize)];

        while let Some((slot, idx, depth)) = work.pop() {
            let can_split = idx.len() >= config.min_samples_split.max(2)
                && config.max_depth.map_or(true, |max| depth < max);

            let split = if can_split { best_split(x, y, &idx) } else { None };

            match split {
                Some(split) => {
                    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
                        .iter()
                        .partition(|&&i| x[i].0[split.feature] <= split.threshold);

                    let left = nodes.len();
                    nodes.push(placeholder());
                    let right = nodes.len();
                    nodes.push(placeholder());

                    nodes[slot] = TreeNode::Split {
                        feature: split.feature as u8,
                        threshold: split.threshold,
                        left: left as u32,
                        right: right as u32,
                    };
                    work.push((right, right_idx, depth + 1));
                    work.push((left, left_idx, depth + 1));
                }
                None => {
                    nodes[slot] = TreeNode::Leaf {
                        value: mean(y, &idx),
                        samples: idx.len() as u32,
                    };
                }
            }
        }

        Ok(Self { nodes })
    }

    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let mut node = &self.nodes[0];
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let next = if features.0[*feature as usize] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                    node = &self.nodes[next as usize];
                }
            }
        }
    }

    /// Check the node array is a well-formed tree rooted at index 0
    ///
    /// Children always sit after their parent, which rules out cycles, and
    /// every index and feature must be in range.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                if *feature as usize >= NUM_FEATURES {
                    return Err(format!("node {} splits on unknown feature {}", i, feature));
                }
                if threshold.is_nan() {
                    return Err(format!("node {} has a NaN threshold", i));
                }
                for child in [*left as usize, *right as usize] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(format!("node {} has invalid child index {}", i, child));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((i, d)) = stack.pop() {
            max_depth = max_depth.max(d);
            if let TreeNode::Split { left, right, .. } = &self.nodes[i] {
                stack.push((*left as usize, d + 1));
                stack.push((*right as usize, d + 1));
            }
        }
        max_depth
    }
}

fn placeholder() -> TreeNode {
    TreeNode::Leaf {
        value: 0.0,
        samples: 0,
    }
}

fn mean(y: &[f64], idx: &[usize]) -> f64 {
    idx.iter().map(|&i| y[i]).sum::<f64>() / idx.len() as f64
}

/// Find the split with the largest squared-error reduction
///
/// Maximizing `S_l^2 / n_l + S_r^2 / n_r` is equivalent to minimizing the
/// children's summed squared error.
fn best_split(x: &[FeatureVector], y: &[f64], idx: &[usize]) -> Option<Split> {
    let n = idx.len() as f64;
    let total: f64 = idx.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n;

    let mut best: Option<(f64, Split)> = None;
    let mut order = idx.to_vec();

    for feature in 0..NUM_FEATURES {
        order.sort_by(|&a, &b| {
            x[a].0[feature]
                .partial_cmp(&x[b].0[feature])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        for pos in 0..order.len() - 1 {
            left_sum += y[order[pos]];
            let here = x[order[pos]].0[feature];
            let next = x[order[pos + 1]].0[feature];
            if next <= here {
                continue;
            }

            let n_left = (pos + 1) as f64;
            let n_right = n - n_left;
            let right_sum = total - left_sum;
            let score = left_sum * left_sum / n_left + right_sum * right_sum / n_right;

            let improves = score - parent_score > 1e-12 * parent_score.abs().max(1.0);
            let beats_best = best.as_ref().map_or(true, |(s, _)| score > *s);
            if improves && beats_best {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some((score, Split { feature, threshold }));
            }
        }
    }

    best.map(|(_, split)| split)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<FeatureVector>, Vec<f64>) {
        let x: Vec<FeatureVector> = (0..10)
            .map(|i| FeatureVector([i as f64, 50.0, 400.0, 0.0]))
            .collect();
        let y: Vec<f64> = (0..10).map(|i| if i < 5 { 20.0 } else { 24.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_learns_step_function() {
        let (x, y) = step_data();
        let tree = RegressionTree::fit(&x, &y, (0..10).collect(), &TreeConfig::default()).unwrap();

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.predict(&FeatureVector([2.0, 50.0, 400.0, 0.0])), 20.0);
        assert_eq!(tree.predict(&FeatureVector([7.0, 50.0, 400.0, 0.0])), 24.0);
        // threshold sits between 4 and 5
        assert_eq!(tree.predict(&FeatureVector([4.4, 50.0, 400.0, 0.0])), 20.0);
        assert_eq!(tree.predict(&FeatureVector([4.6, 50.0, 400.0, 0.0])), 24.0);
    }

    #[test]
    fn test_fits_training_data_exactly_when_unlimited() {
        let x: Vec<FeatureVector> = (0..20)
            .map(|i| FeatureVector([i as f64, (i * 7 % 13) as f64, 400.0 + i as f64, (i % 2) as f64]))
            .collect();
        let y: Vec<f64> = (0..20).map(|i| 18.0 + (i * 3 % 7) as f64).collect();
        let tree = RegressionTree::fit(&x, &y, (0..20).collect(), &TreeConfig::default()).unwrap();
        for (row, label) in x.iter().zip(&y) {
            assert_eq!(tree.predict(row), *label);
        }
    }

    #[test]
    fn test_max_depth_respected() {
        let x: Vec<FeatureVector> = (0..32).map(|i| FeatureVector([i as f64, 0.0, 0.0, 0.0])).collect();
        let y: Vec<f64> = (0..32).map(|i| i as f64).collect();
        let config = TreeConfig {
            max_depth: Some(3),
            ..Default::default()
        };
        let tree = RegressionTree::fit(&x, &y, (0..32).collect(), &config).unwrap();
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn test_constant_labels_single_leaf() {
        let (x, _) = step_data();
        let y = vec![21.0; 10];
        let tree = RegressionTree::fit(&x, &y, (0..10).collect(), &TreeConfig::default()).unwrap();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict(&x[3]), 21.0);
    }

    #[test]
    fn test_repeated_indices_weight_rows() {
        let x = vec![FeatureVector([0.0; 4]), FeatureVector([0.0; 4])];
        let y = vec![10.0, 20.0];
        let tree = RegressionTree::fit(&x, &y, vec![0, 0, 0, 1], &TreeConfig::default()).unwrap();
        assert_eq!(tree.predict(&x[0]), 12.5);
    }

    #[test]
    fn test_empty_indices_rejected() {
        let (x, y) = step_data();
        assert!(RegressionTree::fit(&x, &y, vec![], &TreeConfig::default()).is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_trees() {
        let empty: RegressionTree = serde_json::from_str(r#"{"nodes":[]}"#).unwrap();
        assert!(empty.validate().is_err());

        let self_loop: RegressionTree = serde_json::from_str(
            r#"{"nodes":[{"type":"split","feature":0,"threshold":1.0,"left":0,"right":1},
                         {"type":"leaf","value":20.0,"samples":1}]}"#,
        )
        .unwrap();
        assert!(self_loop.validate().is_err());

        let out_of_range: RegressionTree = serde_json::from_str(
            r#"{"nodes":[{"type":"split","feature":0,"threshold":1.0,"left":1,"right":7},
                         {"type":"leaf","value":20.0,"samples":1}]}"#,
        )
        .unwrap();
        assert!(out_of_range.validate().is_err());

        let bad_feature: RegressionTree = serde_json::from_str(
            r#"{"nodes":[{"type":"split","feature":9,"threshold":1.0,"left":1,"right":2},
                         {"type":"leaf","value":20.0,"samples":1},
                         {"type":"leaf","value":21.0,"samples":1}]}"#,
        )
        .unwrap();
        assert!(bad_feature.validate().is_err());
    }
}
