//! Bagged regression forest
//!
//! Each tree is grown on a bootstrap sample of the fit set, drawn from a
//! single seeded generator, so identical data and seed always produce an
//! identical forest.

use super::tree::{RegressionTree, TreeConfig};
use super::Regressor;
use crate::error::{HvacError, Result};
use crate::models::FeatureVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of trees
pub const DEFAULT_N_ESTIMATORS: usize = 100;

/// Default seed for bootstrap sampling and the holdout shuffle
pub const DEFAULT_SEED: u64 = 42;

/// Configuration for the forest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees in the ensemble
    pub n_estimators: usize,
    /// Seed for bootstrap sampling
    pub seed: u64,
    /// Per-tree growth limits
    pub tree: TreeConfig,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: DEFAULT_N_ESTIMATORS,
            seed: DEFAULT_SEED,
            tree: TreeConfig::default(),
        }
    }
}

/// Ensemble of regression trees averaged at prediction time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    /// Rows in the fit set
    samples_seen: usize,
}

impl RandomForestRegressor {
    /// Train the forest on normalized features and labels
    pub fn fit(x: &[FeatureVector], y: &[f64], config: ForestConfig) -> Result<Self> {
        if x.is_empty() {
            return Err(HvacError::InvalidDataset(
                "cannot train on an empty fit set".to_string(),
            ));
        }
        if config.n_estimators == 0 {
            return Err(HvacError::InvalidDataset(
                "forest needs at least one tree".to_string(),
            ));
        }

        let n = x.len();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut trees = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(RegressionTree::fit(x, y, bootstrap, &config.tree)?);
        }

        debug!(
            trees = trees.len(),
            samples = n,
            total_nodes = trees.iter().map(|t| t.node_count()).sum::<usize>(),
            "Forest trained"
        );

        Ok(Self {
            config,
            trees,
            samples_seen: n,
        })
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn samples_seen(&self) -> usize {
        self.samples_seen
    }

    /// Structural check for a forest read back from disk
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }
}

impl Regressor for RandomForestRegressor {
    fn predict(&self, features: &FeatureVector) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        sum / self.trees.len() as f64
    }
}
