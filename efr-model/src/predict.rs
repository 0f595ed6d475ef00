//! Prediction stage: attach flood probability and flood type to every row.

use crate::error::{ModelError, Result};
use crate::xgboost::TreeEnsemble;
use crate::Classifier;
use efr_data::{FeatureMatrix, ScoredRow};
use log::info;
use std::path::Path;

/// The two classifiers a refresh needs.
#[derive(Debug, Clone)]
pub struct Models {
    pub flood: TreeEnsemble,
    pub flood_type: TreeEnsemble,
}

impl Models {
    /// Load both model files, checking that the flood model is binary.
    pub fn load(flood: impl AsRef<Path>, flood_type: impl AsRef<Path>) -> Result<Self> {
        let models = Self {
            flood: TreeEnsemble::load(flood.as_ref())?,
            flood_type: TreeEnsemble::load(flood_type.as_ref())?,
        };
        if models.flood.labels().len() != 2 {
            return Err(ModelError::NotBinary(models.flood.labels().len()));
        }
        info!(
            "Loaded flood model ({} trees, {} features) and flood type model ({} trees, {} classes)",
            models.flood.n_trees(),
            models.flood.feature_names().len(),
            models.flood_type.n_trees(),
            models.flood_type.labels().len()
        );
        Ok(models)
    }

    pub fn predict(&self, matrix: FeatureMatrix) -> Result<Vec<ScoredRow>> {
        predict(matrix, &self.flood, &self.flood_type)
    }
}

/// Probability as a whole percentage, 0 to 100. Halves round to even.
fn percent(p: f64) -> u8 {
    (p * 100.0).round_ties_even().clamp(0.0, 100.0) as u8
}

/// Score every row of `matrix` with both classifiers.
///
/// Each classifier sees the matrix columns it was trained on, in its own
/// order; a column it needs but the matrix lacks is an error. Row order is
/// kept.
pub fn predict(
    matrix: FeatureMatrix,
    flood: &impl Classifier,
    flood_type: &impl Classifier,
) -> Result<Vec<ScoredRow>> {
    let flood_proba = flood
        .predict_proba(&matrix.select(flood.feature_names())?)?
        .into_iter()
        .map(|proba| match proba.as_slice() {
            [_, positive] => Ok(percent(*positive)),
            other => Err(ModelError::NotBinary(other.len())),
        })
        .collect::<Result<Vec<_>>>()?;
    let flood_types = flood_type.predict(&matrix.select(flood_type.feature_names())?)?;

    Ok(matrix.score(flood_proba, flood_types)?)
}
