//! Flood classifiers and the prediction stage.
//!
//! Two classifiers score every row of a batch's feature matrix: a binary
//! model giving the probability of flooding and a multiclass model giving
//! the most likely flood type. Both are XGBoost tree ensembles loaded from
//! their JSON model files; each carries the ordered list of feature names
//! it was trained on, and rows are fed to it in exactly that column order.

pub mod error;
pub mod predict;
pub mod xgboost;

pub use error::{ModelError, Result};
pub use predict::{predict, Models};
pub use xgboost::{Objective, TreeEnsemble};

/// A trained classifier with a fixed feature contract.
pub trait Classifier {
    /// Feature columns, in the order rows must present them.
    fn feature_names(&self) -> &[String];

    /// Class labels, in class index order.
    fn labels(&self) -> &[String];

    /// Class probabilities per row, in label order.
    fn predict_proba(&self, rows: &[Vec<Option<f64>>]) -> Result<Vec<Vec<f64>>>;

    /// Most probable label per row; ties go to the lowest class index.
    fn predict(&self, rows: &[Vec<Option<f64>>]) -> Result<Vec<String>> {
        let labels = self.labels();
        self.predict_proba(rows)?
            .iter()
            .map(|proba| {
                let best = proba
                    .iter()
                    .enumerate()
                    .fold(None, |best: Option<(usize, f64)>, (i, &p)| match best {
                        Some((_, top)) if top >= p => best,
                        _ => Some((i, p)),
                    })
                    .map(|(i, _)| i)
                    .ok_or_else(|| ModelError::Invalid("classifier returned no classes".into()))?;
                labels.get(best).cloned().ok_or_else(|| {
                    ModelError::Invalid(format!("class {best} has no label"))
                })
            })
            .collect()
    }
}
