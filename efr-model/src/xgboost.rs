//! Gradient-boosted tree ensembles saved in XGBoost's JSON model format.
//!
//! Only the parts needed for inference are read: the feature names, the
//! objective, `base_score`, the number of classes and the `gbtree` trees.
//! Each tree is stored as parallel node arrays; a node with a left child of
//! `-1` is a leaf whose value sits in `split_conditions`.
//!
//! An optional top-level `classes` array names the class labels in class
//! index order. Without it the labels are the class indices themselves.

use crate::error::{ModelError, Result};
use crate::Classifier;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// One margin per row, squashed with the logistic function
    BinaryLogistic,
    /// One margin per class per row, normalised with softmax
    MultiSoftmax,
}

impl Objective {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "binary:logistic" => Ok(Objective::BinaryLogistic),
            "multi:softprob" | "multi:softmax" => Ok(Objective::MultiSoftmax),
            other => Err(ModelError::UnsupportedObjective(other.to_string())),
        }
    }
}

#[derive(Deserialize)]
struct ModelFile {
    learner: LearnerFile,
    #[serde(default)]
    classes: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct LearnerFile {
    #[serde(default)]
    feature_names: Vec<String>,
    learner_model_param: LearnerParam,
    objective: ObjectiveFile,
    gradient_booster: BoosterFile,
}

#[derive(Deserialize)]
struct LearnerParam {
    #[serde(default)]
    base_score: Option<String>,
    #[serde(default)]
    num_class: Option<String>,
    #[serde(default)]
    num_feature: Option<String>,
}

#[derive(Deserialize)]
struct ObjectiveFile {
    name: String,
}

#[derive(Deserialize)]
struct BoosterFile {
    name: String,
    #[serde(default)]
    model: Option<GbTreeFile>,
}

#[derive(Deserialize)]
struct GbTreeFile {
    trees: Vec<TreeFile>,
    #[serde(default)]
    tree_info: Vec<usize>,
}

#[derive(Deserialize)]
struct TreeFile {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<usize>,
    split_conditions: Vec<f64>,
    default_left: Vec<Value>,
}

/// A single regression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    left: Vec<i64>,
    right: Vec<i64>,
    feature: Vec<usize>,
    /// Split thresholds, or leaf values at leaves, as XGBoost keeps them
    condition: Vec<f32>,
    default_left: Vec<bool>,
}

impl Tree {
    fn from_file(file: TreeFile, index: usize, num_features: usize) -> Result<Self> {
        let nodes = file.left_children.len();
        let invalid = |what: &str| ModelError::Invalid(format!("tree {index}: {what}"));

        if nodes == 0 {
            return Err(invalid("no nodes"));
        }
        if [
            file.right_children.len(),
            file.split_indices.len(),
            file.split_conditions.len(),
            file.default_left.len(),
        ]
        .iter()
        .any(|&len| len != nodes)
        {
            return Err(invalid("node arrays differ in length"));
        }

        for node in 0..nodes {
            let (left, right) = (file.left_children[node], file.right_children[node]);
            if left == -1 {
                continue;
            }
            // Children always come after their parent, which rules out cycles.
            let in_range = |child: i64| child > node as i64 && (child as usize) < nodes;
            if !in_range(left) || !in_range(right) {
                return Err(invalid(&format!("node {node} has out-of-range children")));
            }
            if num_features > 0 && file.split_indices[node] >= num_features {
                return Err(invalid(&format!(
                    "node {node} splits on feature {} of {num_features}",
                    file.split_indices[node]
                )));
            }
        }

        let default_left = file
            .default_left
            .iter()
            .map(|v| match v {
                Value::Bool(b) => Ok(*b),
                Value::Number(n) => Ok(n.as_i64() != Some(0)),
                _ => Err(invalid("default_left must be boolean or integer")),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            left: file.left_children,
            right: file.right_children,
            feature: file.split_indices,
            condition: file.split_conditions.iter().map(|&c| c as f32).collect(),
            default_left,
        })
    }

    /// Leaf value reached by `row`. Missing or NaN features follow the
    /// node's default direction.
    ///
    /// Features are compared in single precision, like XGBoost's own
    /// predictor, so values within f32 rounding of a threshold take the
    /// same branch they took in training.
    pub fn leaf_value(&self, row: &[Option<f64>]) -> f32 {
        let mut node = 0;
        while self.left[node] != -1 {
            let go_left = match row.get(self.feature[node]).copied().flatten() {
                Some(x) if !x.is_nan() => (x as f32) < self.condition[node],
                _ => self.default_left[node],
            };
            let next = if go_left { self.left[node] } else { self.right[node] };
            node = next as usize;
        }
        self.condition[node]
    }
}

/// A boosted ensemble with its feature contract and class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsemble {
    feature_names: Vec<String>,
    labels: Vec<String>,
    objective: Objective,
    base_margin: Vec<f32>,
    trees: Vec<Tree>,
    tree_class: Vec<usize>,
}

fn parse_base_score(raw: Option<&str>, n: usize) -> Result<Vec<f64>> {
    let Some(raw) = raw else {
        return Ok(vec![0.5; n]);
    };
    let values = raw
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| ModelError::Invalid(format!("bad base_score {raw:?}")))
        })
        .collect::<Result<Vec<_>>>()?;
    match values.len() {
        1 => Ok(vec![values[0]; n]),
        len if len == n => Ok(values),
        len => Err(ModelError::Invalid(format!(
            "base_score has {len} values for {n} classes"
        ))),
    }
}

fn parse_count(raw: Option<&str>, field: &str) -> Result<usize> {
    raw.map(|v| {
        v.trim()
            .parse::<usize>()
            .map_err(|_| ModelError::Invalid(format!("bad {field} {v:?}")))
    })
    .transpose()
    .map(|n| n.unwrap_or(0))
}

fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = margins.iter().map(|m| (m - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

impl TreeEnsemble {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: ModelFile = serde_json::from_str(json)?;
        let learner = file.learner;
        let objective = Objective::parse(&learner.objective.name)?;

        if learner.gradient_booster.name != "gbtree" {
            return Err(ModelError::Invalid(format!(
                "unsupported booster {:?}",
                learner.gradient_booster.name
            )));
        }
        let booster = learner
            .gradient_booster
            .model
            .ok_or_else(|| ModelError::Invalid("booster has no model".into()))?;

        let param = &learner.learner_model_param;
        let num_class = match objective {
            Objective::BinaryLogistic => 2,
            Objective::MultiSoftmax => parse_count(param.num_class.as_deref(), "num_class")?,
        };
        if num_class < 2 {
            return Err(ModelError::Invalid(format!("num_class {num_class}")));
        }
        let num_features = parse_count(param.num_feature.as_deref(), "num_feature")?;
        if learner.feature_names.is_empty() {
            return Err(ModelError::Invalid("model has no feature names".into()));
        }
        if num_features > 0 && learner.feature_names.len() != num_features {
            return Err(ModelError::Invalid(format!(
                "{} feature names for {num_features} features",
                learner.feature_names.len()
            )));
        }

        let outputs = match objective {
            Objective::BinaryLogistic => 1,
            Objective::MultiSoftmax => num_class,
        };
        let base_score = parse_base_score(param.base_score.as_deref(), outputs)?;
        let base_margin = match objective {
            Objective::BinaryLogistic => base_score.iter().map(|p| logit(*p) as f32).collect(),
            Objective::MultiSoftmax => base_score.iter().map(|&m| m as f32).collect(),
        };

        let tree_class = if booster.tree_info.is_empty() {
            vec![0; booster.trees.len()]
        } else {
            booster.tree_info
        };
        if tree_class.len() != booster.trees.len() || tree_class.iter().any(|&c| c >= outputs) {
            return Err(ModelError::Invalid("tree_info does not match trees".into()));
        }

        let trees = booster
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, tree)| Tree::from_file(tree, i, learner.feature_names.len()))
            .collect::<Result<Vec<_>>>()?;

        let labels = match file.classes {
            Some(classes) if classes.len() == num_class => classes.iter().map(label).collect(),
            Some(classes) => {
                return Err(ModelError::Invalid(format!(
                    "{} class labels for {num_class} classes",
                    classes.len()
                )))
            }
            None => (0..num_class).map(|c| c.to_string()).collect(),
        };

        Ok(Self {
            feature_names: learner.feature_names,
            labels,
            objective,
            base_margin,
            trees,
            tree_class,
        })
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Raw margins for one row, one per output, summed in f32.
    fn margins(&self, row: &[Option<f64>]) -> Vec<f64> {
        let mut margins = self.base_margin.clone();
        for (tree, &class) in self.trees.iter().zip(&self.tree_class) {
            margins[class] += tree.leaf_value(row);
        }
        margins.into_iter().map(f64::from).collect()
    }
}

impl Classifier for TreeEnsemble {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict_proba(&self, rows: &[Vec<Option<f64>>]) -> Result<Vec<Vec<f64>>> {
        let expected = self.feature_names.len();
        rows.iter()
            .map(|row| {
                if row.len() != expected {
                    return Err(ModelError::FeatureCount {
                        expected,
                        found: row.len(),
                    });
                }
                let margins = self.margins(row);
                Ok(match self.objective {
                    Objective::BinaryLogistic => {
                        let p = sigmoid(margins[0]);
                        vec![1.0 - p, p]
                    }
                    Objective::MultiSoftmax => softmax(&margins),
                })
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One split on `x` at 1.0: below gives p=0.5, above gives p=0.8.
    pub(crate) const BINARY: &str = r#"{
        "learner": {
            "feature_names": ["x", "y"],
            "feature_types": ["float", "float"],
            "learner_model_param": {"base_score": "5E-1", "num_class": "0", "num_feature": "2"},
            "objective": {"name": "binary:logistic", "reg_loss_param": {"scale_pos_weight": "1"}},
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "gbtree_model_param": {"num_trees": "1"},
                    "tree_info": [0],
                    "trees": [{
                        "left_children": [1, -1, -1],
                        "right_children": [2, -1, -1],
                        "split_indices": [0, 0, 0],
                        "split_conditions": [1.0, 0.0, 1.3862943611198906],
                        "default_left": [0, 0, 0]
                    }]
                }
            }
        },
        "version": [2, 1, 0]
    }"#;

    /// Three classes; only the `flash` tree splits, on `x` at 5.0.
    pub(crate) const MULTICLASS: &str = r#"{
        "learner": {
            "feature_names": ["x"],
            "learner_model_param": {"base_score": "[5E-1,5E-1,5E-1]", "num_class": "3", "num_feature": "1"},
            "objective": {"name": "multi:softprob"},
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "tree_info": [0, 1, 2],
                    "trees": [
                        {"left_children": [-1], "right_children": [-1], "split_indices": [0],
                         "split_conditions": [0.0], "default_left": [false]},
                        {"left_children": [1, -1, -1], "right_children": [2, -1, -1],
                         "split_indices": [0, 0, 0], "split_conditions": [5.0, 2.0, -1.0],
                         "default_left": [true, false, false]},
                        {"left_children": [-1], "right_children": [-1], "split_indices": [0],
                         "split_conditions": [0.0], "default_left": [false]}
                    ]
                }
            }
        },
        "classes": ["coastal", "flash", "river"]
    }"#;

    #[test]
    fn test_binary_logistic_probabilities() {
        let model = TreeEnsemble::from_json(BINARY).unwrap();
        assert_eq!(model.objective(), Objective::BinaryLogistic);
        assert_eq!(model.feature_names(), ["x", "y"]);
        assert_eq!(model.labels(), ["0", "1"]);

        let proba = model
            .predict_proba(&[vec![Some(0.5), None], vec![Some(2.0), Some(9.0)]])
            .unwrap();
        assert!((proba[0][1] - 0.5).abs() < 1e-6);
        assert!((proba[1][1] - 0.8).abs() < 1e-6);
        assert!((proba[1][0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_missing_values_follow_default_direction() {
        let model = TreeEnsemble::from_json(BINARY).unwrap();
        // default_left is 0 at the root, so a missing x goes right.
        let proba = model.predict_proba(&[vec![None, None]]).unwrap();
        assert!((proba[0][1] - 0.8).abs() < 1e-6);
        let proba = model.predict_proba(&[vec![Some(f64::NAN), None]]).unwrap();
        assert!((proba[0][1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_split_threshold_is_strict() {
        let model = TreeEnsemble::from_json(BINARY).unwrap();
        let proba = model.predict_proba(&[vec![Some(1.0), None]]).unwrap();
        assert!((proba[0][1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_thresholds_compare_in_single_precision() {
        // 0.39999999999999997 is below 0.4 in f64 but rounds to the same f32.
        let json = BINARY.replace(
            "[1.0, 0.0, 1.3862943611198906]",
            "[4E-1, 0.0, 1.3862943611198906]",
        );
        let model = TreeEnsemble::from_json(&json).unwrap();
        let x = efr_data::stats::mean(&[Some(0.1), Some(0.7)]).unwrap();
        assert!(x < 0.4);
        let proba = model.predict_proba(&[vec![Some(x), None]]).unwrap();
        assert!((proba[0][1] - 0.8).abs() < 1e-6);
        let proba = model.predict_proba(&[vec![Some(0.39), None]]).unwrap();
        assert!((proba[0][1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_multiclass_labels_and_argmax() {
        let model = TreeEnsemble::from_json(MULTICLASS).unwrap();
        assert_eq!(model.n_trees(), 3);
        assert_eq!(model.labels(), ["coastal", "flash", "river"]);

        let rows = vec![vec![Some(1.0)], vec![Some(10.0)], vec![None]];
        let proba = model.predict_proba(&rows).unwrap();
        assert!((proba[0].iter().sum::<f64>() - 1.0).abs() < 1e-6);
        // Above the split, coastal and river tie; the first class wins.
        assert_eq!(model.predict(&rows).unwrap(), ["flash", "coastal", "flash"]);
    }

    #[test]
    fn test_row_width_must_match_features() {
        let model = TreeEnsemble::from_json(BINARY).unwrap();
        assert!(matches!(
            model.predict_proba(&[vec![Some(1.0)]]),
            Err(ModelError::FeatureCount { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_rejects_unsupported_objective() {
        let json = BINARY.replace("binary:logistic", "reg:squarederror");
        assert!(matches!(
            TreeEnsemble::from_json(&json),
            Err(ModelError::UnsupportedObjective(name)) if name == "reg:squarederror"
        ));
    }

    #[test]
    fn test_rejects_dangling_children() {
        let json = BINARY.replace(
            r#""right_children": [2, -1, -1]"#,
            r#""right_children": [7, -1, -1]"#,
        );
        assert!(matches!(TreeEnsemble::from_json(&json), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn test_rejects_label_count_mismatch() {
        let json = MULTICLASS.replace(r#"["coastal", "flash", "river"]"#, r#"["coastal"]"#);
        assert!(matches!(TreeEnsemble::from_json(&json), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn test_load_reports_path() {
        let err = TreeEnsemble::load("/nonexistent/model.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/model.json"));
    }
}
