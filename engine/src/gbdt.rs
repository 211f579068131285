//! Gradient-boosted regression trees for binary classification (log-loss).
//!
//! Stage `m` fits a depth-limited tree to the residuals `y - sigmoid(F)` and
//! replaces every leaf with a single Newton step `sum(r) / sum(p(1-p))`.
//! Training uses every row at every stage, so fitting is deterministic.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const MIN_IMPURITY: f64 = 1e-12;
const MIN_HESSIAN: f64 = 1e-150;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split { feature, threshold, left, right } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Checks the links `predict` follows: children come after their parent
    /// and stay in range, split features fit the input width.
    pub fn validate(&self, n_features: usize) -> Result<(), AppError> {
        if self.nodes.is_empty() {
            return Err(AppError::Artifact("tree has no nodes".to_string()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split { feature, left, right, .. } = node {
                if *feature >= n_features {
                    return Err(AppError::Artifact(format!(
                        "node {} splits on feature {} of {}",
                        idx, feature, n_features
                    )));
                }
                for child in [*left, *right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(AppError::Artifact(format!(
                            "node {} links to invalid child {}",
                            idx, child
                        )));
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
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    residuals: &'a [f64],
    hessians: &'a [f64],
    params: &'a BoostingParams,
    n_features: usize,
    nodes: Vec<Node>,
}

struct SplitCandidate {
    gain: f64,
    feature: usize,
    threshold: f64,
}

impl<'a> TreeBuilder<'a> {
    fn build(mut self, indices: Vec<usize>) -> RegressionTree {
        self.grow(indices, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        if depth < self.params.max_depth
            && indices.len() >= self.params.min_samples_split
            && self.impurity(&indices) > MIN_IMPURITY
        {
            if let Some(split) = self.best_split(&indices) {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
                    .into_iter()
                    .partition(|&i| self.rows[i][split.feature] <= split.threshold);
                let left = self.grow(left_rows, depth + 1);
                let right = self.grow(right_rows, depth + 1);
                self.nodes[id] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
                return id;
            }
        }

        self.nodes[id] = Node::Leaf { value: self.leaf_value(&indices) };
        id
    }

    /// Sum of squared deviations of the residuals from their mean.
    fn impurity(&self, indices: &[usize]) -> f64 {
        let sum: f64 = indices.iter().map(|&i| self.residuals[i]).sum();
        let sum_sq: f64 = indices.iter().map(|&i| self.residuals[i] * self.residuals[i]).sum();
        sum_sq - sum * sum / indices.len() as f64
    }

    fn leaf_value(&self, indices: &[usize]) -> f64 {
        let numerator: f64 = indices.iter().map(|&i| self.residuals[i]).sum();
        let denominator: f64 = indices.iter().map(|&i| self.hessians[i]).sum();
        if denominator.abs() < MIN_HESSIAN {
            0.0
        } else {
            numerator / denominator
        }
    }

    fn best_split(&self, indices: &[usize]) -> Option<SplitCandidate> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = indices.iter().map(|&i| self.residuals[i]).sum();
        let parent_score = total * total / n as f64;

        let mut best: Option<SplitCandidate> = None;
        let mut order = indices.to_vec();

        for feature in 0..self.n_features {
            order.sort_by(|a, b| self.rows[*a][feature].total_cmp(&self.rows[*b][feature]));

            let mut left_sum = 0.0;
            for k in 0..n - 1 {
                left_sum += self.residuals[order[k]];
                let left_n = k + 1;
                let right_n = n - left_n;

                let current = self.rows[order[k]][feature];
                let next = self.rows[order[k + 1]][feature];
                if current == next || left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64
                    - parent_score;

                // Zero-gain splits are still taken so interactions (XOR) can
                // be picked up one level down.
                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = current + (next - current) / 2.0;
                    if threshold == next {
                        threshold = current;
                    }
                    best = Some(SplitCandidate { gain, feature, threshold });
                }
            }
        }

        best
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    n_features: usize,
    init: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn fit(rows: &[Vec<f64>], targets: &[u8], params: BoostingParams) -> Result<Self, AppError> {
        if rows.is_empty() {
            return Err(AppError::Dataset("cannot fit on an empty dataset".to_string()));
        }
        if rows.len() != targets.len() {
            return Err(AppError::Dataset(format!(
                "{} rows but {} targets",
                rows.len(),
                targets.len()
            )));
        }
        if let Some(t) = targets.iter().find(|t| **t > 1) {
            return Err(AppError::Dataset(format!("target {} is not a binary label", t)));
        }
        let n_features = rows[0].len();
        if let Some(row) = rows.iter().find(|r| r.len() != n_features) {
            return Err(AppError::Dataset(format!(
                "ragged rows: expected {} features, found {}",
                n_features,
                row.len()
            )));
        }

        let y: Vec<f64> = targets.iter().map(|t| f64::from(*t)).collect();
        let eps = f64::from(f32::EPSILON);
        let prior = (y.iter().sum::<f64>() / y.len() as f64).clamp(eps, 1.0 - eps);
        let init = (prior / (1.0 - prior)).ln();

        let mut raw = vec![init; rows.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let all: Vec<usize> = (0..rows.len()).collect();

        for _ in 0..params.n_estimators {
            let probs: Vec<f64> = raw.iter().map(|z| sigmoid(*z)).collect();
            let residuals: Vec<f64> = y.iter().zip(&probs).map(|(y, p)| y - p).collect();
            let hessians: Vec<f64> = probs.iter().map(|p| p * (1.0 - p)).collect();

            let tree = TreeBuilder {
                rows,
                residuals: &residuals,
                hessians: &hessians,
                params: &params,
                n_features,
                nodes: Vec::new(),
            }
            .build(all.clone());

            for (score, row) in raw.iter_mut().zip(rows) {
                *score += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self { params, n_features, init, trees })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.trees.iter().try_for_each(|t| t.validate(self.n_features))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    /// Raw log-odds of the positive class.
    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.init
            + self
                .trees
                .iter()
                .map(|t| self.params.learning_rate * t.predict(x))
                .sum::<f64>()
    }

    pub fn predict_proba(&self, x: &[f64]) -> [f64; 2] {
        let p1 = sigmoid(self.decision_function(x));
        [1.0 - p1, p1]
    }

    pub fn predict(&self, x: &[f64]) -> u8 {
        let [p0, p1] = self.predict_proba(x);
        u8::from(p1 > p0)
    }
}
