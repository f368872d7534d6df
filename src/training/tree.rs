//! CART decision-tree classifier (Gini impurity, midpoint thresholds).

use serde::{Deserialize, Serialize};

use crate::common::error::{CoreError, CoreResult};
use crate::transform::domain::FeatureMatrix;

use super::domain::Estimator;

/// Minimum impurity decrease for a split to be kept.
const MIN_GAIN: f64 = 1e-12;

/// Decision tree hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth of the tree; `None` grows until leaves are pure.
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node.
    pub min_samples_split: usize,
    /// Minimum samples in each leaf.
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl TreeParams {
    /// Cartesian product of the given value lists.
    pub fn grid(
        depths: &[Option<usize>],
        splits: &[usize],
        leaves: &[usize],
    ) -> Vec<TreeParams> {
        let mut out = Vec::with_capacity(depths.len() * splits.len() * leaves.len());
        for &max_depth in depths {
            for &min_samples_split in splits {
                for &min_samples_leaf in leaves {
                    out.push(TreeParams {
                        max_depth,
                        min_samples_split,
                        min_samples_leaf,
                    });
                }
            }
        }
        out
    }

    /// Grid searched when no explicit one is configured.
    pub fn default_grid() -> Vec<TreeParams> {
        Self::grid(&[Some(3), Some(6), None], &[2, 10], &[1, 5])
    }
}

/// Tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        /// Index into the classifier's class list.
        class: usize,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    /// Number of split levels; a lone leaf has depth zero.
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// Number of leaves below this node.
    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Decision tree classifier over arbitrary numeric class labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    params: TreeParams,
    classes: Vec<f64>,
    n_features: usize,
    root: Option<TreeNode>,
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::with_params(TreeParams::default())
    }
}

impl DecisionTreeClassifier {
    /// Distinct labels seen during fit, ascending.
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Root node, `None` before the first fit.
    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    /// True once `fit` succeeded.
    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    fn build(
        &self,
        x: &[Vec<f64>],
        labels: &[usize],
        indices: &[usize],
        depth: usize,
    ) -> TreeNode {
        let counts = self.class_counts(labels, indices);
        let n = indices.len();
        let impurity = gini(&counts, n);

        let depth_reached = self.params.max_depth.map_or(false, |max| depth >= max);
        if depth_reached || n < self.params.min_samples_split || impurity < MIN_GAIN {
            return self.leaf(&counts, n);
        }

        match self.best_split(x, labels, indices, &counts, impurity) {
            Some((feature, threshold)) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                    indices.iter().partition(|&&i| x[i][feature] <= threshold);
                let left = self.build(x, labels, &left_idx, depth + 1);
                let right = self.build(x, labels, &right_idx, depth + 1);
                TreeNode::Split {
                    feature,
                    threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            None => self.leaf(&counts, n),
        }
    }

    /// Best (feature, threshold) by Gini gain; sweeps each feature in sorted order.
    fn best_split(
        &self,
        x: &[Vec<f64>],
        labels: &[usize],
        indices: &[usize],
        counts: &[usize],
        parent_impurity: f64,
    ) -> Option<(usize, f64)> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best_gain = MIN_GAIN;
        let mut best = None;

        for feature in 0..self.n_features {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

            let mut left = vec![0usize; counts.len()];
            let mut right = counts.to_vec();
            for k in 0..n - 1 {
                let class = labels[order[k]];
                left[class] += 1;
                right[class] -= 1;

                let here = x[order[k]][feature];
                let next = x[order[k + 1]][feature];
                if here == next {
                    continue;
                }
                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let weighted = (n_left as f64 * gini(&left, n_left)
                    + n_right as f64 * gini(&right, n_right))
                    / n as f64;
                let gain = parent_impurity - weighted;
                if gain > best_gain {
                    best_gain = gain;
                    best = Some((feature, (here + next) / 2.0));
                }
            }
        }
        best
    }

    fn class_counts(&self, labels: &[usize], indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for &i in indices {
            counts[labels[i]] += 1;
        }
        counts
    }

    /// Majority class; ties go to the smallest label.
    fn leaf(&self, counts: &[usize], n_samples: usize) -> TreeNode {
        let mut class = 0;
        for (i, &c) in counts.iter().enumerate() {
            if c > counts[class] {
                class = i;
            }
        }
        TreeNode::Leaf { class, n_samples }
    }

    fn predict_one(&self, root: &TreeNode, row: &[f64]) -> f64 {
        let mut node = root;
        loop {
            match node {
                TreeNode::Leaf { class, .. } => return self.classes[*class],
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

impl Estimator for DecisionTreeClassifier {
    type Params = TreeParams;

    fn with_params(params: TreeParams) -> Self {
        Self {
            params,
            classes: Vec::new(),
            n_features: 0,
            root: None,
        }
    }

    fn params(&self) -> &TreeParams {
        &self.params
    }

    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> CoreResult<()> {
        if x.n_rows() != y.len() {
            return Err(CoreError::invalid(format!(
                "{} rows but {} labels",
                x.n_rows(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(CoreError::NoUsableRows);
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::invalid("labels must be finite"));
        }

        let mut classes = y.to_vec();
        classes.sort_by(f64::total_cmp);
        classes.dedup();
        let labels: Vec<usize> = y
            .iter()
            .map(|v| classes.partition_point(|c| c < v))
            .collect();

        self.classes = classes;
        self.n_features = x.n_features();
        let indices: Vec<usize> = (0..x.n_rows()).collect();
        self.root = Some(self.build(x.rows(), &labels, &indices, 0));
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> CoreResult<Vec<f64>> {
        let root = self.root.as_ref().ok_or(CoreError::NotFitted)?;
        if x.n_features() != self.n_features {
            return Err(CoreError::schema(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.n_features()
            )));
        }
        Ok(x.rows().iter().map(|row| self.predict_one(root, row)).collect())
    }
}
