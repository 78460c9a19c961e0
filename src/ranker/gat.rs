//! Graph attention network forward pass
//!
//! Three GAT layers with 4 attention heads averaged (not concatenated),
//! question embedding concatenated to every node feature at the input,
//! ReLU between layers, linear classifier to one logit per node. Dropout
//! exists only at training time; this is an inference-only implementation
//! so there is no dropout and no gradient machinery. Sigmoid is applied
//! exactly once, at the end.
//!
//! All math is plain row-major `Vec<f32>`.

/// Row-major dense matrix
#[derive(Clone, Debug)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(rows * cols, data.len());
        Self { rows, cols, data }
    }

    #[inline]
    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// y = W x for a row slice of this matrix restricted to `row_range`
    fn mat_vec_rows(&self, row_start: usize, row_end: usize, x: &[f32], out: &mut [f32]) {
        debug_assert_eq!(x.len(), self.cols);
        for (o, r) in (row_start..row_end).enumerate() {
            let row = self.row(r);
            let mut acc = 0.0f32;
            for (w, xi) in row.iter().zip(x) {
                acc += w * xi;
            }
            out[o] = acc;
        }
    }
}

/// One multi-head GAT layer (heads averaged)
#[derive(Clone, Debug)]
pub struct GatLayer {
    pub heads: usize,
    pub in_dim: usize,
    pub out_dim: usize,
    /// Shape `(heads * out_dim, in_dim)`
    pub lin_weight: Matrix,
    /// Shape `(heads, out_dim)`
    pub att_src: Matrix,
    /// Shape `(heads, out_dim)`
    pub att_dst: Matrix,
    /// Shape `(out_dim,)`
    pub bias: Vec<f32>,
}

const LEAKY_RELU_SLOPE: f32 = 0.2;

impl GatLayer {
    /// Attention-weighted aggregation over the edge set, heads averaged.
    /// Self-loops are added so every node attends to itself.
    pub fn forward(&self, x: &[Vec<f32>], edges: &[(usize, usize)]) -> Vec<Vec<f32>> {
        let n = x.len();
        let mut all_edges: Vec<(usize, usize)> = Vec::with_capacity(edges.len() + n);
        all_edges.extend_from_slice(edges);
        for i in 0..n {
            all_edges.push((i, i));
        }

        let mut out = vec![vec![0.0f32; self.out_dim]; n];

        for h in 0..self.heads {
            let row_start = h * self.out_dim;
            let row_end = row_start + self.out_dim;
            let a_src = self.att_src.row(h);
            let a_dst = self.att_dst.row(h);

            // Per-head projection z_i = W_h x_i and attention terms
            let mut z = vec![vec![0.0f32; self.out_dim]; n];
            let mut src_score = vec![0.0f32; n];
            let mut dst_score = vec![0.0f32; n];
            for i in 0..n {
                self.lin_weight
                    .mat_vec_rows(row_start, row_end, &x[i], &mut z[i]);
                src_score[i] = dot(a_src, &z[i]);
                dst_score[i] = dot(a_dst, &z[i]);
            }

            // Raw attention logits per edge, softmax grouped by destination
            let mut logits = vec![0.0f32; all_edges.len()];
            let mut max_per_dst = vec![f32::NEG_INFINITY; n];
            for (e, (src, dst)) in all_edges.iter().enumerate() {
                let raw = src_score[*src] + dst_score[*dst];
                let l = if raw > 0.0 { raw } else { LEAKY_RELU_SLOPE * raw };
                logits[e] = l;
                if l > max_per_dst[*dst] {
                    max_per_dst[*dst] = l;
                }
            }

            let mut denom = vec![0.0f32; n];
            let mut weights = vec![0.0f32; all_edges.len()];
            for (e, (_, dst)) in all_edges.iter().enumerate() {
                let w = (logits[e] - max_per_dst[*dst]).exp();
                weights[e] = w;
                denom[*dst] += w;
            }

            for (e, (src, dst)) in all_edges.iter().enumerate() {
                let alpha = weights[e] / denom[*dst];
                let zsrc = &z[*src];
                let acc = &mut out[*dst];
                for k in 0..self.out_dim {
                    acc[k] += alpha * zsrc[k];
                }
            }
        }

        // Average heads, add bias
        let inv_heads = 1.0 / self.heads as f32;
        for row in &mut out {
            for k in 0..self.out_dim {
                row[k] = row[k] * inv_heads + self.bias[k];
            }
        }
        out
    }
}

/// Full ranker model matching the persisted state dict layout
#[derive(Clone, Debug)]
pub struct GatModel {
    /// Shape `(hidden, 5 + node_dim + question_dim)`
    pub input_proj_weight: Matrix,
    pub input_proj_bias: Vec<f32>,
    pub conv1: GatLayer,
    pub conv2: GatLayer,
    pub conv3: GatLayer,
    /// Shape `(1, hidden)`
    pub classifier_weight: Matrix,
    pub classifier_bias: f32,
    /// Question embedding width inferred from `input_proj_weight`
    pub question_dim: usize,
    /// Node feature width (sparse 5 + text embedding)
    pub node_dim: usize,
}

impl GatModel {
    pub fn hidden_dim(&self) -> usize {
        self.input_proj_weight.rows
    }

    /// Score every node in `[0, 1]`.
    ///
    /// `node_features` are the per-node `5 + node_dim - 5` vectors (sparse
    /// indicator followed by the text embedding); `question` must have
    /// `question_dim` entries.
    pub fn forward(
        &self,
        node_features: &[Vec<f32>],
        edges: &[(usize, usize)],
        question: &[f32],
    ) -> Vec<f32> {
        let hidden = self.hidden_dim();
        let n = node_features.len();

        // Question injection at input: concat [x_i, q], project, ReLU
        let mut h: Vec<Vec<f32>> = Vec::with_capacity(n);
        let mut combined = vec![0.0f32; self.node_dim + self.question_dim];
        for x in node_features {
            combined[..self.node_dim].copy_from_slice(x);
            combined[self.node_dim..].copy_from_slice(question);
            let mut proj = vec![0.0f32; hidden];
            self.input_proj_weight
                .mat_vec_rows(0, hidden, &combined, &mut proj);
            for (p, b) in proj.iter_mut().zip(&self.input_proj_bias) {
                *p = (*p + b).max(0.0);
            }
            h.push(proj);
        }

        let mut h = self.conv1.forward(&h, edges);
        relu_all(&mut h);
        let mut h = self.conv2.forward(&h, edges);
        relu_all(&mut h);
        let mut h = self.conv3.forward(&h, edges);
        relu_all(&mut h);

        let w = self.classifier_weight.row(0);
        h.iter()
            .map(|hi| sigmoid(dot(w, hi) + self.classifier_bias))
            .collect()
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn relu_all(h: &mut [Vec<f32>]) {
    for row in h {
        for v in row {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Tiny deterministic model for tests: hidden=4, heads=4, node_dim=9
    /// (5 sparse + 4 text), question_dim=6.
    pub fn tiny_model() -> GatModel {
        let hidden = 4;
        let heads = 4;
        let node_dim = 9;
        let question_dim = 6;

        fn fill(rows: usize, cols: usize, scale: f32) -> Matrix {
            let data: Vec<f32> = (0..rows * cols)
                .map(|i| ((i % 7) as f32 - 3.0) * scale)
                .collect();
            Matrix::new(rows, cols, data)
        }

        let layer = || GatLayer {
            heads,
            in_dim: hidden,
            out_dim: hidden,
            lin_weight: fill(heads * hidden, hidden, 0.05),
            att_src: fill(heads, hidden, 0.1),
            att_dst: fill(heads, hidden, 0.1),
            bias: vec![0.01; hidden],
        };

        GatModel {
            input_proj_weight: fill(hidden, node_dim + question_dim, 0.03),
            input_proj_bias: vec![0.0; hidden],
            conv1: layer(),
            conv2: layer(),
            conv3: layer(),
            classifier_weight: fill(1, hidden, 0.2),
            classifier_bias: -0.1,
            question_dim,
            node_dim,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::tiny_model;

    fn node_features(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| (0..dim).map(|j| ((i + j) % 5) as f32 * 0.1).collect())
            .collect()
    }

    #[test]
    fn scores_are_probabilities() {
        let model = tiny_model();
        let x = node_features(6, model.node_dim);
        let edges = vec![(0, 1), (1, 0), (1, 2), (2, 1), (0, 3), (3, 0)];
        let q = vec![0.1; model.question_dim];

        let scores = model.forward(&x, &edges, &q);
        assert_eq!(scores.len(), 6);
        for s in scores {
            assert!((0.0..=1.0).contains(&s), "score {} out of range", s);
        }
    }

    #[test]
    fn forward_is_deterministic() {
        let model = tiny_model();
        let x = node_features(5, model.node_dim);
        let edges = vec![(0, 1), (1, 0), (2, 3), (3, 2), (3, 4), (4, 3)];
        let q = vec![0.2; model.question_dim];

        let a = model.forward(&x, &edges, &q);
        let b = model.forward(&x, &edges, &q);
        assert_eq!(a, b);
    }

    #[test]
    fn question_changes_scores() {
        let model = tiny_model();
        let x = node_features(5, model.node_dim);
        let edges = vec![(0, 1), (1, 0), (1, 2), (2, 1)];

        let a = model.forward(&x, &edges, &vec![0.5; model.question_dim]);
        let b = model.forward(&x, &edges, &vec![-0.5; model.question_dim]);
        assert_ne!(a, b);
    }

    #[test]
    fn isolated_node_still_scored_via_self_loop() {
        let model = tiny_model();
        let x = node_features(3, model.node_dim);
        // Node 2 has no edges at all
        let edges = vec![(0, 1), (1, 0)];
        let q = vec![0.1; model.question_dim];

        let scores = model.forward(&x, &edges, &q);
        assert!(scores[2].is_finite());
        assert!((0.0..=1.0).contains(&scores[2]));
    }
}
