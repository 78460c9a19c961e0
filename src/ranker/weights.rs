//! GAT state-dict loading
//!
//! Weights are persisted as a JSON object mapping parameter names to
//! nested float arrays, mirroring the training checkpoint layout:
//!
//! ```text
//! input_proj.weight  (hidden, 5 + node_dim + question_dim)
//! input_proj.bias    (hidden,)
//! convN.lin.weight   (heads * hidden, hidden)      N in 1..=3
//! convN.att_src      (heads, hidden) or (1, heads, hidden)
//! convN.att_dst      (heads, hidden) or (1, heads, hidden)
//! convN.bias         (hidden,)
//! classifier.weight  (1, hidden)
//! classifier.bias    (1,)
//! ```
//!
//! Checkpoints saved as training bundles (`model_state_dict` /
//! `state_dict` wrappers, `module.` prefixes) are unwrapped. Every shape
//! is validated; any mismatch is an error so the caller can disable the
//! ranker instead of scoring with garbage.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use crate::ranker::gat::{GatLayer, GatModel, Matrix};

const HEADS: usize = 4;

/// A tensor parsed from nested JSON arrays
struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    fn from_value(name: &str, value: &Value) -> Result<Self> {
        let mut shape = Vec::new();
        let mut data = Vec::new();
        collect(value, 0, &mut shape, &mut data)
            .with_context(|| format!("tensor '{}' is not a rectangular float array", name))?;
        Ok(Self { shape, data })
    }

    /// Drop leading 1-sized axes, e.g. `(1, heads, dim)` -> `(heads, dim)`
    fn squeeze_leading(mut self) -> Self {
        while self.shape.len() > 1 && self.shape[0] == 1 {
            self.shape.remove(0);
        }
        self
    }

    fn expect_shape(&self, name: &str, expected: &[usize]) -> Result<()> {
        if self.shape != expected {
            bail!(
                "parameter '{}' has shape {:?}, expected {:?}",
                name,
                self.shape,
                expected
            );
        }
        Ok(())
    }
}

fn collect(value: &Value, depth: usize, shape: &mut Vec<usize>, data: &mut Vec<f32>) -> Result<()> {
    match value {
        Value::Array(items) => {
            if shape.len() == depth {
                shape.push(items.len());
            } else if shape[depth] != items.len() {
                bail!("ragged array at depth {}", depth);
            }
            for item in items {
                collect(item, depth + 1, shape, data)?;
            }
            Ok(())
        }
        Value::Number(n) => {
            if shape.len() != depth {
                bail!("scalar at unexpected depth {}", depth);
            }
            data.push(n.as_f64().ok_or_else(|| anyhow!("non-finite number"))? as f32);
            Ok(())
        }
        _ => bail!("non-numeric leaf"),
    }
}

/// Load and validate a GAT state dict.
///
/// `node_dim` is the width of the node text embedding (the sparse 5-dim
/// indicator is implied); the question-embedding width is inferred from
/// the `input_proj.weight` shape, which resolves the 384-vs-768 question
/// in favor of whatever was actually trained.
pub fn load_state_dict(path: &Path, node_dim: usize) -> Result<GatModel> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading GAT weights from {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw).context("GAT weights are not valid JSON")?;
    parse_state_dict(&value, node_dim)
}

pub fn parse_state_dict(value: &Value, node_dim: usize) -> Result<GatModel> {
    let map = unwrap_bundle(value)?;

    let tensor = |name: &str| -> Result<Tensor> {
        let v = map
            .get(name)
            .ok_or_else(|| anyhow!("missing parameter '{}'", name))?;
        Tensor::from_value(name, v)
    };

    let input_w = tensor("input_proj.weight")?;
    if input_w.shape.len() != 2 {
        bail!(
            "input_proj.weight has shape {:?}, expected 2 axes",
            input_w.shape
        );
    }
    let hidden = input_w.shape[0];
    let in_total = input_w.shape[1];
    let sparse_plus_node = 5 + node_dim;
    if in_total <= sparse_plus_node {
        bail!(
            "input_proj.weight input width {} cannot hold {} node dims plus a question embedding",
            in_total,
            sparse_plus_node
        );
    }
    let question_dim = in_total - sparse_plus_node;

    let input_b = tensor("input_proj.bias")?;
    input_b.expect_shape("input_proj.bias", &[hidden])?;

    let mut layers = Vec::with_capacity(3);
    for n in 1..=3 {
        let lin = tensor(&format!("conv{}.lin.weight", n))?;
        lin.expect_shape(&format!("conv{}.lin.weight", n), &[HEADS * hidden, hidden])?;
        let att_src = tensor(&format!("conv{}.att_src", n))?.squeeze_leading();
        att_src.expect_shape(&format!("conv{}.att_src", n), &[HEADS, hidden])?;
        let att_dst = tensor(&format!("conv{}.att_dst", n))?.squeeze_leading();
        att_dst.expect_shape(&format!("conv{}.att_dst", n), &[HEADS, hidden])?;
        let bias = tensor(&format!("conv{}.bias", n))?;
        bias.expect_shape(&format!("conv{}.bias", n), &[hidden])?;

        layers.push(GatLayer {
            heads: HEADS,
            in_dim: hidden,
            out_dim: hidden,
            lin_weight: Matrix::new(HEADS * hidden, hidden, lin.data),
            att_src: Matrix::new(HEADS, hidden, att_src.data),
            att_dst: Matrix::new(HEADS, hidden, att_dst.data),
            bias: bias.data,
        });
    }

    let cls_w = tensor("classifier.weight")?;
    cls_w.expect_shape("classifier.weight", &[1, hidden])?;
    let cls_b = tensor("classifier.bias")?;
    cls_b.expect_shape("classifier.bias", &[1])?;

    let mut layers = layers.into_iter();
    Ok(GatModel {
        input_proj_weight: Matrix::new(hidden, in_total, input_w.data),
        input_proj_bias: input_b.data,
        conv1: layers.next().expect("three layers built"),
        conv2: layers.next().expect("three layers built"),
        conv3: layers.next().expect("three layers built"),
        classifier_weight: Matrix::new(1, hidden, cls_w.data),
        classifier_bias: cls_b.data[0],
        question_dim,
        node_dim: sparse_plus_node,
    })
}

/// Unwrap training-bundle checkpoints and strip `module.` prefixes.
fn unwrap_bundle(value: &Value) -> Result<HashMap<String, &Value>> {
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("state dict root is not a JSON object"))?;

    let inner = if let Some(nested) = obj.get("model_state_dict").and_then(|v| v.as_object()) {
        nested
    } else if let Some(nested) = obj.get("state_dict").and_then(|v| v.as_object()) {
        nested
    } else {
        obj
    };

    Ok(inner
        .iter()
        .map(|(k, v)| (k.strip_prefix("module.").unwrap_or(k).to_string(), v))
        .collect())
}
