//! Mask initialization on constant weights.

use murre_ir::pattern::helpers;
use murre_ir::prelude::*;

/// Magnitude below which a weight is considered prunable.
pub const DEFAULT_THRESHOLD: f64 = 1e-5;

/// For every constant, along each requested dimension, mark the indices
/// whose entire slice stays below `threshold` in magnitude. Metadata only:
/// the pass always reports no mutation.
pub fn init_const_mask(dims: Vec<usize>, threshold: f64) -> PassDriver {
    let pattern = Pattern::op(OpKind::Const, vec![]).named("weights");
    let rule = Rule::new("init-const-mask", pattern, move |graph, bindings, _| {
        let Some(value) = bindings.get("weights") else {
            return Ok(MutationResult::Unchanged);
        };
        let Some(tensor) = helpers::try_const(graph, value) else {
            return Ok(MutationResult::Unchanged);
        };

        let rank = tensor.shape.len();
        let mut mask = Mask::new(rank);
        let mut marked = false;
        for &d in dims.iter().filter(|&&d| d < rank) {
            let axis_len = tensor.shape[d];
            let outer: usize = tensor.shape[..d].iter().product();
            let inner: usize = tensor.shape[d + 1..].iter().product();
            for i in 0..axis_len {
                let slice_small = (0..outer).all(|o| {
                    let base = (o * axis_len + i) * inner;
                    tensor.data[base..base + inner].iter().all(|v| v.abs() < threshold)
                });
                if slice_small {
                    mask.at_mut(d).insert(i);
                    marked = true;
                }
            }
        }
        if marked {
            tracing::debug!(%value, "initialized pruning mask");
            graph.set_mask(value, mask)?;
        }
        Ok(MutationResult::Unchanged)
    });
    PassDriver::new("init-const-mask").with_rule(rule)
}
