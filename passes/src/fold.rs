//! Constant folding.
//!
//! Any single-output node whose inputs are all constants and whose op kind
//! carries an evaluation entry point is replaced by the evaluated constant.
//! Folding cascades within one traversal: a folded node can make its
//! consumer foldable later in the same topologically ordered sweep.

use murre_ir::pattern::helpers;
use murre_ir::prelude::*;

pub fn constant_folding() -> PassDriver {
    PassDriver::new("constant-folding").with_rule(fold_rule())
}

fn foldable(graph: &Graph, value: ValueRef) -> bool {
    let Ok(node) = graph.node(value.node) else { return false };
    node.kind() != OpKind::Const
        && node.num_outputs() == 1
        && !node.inputs().is_empty()
        && graph.registry().schema(node.kind()).is_some_and(|s| s.eval.is_some())
        && node.inputs().iter().all(|&v| helpers::is_const(graph, v))
}

fn fold_rule() -> Rule {
    Rule::new("fold", Pattern::wildcard_where(foldable), |graph, _, node| {
        let (kind, attrs, input_values) = {
            let n = graph.node(node)?;
            (n.kind(), n.attrs().clone(), n.inputs().to_vec())
        };
        let Some(eval) = graph.registry().schema(kind).and_then(|s| s.eval) else {
            return Ok(MutationResult::Unchanged);
        };
        let Some(inputs) = input_values
            .iter()
            .map(|&v| helpers::try_const(graph, v))
            .collect::<Option<Vec<_>>>()
        else {
            return Ok(MutationResult::Unchanged);
        };

        let mut outputs = eval(kind, &attrs, &inputs)?;
        let Some(tensor) = outputs.pop() else {
            return Ok(MutationResult::Unchanged);
        };
        let folded = graph.add_const(tensor)?;
        graph.replace_node(node, folded)?;
        Ok(MutationResult::Mutated)
    })
}
