//! Mask materialization: slicing masked constants down to their kept rows.

use itertools::Itertools;
use murre_ir::prelude::*;
use smallvec::smallvec;

/// For each constant carrying a non-empty mask, builds one Gather per
/// masked dimension over the kept indices, rewires the constant's original
/// consumers onto the end of the chain and clears the mask. Downstream
/// descriptors are re-inferred once the rewiring is done.
///
/// A dimension whose every index is masked is left alone: a zero-sized
/// weight has no meaningful consumers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShrinkWeights;

impl Pass for ShrinkWeights {
    fn name(&self) -> &str {
        "shrink-weights"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<MutationResult, Error> {
        let masked: Vec<NodeId> = graph
            .live_nodes()
            .filter(|n| n.kind() == OpKind::Const)
            .filter(|n| graph.mask(n.id().into()).is_some_and(|m| !m.is_empty()))
            .map(Node::id)
            .collect();

        let mut overall = MutationResult::Unchanged;
        let mut total = 0usize;
        let mut reduced = 0usize;
        for id in masked {
            let source = ValueRef::from(id);
            let Some(tensor) = graph.constant_tensor(id) else { continue };
            let Some(mask) = graph.mask(source).cloned() else { continue };
            total += tensor.num_elements();

            // Captured up front: the chain itself consumes the constant and
            // must not be rewired onto its own output.
            let consumers = graph.node(id)?.consumers(0).to_vec();

            let mut current = source;
            let mut kept_elems = tensor.num_elements();
            for d in 0..mask.rank() {
                let pruned = mask.at(d);
                if pruned.is_empty() {
                    continue;
                }
                let axis_len = tensor.shape[d];
                let keep = (0..axis_len).filter(|i| !pruned.contains(i)).collect_vec();
                if keep.is_empty() || keep.len() == axis_len {
                    continue;
                }
                kept_elems = kept_elems / axis_len * keep.len();

                let indices = Tensor::new(
                    ElementType::I64,
                    smallvec![keep.len()],
                    keep.iter().map(|&i| i as f64).collect(),
                );
                let indices = graph.add_const(indices)?;
                let mut attrs = AttrMap::new();
                attrs.insert("axis".into(), AttrValue::Int(d as i64));
                let gather = graph.add_node(OpKind::Gather, attrs, &[current, indices.into()])?;
                current = gather.into();
            }
            if current == source {
                continue;
            }

            for (consumer, slot) in consumers {
                graph.set_input(consumer, slot as usize, current)?;
            }
            graph.clear_mask(source)?;
            reduced += tensor.num_elements() - kept_elems;
            overall = MutationResult::Mutated;
        }

        if overall.mutated() {
            graph.remove_dead_nodes();
            // Consumer descriptors still describe the unshrunk operands, and
            // any leftover masks index into shapes that no longer exist.
            graph.reinfer_types()?;
            let stale: Vec<ValueRef> = graph
                .live_nodes()
                .flat_map(|n| {
                    let id = n.id();
                    (0..n.num_outputs() as u32).map(move |p| ValueRef::new(id, p))
                })
                .filter(|&v| graph.mask(v).is_some())
                .collect();
            for value in stale {
                graph.clear_mask(value)?;
            }
            tracing::info!(reduced, total, "shrunk masked weights");
        }
        Ok(overall)
    }
}
