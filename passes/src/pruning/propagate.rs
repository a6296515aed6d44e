//! Forward mask propagation with consumer-acceptance narrowing.

use murre_ir::prelude::*;

/// Flows masks from constants forward through ops with a registered
/// mask-transfer rule, then narrows every mask down to the slices all of its
/// consumers can absorb. A pruned slice is absorbable through a consumer
/// when it survives into that consumer's own mask, or cancels against the
/// matching reduction slices of the other matmul operand; anything else
/// would shrink one value out from under an operand that keeps its shape.
#[derive(Debug, Default, Clone, Copy)]
pub struct PropagateMasks;

impl Pass for PropagateMasks {
    fn name(&self) -> &str {
        "propagate-masks"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<MutationResult, Error> {
        let order = graph.topological_order()?;
        // Narrowing an input mask can shrink downstream masks, which in turn
        // narrows their producers, so alternate the sweeps until stable.
        // Masks only ever lose entries, so this terminates.
        loop {
            let forward = forward_sweep(graph, &order)?;
            let narrowed = narrow_sweep(graph, &order)?;
            if !forward && !narrowed {
                break;
            }
        }
        Ok(MutationResult::Unchanged)
    }
}

/// One producers-first sweep applying each op's mask-transfer rule to its
/// current input masks. Ops without a transfer rule stop propagation.
fn forward_sweep(graph: &mut Graph, order: &[NodeId]) -> Result<bool, Error> {
    let mut changed = false;
    for &node in order {
        let payload = {
            let n = graph.node(node)?;
            if n.num_outputs() != 1 {
                continue;
            }
            graph
                .registry()
                .schema(n.kind())
                .and_then(|s| s.mask_transfer)
                .map(|transfer| (transfer, n.attrs().clone(), n.inputs().to_vec()))
        };
        let Some((transfer, attrs, inputs)) = payload else { continue };

        let computed = {
            let input_masks: Vec<Option<&Mask>> = inputs.iter().map(|&v| graph.mask(v)).collect();
            transfer(&attrs, &input_masks).filter(|m| !m.is_empty())
        };
        let out = ValueRef::new(node, 0);
        if graph.mask(out) != computed.as_ref() {
            match computed {
                Some(mask) => graph.set_mask(out, mask)?,
                None => graph.clear_mask(out)?,
            }
            changed = true;
        }
    }
    Ok(changed)
}

/// One consumers-first sweep replacing each mask by the intersection of what
/// its consumer edges absorb. A mask narrowed to empty is dropped.
fn narrow_sweep(graph: &mut Graph, order: &[NodeId]) -> Result<bool, Error> {
    let mut changed = false;
    for &node in order.iter().rev() {
        let value = ValueRef::new(node, 0);
        let Some(mask) = graph.mask(value).cloned() else { continue };
        let consumers = graph.node(node)?.consumers(0).to_vec();

        let mut narrowed = mask.clone();
        for (consumer, slot) in consumers {
            narrowed = narrowed.intersect(&absorbed(graph, consumer, slot as usize, &mask));
        }
        if narrowed != mask {
            if narrowed.is_empty() {
                graph.clear_mask(value)?;
            } else {
                graph.set_mask(value, narrowed)?;
            }
            changed = true;
        }
    }
    Ok(changed)
}

/// The sub-mask of `mask` that one consumer edge can absorb.
fn absorbed(graph: &Graph, consumer: NodeId, slot: usize, mask: &Mask) -> Mask {
    let rejected = Mask::new(mask.rank());
    let Ok(node) = graph.node(consumer) else {
        return rejected;
    };
    let out_mask = graph.mask(ValueRef::new(consumer, 0));
    match node.kind() {
        // Elementwise: a pruned slice must flow through into the consumer's
        // own mask, which already intersects the operand masks.
        OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Neg | OpKind::Relu => match out_mask {
            Some(out) if out.rank() == mask.rank() => mask.intersect(out),
            _ => rejected,
        },
        // MatMul: the non-reduction dim must survive into the product's
        // mask; reduction slices must be masked on both operands so the
        // removed terms cancel.
        OpKind::MatMul if mask.rank() == 2 => {
            let mut result = Mask::new(2);
            let (kept, reduced) = if slot == 1 { (1, 0) } else { (0, 1) };
            if let Some(out) = out_mask.filter(|m| m.rank() == 2) {
                result
                    .at_mut(kept)
                    .extend(mask.at(kept).intersection(out.at(kept)).copied());
            }
            let other = node.input(1 - slot).and_then(|v| graph.mask(v));
            if let Some(other) = other.filter(|m| m.rank() == 2) {
                result
                    .at_mut(reduced)
                    .extend(mask.at(reduced).intersection(other.at(1 - reduced)).copied());
            }
            result
        }
        _ => rejected,
    }
}
