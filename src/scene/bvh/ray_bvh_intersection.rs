use std::ops::ControlFlow;

use smallvec::SmallVec;

use super::{Bvh, NodeIdx, NodeKind};
use crate::{
    geometry::{HitRecord, Ray, RayIntersectionExt as _, WorldBox},
    scene::Primitive,
};

/// Node stack entries kept inline, deeper trees spill to the heap.
const INLINE_STACK_SIZE: usize = 64;

impl<P: Primitive> Bvh<P> {
    /// Visit the leaves whose bounds the ray hits, nearer subtrees first.
    /// Leaves are tested against the current `ray.t_max`, so narrowing it in the visitor
    /// prunes the rest of the traversal.
    fn traverse(
        &self,
        ray: &mut Ray,
        mut visit_leaf: impl FnMut(&mut Ray, &[P]) -> ControlFlow<()>,
    ) {
        if self.nodes.is_empty() {
            return;
        }

        let direction_is_negative = ray.direction_is_negative();
        let mut stack: SmallVec<[NodeIdx; INLINE_STACK_SIZE]> = SmallVec::new();
        stack.push(NodeIdx::new(0));

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bounds.intersect_p(ray, &direction_is_negative) {
                continue;
            }

            match node.kind {
                NodeKind::Leaf {
                    primitives_offset,
                    n_primitives,
                } => {
                    let start = primitives_offset as usize;
                    let primitives = &self.primitives[start..start + n_primitives as usize];
                    if visit_leaf(ray, primitives).is_break() {
                        return;
                    }
                }
                NodeKind::Interior {
                    second_child_offset,
                    split_axis,
                } => {
                    let first_child = index + 1;
                    let (near, far) = if direction_is_negative[split_axis as usize] {
                        (second_child_offset, first_child)
                    } else {
                        (first_child, second_child_offset)
                    };
                    stack.push(far);
                    stack.push(near);
                }
            }
        }
    }
}

impl<P: Primitive> Primitive for Bvh<P> {
    fn world_bound(&self) -> WorldBox {
        self.nodes
            .first()
            .map_or_else(WorldBox::empty, |root| root.bounds)
    }

    fn intersect(&self, ray: &mut Ray) -> Option<HitRecord> {
        let mut closest = None;
        self.traverse(ray, |ray, primitives| {
            for primitive in primitives {
                // Every hit narrows t_max, so the last one is the closest
                if let Some(hit) = primitive.intersect(ray) {
                    closest = Some(hit);
                }
            }
            ControlFlow::Continue(())
        });
        closest
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        let mut ray = *ray;
        let mut found = false;
        self.traverse(&mut ray, |ray, primitives| {
            if primitives.iter().any(|primitive| primitive.intersect_p(ray)) {
                found = true;
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        found
    }
}
