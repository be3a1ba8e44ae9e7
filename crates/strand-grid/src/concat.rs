// Concatenation on the grid
//
// The plan from `strand_core::concat` pairs each source with its slab of
// the destination. Parts are dealt out to thread-groups round-robin; inside
// a group the lanes split the part's elements. Lane 0 of every group
// decodes all parts into execution contexts once per launch.

use strand_core::concat::ConcatPlan;
use strand_core::Element;

use crate::context::ExecContext;
use crate::launch::Lane;
use crate::memory::DeviceBuffer;

pub fn kernel<T: Element>(
    lane: &Lane<'_, Vec<ExecContext>>,
    plan: &ConcatPlan,
    sources: &[&DeviceBuffer<T>],
    dst: &DeviceBuffer<T>,
) {
    let contexts = lane.shared_context(|| {
        plan.parts
            .iter()
            .map(|p| ExecContext::new(&p.src, &p.dst))
            .collect()
    });
    for r in (lane.block_idx..contexts.len()).step_by(lane.grid_dim) {
        let ctx = &contexts[r];
        let src = sources[r];
        for i in (lane.thread_idx..ctx.len).step_by(lane.block_dim) {
            let (s, d) = ctx.offsets(i);
            dst.write(d, src.read(s));
        }
    }
}
