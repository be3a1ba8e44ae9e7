// Concatenation on the host
//
// `strand_core::concat::plan` validates the job and pairs each source with
// its destination slab. Every part is then an identity copy through the N-d
// engine, which picks the flat strided loop whenever both views allow it.
// All buffers are checked before the first part is copied, so a rejected
// job leaves the destination untouched.

use strand_core::concat;
use strand_core::transform::ops::Identity;
use strand_core::{Element, ExecConfig, Layout, Result};

use crate::nd;

pub fn exec<T: Element>(
    dim: usize,
    inputs: &[(&[T], &Layout)],
    dst: &mut [T],
    dst_layout: &Layout,
    cfg: &ExecConfig,
) -> Result<()> {
    let layouts: Vec<&Layout> = inputs.iter().map(|(_, l)| *l).collect();
    let plan = concat::plan(dim, &layouts, dst_layout)?;
    if plan.is_empty() {
        return Ok(());
    }
    dst_layout.check_buffer(dst.len())?;
    tracing::debug!(
        strategy = ?plan.strategy,
        sources = plan.parts.len(),
        elems = plan.elem_count(),
        "concat"
    );
    for (part, (buf, _)) in plan.parts.iter().zip(inputs) {
        part.src.check_buffer(buf.len())?;
    }
    for (part, (buf, _)) in plan.parts.iter().zip(inputs) {
        nd::exec::<Identity, T>(buf, &part.src, dst, &part.dst, &[], cfg)?;
    }
    Ok(())
}
