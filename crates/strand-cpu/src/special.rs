// Special routines on the host
//
// Planning and arithmetic come from `strand_core::special`; this module only
// decides how the work is spread. Segments are independent, so above the
// parallel threshold each segment is reduced and written into its own
// output row on rayon, and the rows are scattered into the destination
// afterwards. Inside a segment everything stays sequential.

use rayon::prelude::*;

use strand_core::special::{self, SpecialKind, SpecialPlan};
use strand_core::{Element, ExecConfig, Layout, Order, Result, TadSet, MAX_RANK};

pub fn exec<T: Element>(
    kind: SpecialKind,
    src: &[T],
    src_layout: &Layout,
    dst: &mut [T],
    dst_layout: &Layout,
    params: &[T],
    cfg: &ExecConfig,
) -> Result<()> {
    src_layout.check_buffer(src.len())?;
    dst_layout.check_buffer(dst.len())?;
    let plan = special::plan(kind, src_layout, dst_layout, params)?;
    let parallel = cfg.is_parallel(dst_layout.elem_count());
    match plan {
        SpecialPlan::Segments { kind, src: st, dst: dt } => {
            tracing::debug!(
                op = kind.name(),
                segments = st.len(),
                len = st.tad_len(),
                parallel,
                "special segments"
            );
            segments(kind, src, &st, dst, &dt, parallel);
        }
        SpecialPlan::Im2col(g) => {
            tracing::debug!(op = "im2col", ?g, parallel, "special patches");
            gather(src, src_layout, dst, dst_layout, parallel, |coords, at| g.im2col_value(coords, at));
        }
        SpecialPlan::Col2Im(g) => {
            tracing::debug!(op = "col2im", ?g, parallel, "special patches");
            gather(src, src_layout, dst, dst_layout, parallel, |coords, at| g.col2im_value(coords, at));
        }
    }
    Ok(())
}

fn segment_row<T: Element>(kind: SpecialKind, src: &[T], st: &TadSet, t: usize) -> Vec<T> {
    let len = st.tad_len();
    let stats = special::segment_stats(kind, len, |j| src[st.element_offset(t, j)]);
    (0..len)
        .map(|j| special::segment_apply(kind, src[st.element_offset(t, j)], j, &stats))
        .collect()
}

fn segments<T: Element>(kind: SpecialKind, src: &[T], st: &TadSet, dst: &mut [T], dt: &TadSet, parallel: bool) {
    if parallel {
        let rows: Vec<Vec<T>> = (0..st.len())
            .into_par_iter()
            .map(|t| segment_row(kind, src, st, t))
            .collect();
        for (t, row) in rows.into_iter().enumerate() {
            for (j, v) in row.into_iter().enumerate() {
                dst[dt.element_offset(t, j)] = v;
            }
        }
    } else {
        for t in 0..st.len() {
            for (j, v) in segment_row(kind, src, st, t).into_iter().enumerate() {
                dst[dt.element_offset(t, j)] = v;
            }
        }
    }
}

/// Fill every destination element from `value(coords, read_src)`, where
/// `coords` is the element's position and `read_src` reads the source at a
/// coordinate.
fn gather<T, F>(src: &[T], sl: &Layout, dst: &mut [T], dl: &Layout, parallel: bool, value: F)
where
    T: Element,
    F: Fn(&[usize], &dyn Fn(&[usize]) -> T) -> T + Sync,
{
    let rank = dl.rank();
    let read = |c: &[usize]| src[sl.flat_index(c)];
    let at = |i: usize| {
        let mut coords = [0usize; MAX_RANK];
        dl.coords_of(i, Order::C, &mut coords[..rank]);
        value(&coords[..rank], &read)
    };
    let n = dl.elem_count();
    if parallel {
        let vals: Vec<T> = (0..n).into_par_iter().map(at).collect();
        for (i, v) in vals.into_iter().enumerate() {
            dst[dl.offset_of(i, Order::C)] = v;
        }
    } else {
        for i in 0..n {
            dst[dl.offset_of(i, Order::C)] = at(i);
        }
    }
}
