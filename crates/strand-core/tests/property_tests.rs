use proptest::prelude::*;
use strand_core::layout::coords_of;
use strand_core::{Layout, Order};

fn order(fortran: bool) -> Order {
    if fortran {
        Order::F
    } else {
        Order::C
    }
}

/// Buffer offset of the `i`-th element in the layout's own iteration order.
fn offset_in_order(layout: &Layout, i: usize) -> usize {
    let mut coords = vec![0usize; layout.rank()];
    coords_of(layout.dims(), i, layout.order(), &mut coords);
    layout.flat_index(&coords)
}

fn all_offsets(layout: &Layout) -> Vec<usize> {
    (0..layout.elem_count()).map(|i| offset_in_order(layout, i)).collect()
}

/// Packed layouts in either order, scaled by a stride and optionally
/// transposed.
fn layout_strategy() -> impl Strategy<Value = Layout> {
    (
        prop::collection::vec(1usize..5, 1..4),
        any::<bool>(),
        1usize..4,
        0usize..4,
        0usize..4,
        0usize..3,
    )
        .prop_map(|(dims, fortran, scale, a, b, offset)| {
            let rank = dims.len();
            let packed = Layout::with_order(dims, order(fortran));
            let strides: Vec<isize> = packed.strides().iter().map(|s| s * scale as isize).collect();
            let scaled = Layout::new(packed.shape().clone(), strides, offset, packed.order()).unwrap();
            scaled.transpose(a % rank, b % rank).unwrap()
        })
}

proptest! {
    /// Whenever an element-wise stride exists, walking the layout in its own
    /// order is a single arithmetic progression with that stride.
    #[test]
    fn prop_element_wise_stride_is_a_progression(layout in layout_strategy()) {
        if let Some(ews) = layout.element_wise_stride() {
            for i in 0..layout.elem_count() {
                prop_assert_eq!(offset_in_order(&layout, i), layout.offset() + i * ews);
            }
        }
    }

    /// A scaled packed layout always has the scale as its element-wise stride.
    #[test]
    fn prop_scaled_packed_layout_keeps_ews(
        dims in prop::collection::vec(1usize..5, 1..4),
        fortran in any::<bool>(),
        scale in 1usize..4,
    ) {
        let packed = Layout::with_order(dims, order(fortran));
        let strides: Vec<isize> = packed.strides().iter().map(|s| s * scale as isize).collect();
        let scaled = Layout::new(packed.shape().clone(), strides, 0, packed.order()).unwrap();
        let expected = if scaled.elem_count() <= 1 { 1 } else { scale };
        prop_assert_eq!(scaled.element_wise_stride(), Some(expected));
    }

    /// The TADs along any set of dimensions cover every element exactly once.
    #[test]
    fn prop_tads_partition_the_array(
        layout in layout_strategy(),
        picks in prop::collection::vec(0usize..4, 1..3),
    ) {
        let dims: Vec<usize> = picks.iter().map(|d| d % layout.rank()).collect();
        let tads = layout.tads(&dims).unwrap();
        prop_assert_eq!(tads.len() * tads.tad_len(), layout.elem_count());

        let mut covered: Vec<usize> = (0..tads.len())
            .flat_map(|t| (0..tads.tad_len()).map(move |j| (t, j)))
            .map(|(t, j)| tads.element_offset(t, j))
            .collect();
        covered.sort_unstable();
        let mut expected = all_offsets(&layout);
        expected.sort_unstable();
        prop_assert_eq!(covered, expected);
    }
}
