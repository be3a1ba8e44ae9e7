// Host/grid parity: both substrates must produce the same bits for every
// opcode, layout combination and engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use strand::prelude::*;
use strand::SpecialKind;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counts events at WARN or above.
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() <= tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` with a counting subscriber on this thread.
fn warnings_during<R>(f: impl FnOnce() -> R) -> (R, usize) {
    let counter = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, counter.0.load(Ordering::SeqCst))
}

fn same_bits<T: Element>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.to_bits64() == y.to_bits64() || (x.is_nan() && y.is_nan()))
}

/// Parameters that keep every parameterised opcode in a meaningful range.
fn params_for<T: Element>(op: TransformOp) -> Vec<T> {
    let raw: &[f64] = match op {
        TransformOp::Pow => &[2.0],
        TransformOp::SetRange => &[-1.0, 1.5],
        TransformOp::Stabilize => &[2.0],
        TransformOp::LeakyRelu | TransformOp::LeakyReluDerivative => &[0.2],
        TransformOp::Relu => &[0.5],
        TransformOp::Step => &[0.25],
        _ => &[],
    };
    raw.iter().map(|&v| T::from_f64(v)).collect()
}

fn is_conv(op: TransformOp) -> bool {
    matches!(
        op.special_kind(),
        Some(SpecialKind::Im2col) | Some(SpecialKind::Col2Im)
    )
}

fn layout(rows: usize, cols: usize, fortran: bool) -> Layout {
    if fortran {
        Layout::fortran((rows, cols))
    } else {
        Layout::contiguous((rows, cols))
    }
}

fn run_nd<B: Backend, T: Element>(
    backend: &B,
    op: TransformOp,
    data: &[T],
    src_layout: &Layout,
    dst_layout: &Layout,
    params: &[T],
) -> Vec<T> {
    let src = backend.upload(data).unwrap();
    let mut dst = backend.zeros::<T>(dst_layout.elem_count()).unwrap();
    let outcome = backend
        .transform(op.opcode(), &src, src_layout, &mut dst, dst_layout, params)
        .unwrap();
    assert!(outcome.is_applied());
    backend.download(&dst).unwrap()
}

/// Like `run_nd` with a destination buffer of `dst_len` elements.
fn run_view<B: Backend, T: Element>(
    backend: &B,
    op: TransformOp,
    data: &[T],
    src_layout: &Layout,
    dst_layout: &Layout,
    dst_len: usize,
    params: &[T],
) -> Vec<T> {
    let src = backend.upload(data).unwrap();
    let mut dst = backend.zeros::<T>(dst_len).unwrap();
    backend
        .transform(op.opcode(), &src, src_layout, &mut dst, dst_layout, params)
        .unwrap();
    backend.download(&dst).unwrap()
}

fn run_linear<B: Backend, T: Element>(
    backend: &B,
    op: TransformOp,
    data: &[T],
    stride: usize,
    params: &[T],
) -> Vec<T> {
    let n = data.len().div_ceil(stride);
    let src = backend.upload(data).unwrap();
    let mut dst = backend.zeros::<T>(data.len()).unwrap();
    backend
        .transform_linear(op.opcode(), &src, stride, &mut dst, stride, params, n)
        .unwrap();
    backend.download(&dst).unwrap()
}

fn grid() -> GridDevice {
    GridDevice::new(ExecConfig::default().with_grid_dim(3).with_block_dim(4)).unwrap()
}

fn matrix_strategy() -> impl Strategy<Value = (usize, usize, bool, bool, Vec<f64>)> {
    (1usize..5, 1usize..7, any::<bool>(), any::<bool>()).prop_flat_map(|(r, c, sf, df)| {
        (
            Just(r),
            Just(c),
            Just(sf),
            Just(df),
            prop::collection::vec(-3.0f64..3.0, r * c),
        )
    })
}

/// How a `(rows, cols)` view sits in its buffer.
#[derive(Debug, Clone, Copy)]
struct ViewSpec {
    fortran: bool,
    transposed: bool,
    reversed: bool,
    offset: usize,
}

impl ViewSpec {
    /// The view, optionally transposed from a `(cols, rows)` buffer and
    /// walked backwards along its rows, plus the buffer length it needs.
    fn layout(self, rows: usize, cols: usize) -> (Layout, usize) {
        let order = if self.fortran { Order::F } else { Order::C };
        let base = if self.transposed {
            Layout::with_order((cols, rows), order).transpose(0, 1).unwrap()
        } else {
            Layout::with_order((rows, cols), order)
        };
        let mut strides = base.strides().to_vec();
        let mut start = self.offset as isize;
        if self.reversed {
            start += (rows as isize - 1) * strides[0];
            strides[0] = -strides[0];
        }
        let view = Layout::new((rows, cols), strides, start as usize, order).unwrap();
        (view, rows * cols + self.offset)
    }
}

fn view_spec() -> impl Strategy<Value = ViewSpec> {
    (any::<bool>(), any::<bool>(), any::<bool>(), 0usize..3).prop_map(
        |(fortran, transposed, reversed, offset)| ViewSpec {
            fortran,
            transposed,
            reversed,
            offset,
        },
    )
}

fn strided_strategy() -> impl Strategy<Value = (usize, usize, ViewSpec, ViewSpec, Vec<f64>)> {
    (1usize..5, 1usize..6, view_spec(), view_spec()).prop_flat_map(|(r, c, sv, dv)| {
        (
            Just(r),
            Just(c),
            Just(sv),
            Just(dv),
            prop::collection::vec(-3.0f64..3.0, r * c + sv.offset),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Every non-convolution opcode agrees bit-for-bit across substrates
    /// over mixed C/F layouts.
    #[test]
    fn prop_nd_parity_all_opcodes((rows, cols, src_f, dst_f, data) in matrix_strategy()) {
        let cpu = CpuBackend::default();
        let grid = grid();
        let sl = layout(rows, cols, src_f);
        let dl = layout(rows, cols, dst_f);
        for op in TransformOp::ALL.into_iter().filter(|op| !is_conv(*op)) {
            let params = params_for::<f64>(op);
            let host = run_nd(&cpu, op, &data, &sl, &dl, &params);
            let device = run_nd(&grid, op, &data, &sl, &dl, &params);
            prop_assert!(same_bits(&host, &device), "{op}: {host:?} vs {device:?}");
        }
    }

    /// Parity holds on transposed, offset and reversed views, where the host
    /// and the grid take different general paths.
    #[test]
    fn prop_strided_view_parity((rows, cols, sv, dv, data) in strided_strategy()) {
        let cpu = CpuBackend::default();
        let grid = grid();
        let (sl, _) = sv.layout(rows, cols);
        let (dl, dst_len) = dv.layout(rows, cols);
        for op in TransformOp::ALL.into_iter().filter(|op| !is_conv(*op)) {
            let params = params_for::<f64>(op);
            let host = run_view(&cpu, op, &data, &sl, &dl, dst_len, &params);
            let device = run_view(&grid, op, &data, &sl, &dl, dst_len, &params);
            prop_assert!(same_bits(&host, &device), "{op} {sv:?} -> {dv:?}: {host:?} vs {device:?}");
        }
    }

    /// Same check in f32, through the linear engine with a stride.
    #[test]
    fn prop_linear_parity_f32(
        data in prop::collection::vec(-3.0f32..3.0, 0..40),
        stride in 1usize..4,
    ) {
        let cpu = CpuBackend::default();
        let grid = grid();
        for op in TransformOp::ALL.into_iter().filter(|op| !is_conv(*op)) {
            let params = params_for::<f32>(op);
            let host = run_linear(&cpu, op, &data, stride, &params);
            let device = run_linear(&grid, op, &data, stride, &params);
            prop_assert!(same_bits(&host, &device), "{op}: {host:?} vs {device:?}");
        }
    }

    /// Index-driven execution agrees with the linear engine when both index
    /// arrays are the identity.
    #[test]
    fn prop_identity_indexes_match_linear(data in prop::collection::vec(-3.0f64..3.0, 1..32)) {
        let cpu = CpuBackend::default();
        let grid = grid();
        let identity: Vec<usize> = (0..data.len()).collect();
        for op in TransformOp::ALL.into_iter().filter(|op| !op.requires_special()) {
            let params = params_for::<f64>(op);
            let expected = run_linear(&cpu, op, &data, 1, &params);

            let src = cpu.upload(&data).unwrap();
            let mut dst = cpu.zeros::<f64>(data.len()).unwrap();
            cpu.transform_indexed(op.opcode(), &src, &identity, &mut dst, &identity, &params).unwrap();
            prop_assert!(same_bits(&expected, &dst));

            let src = grid.upload(&data).unwrap();
            let mut dst = grid.zeros::<f64>(data.len()).unwrap();
            grid.transform_indexed(op.opcode(), &src, &identity, &mut dst, &identity, &params).unwrap();
            prop_assert!(same_bits(&expected, &grid.download(&dst).unwrap()));
        }
    }

    /// Permuted index arrays scatter to the same positions on both substrates.
    #[test]
    fn prop_indexed_permutation_parity(
        data in prop::collection::vec(-3.0f64..3.0, 1..24),
        shift in 0usize..24,
    ) {
        let n = data.len();
        let src_idx: Vec<usize> = (0..n).map(|i| (i + shift) % n).collect();
        let dst_idx: Vec<usize> = (0..n).rev().collect();
        let op = TransformOp::Tanh;

        let cpu = CpuBackend::default();
        let mut host = vec![0.0f64; n];
        cpu.transform_indexed(op.opcode(), &data, &src_idx, &mut host, &dst_idx, &[]).unwrap();

        let grid = grid();
        let src = grid.upload(&data).unwrap();
        let mut dst = grid.zeros::<f64>(n).unwrap();
        grid.transform_indexed(op.opcode(), &src, &src_idx, &mut dst, &dst_idx, &[]).unwrap();
        prop_assert!(same_bits(&host, &grid.download(&dst).unwrap()));
    }
}

#[test]
fn test_parallel_host_matches_grid() -> Result<()> {
    init_tracing();
    // Threshold zero pushes every host job through rayon.
    let cpu = CpuBackend::new(ExecConfig::default().with_parallel_threshold(0))?;
    let grid = grid();
    let data: Vec<f64> = (0..257).map(|i| ((i * 37) % 101) as f64 / 17.0 - 3.0).collect();
    let sl = Layout::contiguous((1, 257));
    let dl = Layout::fortran((1, 257));
    for op in TransformOp::ALL.into_iter().filter(|op| !is_conv(*op)) {
        let params = params_for::<f64>(op);
        let host = run_nd(&cpu, op, &data, &sl, &dl, &params);
        let device = run_nd(&grid, op, &data, &sl, &dl, &params);
        assert!(same_bits(&host, &device), "{op}");
    }
    Ok(())
}

#[test]
fn test_softmax_rows_parity() -> Result<()> {
    let cpu = CpuBackend::default();
    let grid = grid();
    let data: Vec<f32> = (0..35).map(|i| (i as f32 * 0.7).sin() * 4.0).collect();
    let sl = Layout::contiguous((5, 7));
    let dl = Layout::fortran((5, 7));
    for op in [
        TransformOp::SoftMax,
        TransformOp::SoftMaxDerivative,
        TransformOp::LogSoftMax,
    ] {
        let host = run_nd(&cpu, op, &data, &sl, &dl, &[]);
        let device = run_nd(&grid, op, &data, &sl, &dl, &[]);
        assert!(same_bits(&host, &device), "{op}");
    }

    // Each softmax row sums to one.
    let host = run_nd(&cpu, TransformOp::SoftMax, &data, &sl, &sl, &[]);
    for row in host.chunks(7) {
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn test_is_max_along_dims_parity() -> Result<()> {
    let cpu = CpuBackend::default();
    let grid = grid();
    let data = vec![3.0f64, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0, 5.0, 3.0, 5.0, 8.0];
    let l = Layout::contiguous((3, 4));
    // Segments span dim 0: arg-max per column, first maximum wins.
    let params = [1.0, 0.0];
    let host = run_nd(&cpu, TransformOp::IsMax, &data, &l, &l, &params);
    let device = run_nd(&grid, TransformOp::IsMax, &data, &l, &l, &params);
    assert_eq!(host, device);
    assert_eq!(
        host,
        vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]
    );
    Ok(())
}

#[test]
fn test_im2col_col2im_parity() -> Result<()> {
    let cpu = CpuBackend::default();
    let grid = grid();
    let image: Vec<f32> = (0..2 * 2 * 4 * 5).map(|i| i as f32 * 0.5 - 7.0).collect();
    let il = Layout::contiguous((2, 2, 4, 5));
    // 3x2 kernel, stride (1, 2), padding (1, 1): oh = 4, ow = 3.
    let cl = Layout::contiguous(vec![2, 2, 3, 2, 4, 3]);
    let im2col = [3.0f32, 2.0, 1.0, 2.0, 1.0, 1.0];
    let host = run_nd(&cpu, TransformOp::Im2col, &image, &il, &cl, &im2col);
    let device = run_nd(&grid, TransformOp::Im2col, &image, &il, &cl, &im2col);
    assert!(same_bits(&host, &device));

    let col2im = [1.0f32, 2.0, 1.0, 1.0, 4.0, 5.0];
    let back_host = run_nd(&cpu, TransformOp::Col2Im, &host, &cl, &il, &col2im);
    let back_device = run_nd(&grid, TransformOp::Col2Im, &host, &cl, &il, &col2im);
    assert!(same_bits(&back_host, &back_device));
    Ok(())
}

#[test]
fn test_half_precision_parity() -> Result<()> {
    let cpu = CpuBackend::default();
    let grid = grid();
    let l = Layout::contiguous((3, 3));
    let f16: Vec<half::f16> = (0..9).map(|i| half::f16::from_f32(i as f32 * 0.4 - 1.5)).collect();
    let bf16: Vec<half::bf16> = (0..9).map(|i| half::bf16::from_f32(i as f32 * 0.4 - 1.5)).collect();
    for op in TransformOp::ALL.into_iter().filter(|op| !is_conv(*op)) {
        let params = params_for::<half::f16>(op);
        let host = run_nd(&cpu, op, &f16, &l, &l, &params);
        let device = run_nd(&grid, op, &f16, &l, &l, &params);
        assert!(same_bits(&host, &device), "f16 {op}");

        let params = params_for::<half::bf16>(op);
        let host = run_nd(&cpu, op, &bf16, &l, &l, &params);
        let device = run_nd(&grid, op, &bf16, &l, &l, &params);
        assert!(same_bits(&host, &device), "bf16 {op}");
    }
    Ok(())
}

#[test]
fn test_unknown_opcode_parity() -> Result<()> {
    let cpu = CpuBackend::default();
    let grid = grid();
    let data = vec![1.0f64, -2.0, 3.0];
    let l = Layout::contiguous(3);

    let mut host = vec![9.0f64; 3];
    let (outcome, warns) = warnings_during(|| cpu.transform(999, &data, &l, &mut host, &l, &[]));
    assert_eq!(outcome?, Dispatch::UnknownOpcode(999));
    assert_eq!(warns, 1);
    let (outcome, warns) =
        warnings_during(|| cpu.transform_indexed(999, &data, &[0, 1], &mut host, &[2, 1], &[]));
    assert_eq!(outcome?, Dispatch::UnknownOpcode(999));
    assert_eq!(warns, 1);
    assert_eq!(host, vec![9.0; 3]);

    let src = grid.upload(&data)?;
    let mut dst = grid.upload(&[9.0f64; 3])?;
    let (outcome, warns) = warnings_during(|| grid.transform(999, &src, &l, &mut dst, &l, &[]));
    assert_eq!(outcome?, Dispatch::UnknownOpcode(999));
    assert_eq!(warns, 1);
    let (outcome, warns) = warnings_during(|| grid.transform_linear(999, &src, 1, &mut dst, 1, &[], 3));
    assert_eq!(outcome?, Dispatch::UnknownOpcode(999));
    assert_eq!(warns, 1);
    assert_eq!(grid.download(&dst)?, vec![9.0; 3]);
    Ok(())
}

#[test]
fn test_zero_length_is_noop() -> Result<()> {
    let cpu = CpuBackend::default();
    let grid = grid();
    let empty: Vec<f32> = Vec::new();
    let l = Layout::contiguous((0, 4));
    let ((), warns) = warnings_during(|| {
        for op in [TransformOp::Exp, TransformOp::SoftMax, TransformOp::IsMax] {
            assert!(run_nd(&cpu, op, &empty, &l, &l, &[]).is_empty());
            assert!(run_nd(&grid, op, &empty, &l, &l, &[]).is_empty());
            assert!(run_linear(&cpu, op, &empty, 1, &[]).is_empty());
            assert!(run_linear(&grid, op, &empty, 1, &[]).is_empty());
        }
    });
    assert_eq!(warns, 0);
    Ok(())
}
