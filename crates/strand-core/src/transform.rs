use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::special::SpecialKind;

// Transform catalogue — opcode → per-element operation
//
// Callers pick an operation by integer opcode. The ordinals below are part of
// the external contract: they are never renumbered, and new operations are
// only ever appended.
//
// Every operation is a zero-sized type implementing `Transform`. Engines are
// written once, generic over `O: Transform`, and `dispatch_transform!` turns
// a runtime `TransformOp` into the matching monomorphic call. The host and
// the grid substrate both dispatch through that one macro, which is what
// keeps their per-element math identical.
//
// Operations flagged `REQUIRES_SPECIAL` (softmax family, arg-max, im2col and
// col2im) need a whole array or a whole dimension to produce an element.
// Their `op` is the identity and engines route them to the routines in
// `special.rs` instead of the per-element loop.

/// Closed enumeration of transform opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum TransformOp {
    Abs = 0,
    Ceiling = 1,
    Cosine = 2,
    Exp = 3,
    Floor = 4,
    Log = 5,
    Neg = 6,
    Pow = 7,
    Round = 8,
    SetRange = 9,
    Sigmoid = 10,
    Sign = 11,
    Sin = 12,
    SoftPlus = 13,
    Sqrt = 14,
    Tanh = 15,
    ACos = 16,
    ASin = 17,
    ATan = 18,
    HardTanh = 19,
    SoftSign = 20,
    Elu = 21,
    EluDerivative = 22,
    TanhDerivative = 23,
    TimesOneMinus = 24,
    HardTanhDerivative = 25,
    Ones = 26,
    Identity = 27,
    Stabilize = 28,
    SigmoidDerivative = 29,
    SoftSignDerivative = 30,
    LeakyRelu = 31,
    LeakyReluDerivative = 32,
    Relu = 33,
    Step = 34,
    OneMinus = 35,
    Col2Im = 36,
    Im2col = 37,
    SoftMax = 38,
    SoftMaxDerivative = 39,
    LogSoftMax = 40,
    IsMax = 41,
    SpecialDerivative = 42,
}

/// Result of dispatching an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The operation ran (possibly over zero elements).
    Applied,
    /// The opcode is not in the catalogue; the destination was not touched.
    UnknownOpcode(i32),
}

impl Dispatch {
    pub fn is_applied(&self) -> bool {
        matches!(self, Dispatch::Applied)
    }
}

impl TransformOp {
    /// Every operation, indexed by opcode.
    pub const ALL: [TransformOp; 43] = [
        TransformOp::Abs,
        TransformOp::Ceiling,
        TransformOp::Cosine,
        TransformOp::Exp,
        TransformOp::Floor,
        TransformOp::Log,
        TransformOp::Neg,
        TransformOp::Pow,
        TransformOp::Round,
        TransformOp::SetRange,
        TransformOp::Sigmoid,
        TransformOp::Sign,
        TransformOp::Sin,
        TransformOp::SoftPlus,
        TransformOp::Sqrt,
        TransformOp::Tanh,
        TransformOp::ACos,
        TransformOp::ASin,
        TransformOp::ATan,
        TransformOp::HardTanh,
        TransformOp::SoftSign,
        TransformOp::Elu,
        TransformOp::EluDerivative,
        TransformOp::TanhDerivative,
        TransformOp::TimesOneMinus,
        TransformOp::HardTanhDerivative,
        TransformOp::Ones,
        TransformOp::Identity,
        TransformOp::Stabilize,
        TransformOp::SigmoidDerivative,
        TransformOp::SoftSignDerivative,
        TransformOp::LeakyRelu,
        TransformOp::LeakyReluDerivative,
        TransformOp::Relu,
        TransformOp::Step,
        TransformOp::OneMinus,
        TransformOp::Col2Im,
        TransformOp::Im2col,
        TransformOp::SoftMax,
        TransformOp::SoftMaxDerivative,
        TransformOp::LogSoftMax,
        TransformOp::IsMax,
        TransformOp::SpecialDerivative,
    ];

    /// Look up an opcode. Returns `None` for values outside the catalogue.
    pub fn from_opcode(opcode: i32) -> Option<TransformOp> {
        usize::try_from(opcode)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn opcode(self) -> i32 {
        self as u32 as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            TransformOp::Abs => "abs",
            TransformOp::Ceiling => "ceiling",
            TransformOp::Cosine => "cosine",
            TransformOp::Exp => "exp",
            TransformOp::Floor => "floor",
            TransformOp::Log => "log",
            TransformOp::Neg => "neg",
            TransformOp::Pow => "pow",
            TransformOp::Round => "round",
            TransformOp::SetRange => "set_range",
            TransformOp::Sigmoid => "sigmoid",
            TransformOp::Sign => "sign",
            TransformOp::Sin => "sin",
            TransformOp::SoftPlus => "softplus",
            TransformOp::Sqrt => "sqrt",
            TransformOp::Tanh => "tanh",
            TransformOp::ACos => "acos",
            TransformOp::ASin => "asin",
            TransformOp::ATan => "atan",
            TransformOp::HardTanh => "hard_tanh",
            TransformOp::SoftSign => "softsign",
            TransformOp::Elu => "elu",
            TransformOp::EluDerivative => "elu_derivative",
            TransformOp::TanhDerivative => "tanh_derivative",
            TransformOp::TimesOneMinus => "times_one_minus",
            TransformOp::HardTanhDerivative => "hard_tanh_derivative",
            TransformOp::Ones => "ones",
            TransformOp::Identity => "identity",
            TransformOp::Stabilize => "stabilize",
            TransformOp::SigmoidDerivative => "sigmoid_derivative",
            TransformOp::SoftSignDerivative => "softsign_derivative",
            TransformOp::LeakyRelu => "leaky_relu",
            TransformOp::LeakyReluDerivative => "leaky_relu_derivative",
            TransformOp::Relu => "relu",
            TransformOp::Step => "step",
            TransformOp::OneMinus => "one_minus",
            TransformOp::Col2Im => "col2im",
            TransformOp::Im2col => "im2col",
            TransformOp::SoftMax => "softmax",
            TransformOp::SoftMaxDerivative => "softmax_derivative",
            TransformOp::LogSoftMax => "log_softmax",
            TransformOp::IsMax => "is_max",
            TransformOp::SpecialDerivative => "special_derivative",
        }
    }

    /// Whether this operation needs whole-array context.
    pub fn requires_special(self) -> bool {
        crate::dispatch_transform!(self, O => O::REQUIRES_SPECIAL)
    }

    /// The whole-array routine for special operations.
    pub fn special_kind(self) -> Option<SpecialKind> {
        crate::dispatch_transform!(self, O => O::SPECIAL)
    }

    /// Minimum number of extra parameters the operation reads.
    pub fn required_params(self) -> usize {
        crate::dispatch_transform!(self, O => O::PARAMS)
    }

    /// Fail with `MissingParams` if `got` parameters are not enough.
    pub fn check_params(self, got: usize) -> Result<()> {
        let required = self.required_params();
        if got < required {
            return Err(Error::MissingParams {
                op: self.name(),
                required,
                got,
            });
        }
        Ok(())
    }

    /// Evaluate the per-element form of this operation on one value.
    pub fn apply<T: Element>(self, x: T, params: &[T]) -> T {
        crate::dispatch_transform!(self, O => O::op(x, params))
    }
}

impl std::fmt::Display for TransformOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.opcode())
    }
}

/// Resolve an opcode, emitting a diagnostic for unknown values.
pub fn resolve(opcode: i32) -> Option<TransformOp> {
    let op = TransformOp::from_opcode(opcode);
    if op.is_none() {
        tracing::warn!(opcode, "unknown transform opcode, destination left untouched");
    }
    op
}

/// A per-element operation selected at compile time.
pub trait Transform: Copy + Default + Send + Sync + 'static {
    /// Catalogue entry this type implements.
    const OP: TransformOp;
    /// Whole-array routine, for operations that need one.
    const SPECIAL: Option<SpecialKind> = None;
    /// True when `op` alone cannot produce the result.
    const REQUIRES_SPECIAL: bool = Self::SPECIAL.is_some();
    /// Minimum number of extra parameters read by `op` or the special routine.
    const PARAMS: usize = 0;

    /// Map one input element. Must be pure: engines may evaluate elements
    /// in any order and on any thread.
    fn op<T: Element>(x: T, params: &[T]) -> T;
}

/// Map a runtime [`TransformOp`] to its implementing type.
///
/// ```ignore
/// let y = dispatch_transform!(op, O => O::op(x, params));
/// ```
#[macro_export]
macro_rules! dispatch_transform {
    ($op:expr, $O:ident => $body:expr) => {
        match $op {
            $crate::transform::TransformOp::Abs => {
                type $O = $crate::transform::ops::Abs;
                $body
            }
            $crate::transform::TransformOp::Ceiling => {
                type $O = $crate::transform::ops::Ceiling;
                $body
            }
            $crate::transform::TransformOp::Cosine => {
                type $O = $crate::transform::ops::Cosine;
                $body
            }
            $crate::transform::TransformOp::Exp => {
                type $O = $crate::transform::ops::Exp;
                $body
            }
            $crate::transform::TransformOp::Floor => {
                type $O = $crate::transform::ops::Floor;
                $body
            }
            $crate::transform::TransformOp::Log => {
                type $O = $crate::transform::ops::Log;
                $body
            }
            $crate::transform::TransformOp::Neg => {
                type $O = $crate::transform::ops::Neg;
                $body
            }
            $crate::transform::TransformOp::Pow => {
                type $O = $crate::transform::ops::Pow;
                $body
            }
            $crate::transform::TransformOp::Round => {
                type $O = $crate::transform::ops::Round;
                $body
            }
            $crate::transform::TransformOp::SetRange => {
                type $O = $crate::transform::ops::SetRange;
                $body
            }
            $crate::transform::TransformOp::Sigmoid => {
                type $O = $crate::transform::ops::Sigmoid;
                $body
            }
            $crate::transform::TransformOp::Sign => {
                type $O = $crate::transform::ops::Sign;
                $body
            }
            $crate::transform::TransformOp::Sin => {
                type $O = $crate::transform::ops::Sin;
                $body
            }
            $crate::transform::TransformOp::SoftPlus => {
                type $O = $crate::transform::ops::SoftPlus;
                $body
            }
            $crate::transform::TransformOp::Sqrt => {
                type $O = $crate::transform::ops::Sqrt;
                $body
            }
            $crate::transform::TransformOp::Tanh => {
                type $O = $crate::transform::ops::Tanh;
                $body
            }
            $crate::transform::TransformOp::ACos => {
                type $O = $crate::transform::ops::ACos;
                $body
            }
            $crate::transform::TransformOp::ASin => {
                type $O = $crate::transform::ops::ASin;
                $body
            }
            $crate::transform::TransformOp::ATan => {
                type $O = $crate::transform::ops::ATan;
                $body
            }
            $crate::transform::TransformOp::HardTanh => {
                type $O = $crate::transform::ops::HardTanh;
                $body
            }
            $crate::transform::TransformOp::SoftSign => {
                type $O = $crate::transform::ops::SoftSign;
                $body
            }
            $crate::transform::TransformOp::Elu => {
                type $O = $crate::transform::ops::Elu;
                $body
            }
            $crate::transform::TransformOp::EluDerivative => {
                type $O = $crate::transform::ops::EluDerivative;
                $body
            }
            $crate::transform::TransformOp::TanhDerivative => {
                type $O = $crate::transform::ops::TanhDerivative;
                $body
            }
            $crate::transform::TransformOp::TimesOneMinus => {
                type $O = $crate::transform::ops::TimesOneMinus;
                $body
            }
            $crate::transform::TransformOp::HardTanhDerivative => {
                type $O = $crate::transform::ops::HardTanhDerivative;
                $body
            }
            $crate::transform::TransformOp::Ones => {
                type $O = $crate::transform::ops::Ones;
                $body
            }
            $crate::transform::TransformOp::Identity => {
                type $O = $crate::transform::ops::Identity;
                $body
            }
            $crate::transform::TransformOp::Stabilize => {
                type $O = $crate::transform::ops::Stabilize;
                $body
            }
            $crate::transform::TransformOp::SigmoidDerivative => {
                type $O = $crate::transform::ops::SigmoidDerivative;
                $body
            }
            $crate::transform::TransformOp::SoftSignDerivative => {
                type $O = $crate::transform::ops::SoftSignDerivative;
                $body
            }
            $crate::transform::TransformOp::LeakyRelu => {
                type $O = $crate::transform::ops::LeakyRelu;
                $body
            }
            $crate::transform::TransformOp::LeakyReluDerivative => {
                type $O = $crate::transform::ops::LeakyReluDerivative;
                $body
            }
            $crate::transform::TransformOp::Relu => {
                type $O = $crate::transform::ops::Relu;
                $body
            }
            $crate::transform::TransformOp::Step => {
                type $O = $crate::transform::ops::Step;
                $body
            }
            $crate::transform::TransformOp::OneMinus => {
                type $O = $crate::transform::ops::OneMinus;
                $body
            }
            $crate::transform::TransformOp::Col2Im => {
                type $O = $crate::transform::ops::Col2Im;
                $body
            }
            $crate::transform::TransformOp::Im2col => {
                type $O = $crate::transform::ops::Im2col;
                $body
            }
            $crate::transform::TransformOp::SoftMax => {
                type $O = $crate::transform::ops::SoftMax;
                $body
            }
            $crate::transform::TransformOp::SoftMaxDerivative => {
                type $O = $crate::transform::ops::SoftMaxDerivative;
                $body
            }
            $crate::transform::TransformOp::LogSoftMax => {
                type $O = $crate::transform::ops::LogSoftMax;
                $body
            }
            $crate::transform::TransformOp::IsMax => {
                type $O = $crate::transform::ops::IsMax;
                $body
            }
            $crate::transform::TransformOp::SpecialDerivative => {
                type $O = $crate::transform::ops::SpecialDerivative;
                $body
            }
        }
    };
}

#[inline(always)]
fn lit<T: Element>(v: f64) -> T {
    T::from_f64(v)
}

#[inline(always)]
fn param_or<T: Element>(params: &[T], i: usize, default: f64) -> T {
    params.get(i).copied().unwrap_or_else(|| lit(default))
}

#[inline(always)]
fn sigmoid<T: Element>(x: T) -> T {
    T::one() / (T::one() + (-x).exp())
}

macro_rules! unary_transform {
    ($(#[$meta:meta])* $name:ident, |$x:ident, $p:pat_param| $body:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Transform for $name {
            const OP: TransformOp = TransformOp::$name;

            #[inline(always)]
            fn op<T: Element>($x: T, $p: &[T]) -> T {
                $body
            }
        }
    };
}

macro_rules! special_transform {
    ($(#[$meta:meta])* $name:ident, $kind:ident, $params:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Transform for $name {
            const OP: TransformOp = TransformOp::$name;
            const SPECIAL: Option<SpecialKind> = Some(SpecialKind::$kind);
            const PARAMS: usize = $params;

            #[inline(always)]
            fn op<T: Element>(x: T, _params: &[T]) -> T {
                x
            }
        }
    };
}

/// One type per catalogue entry.
pub mod ops {
    use super::{lit, param_or, sigmoid, SpecialKind, Transform, TransformOp};
    use crate::dtype::Element;

    /// Lower clamp bound used by `Stabilize`.
    pub const MIN_CUTOFF: f64 = -3.79297773665;

    unary_transform!(Abs, |x, _| x.abs());
    unary_transform!(Ceiling, |x, _| x.ceil());
    unary_transform!(Cosine, |x, _| x.cos());
    unary_transform!(Exp, |x, _| x.exp());
    unary_transform!(Floor, |x, _| x.floor());
    unary_transform!(Log, |x, _| x.ln());
    unary_transform!(Neg, |x, _| -x);

    /// `x ^ params[0]`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Pow;

    impl Transform for Pow {
        const OP: TransformOp = TransformOp::Pow;
        const PARAMS: usize = 1;

        #[inline(always)]
        fn op<T: Element>(x: T, params: &[T]) -> T {
            x.powf(param_or(params, 0, 1.0))
        }
    }

    /// Round half away from zero.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Round;

    impl Transform for Round {
        const OP: TransformOp = TransformOp::Round;

        #[inline(always)]
        fn op<T: Element>(x: T, _params: &[T]) -> T {
            x.round()
        }
    }

    /// Values inside `[params[0], params[1]]` pass through; anything else is
    /// folded back with `floor(v * (max - min)) + min`, where `v` is the
    /// sigmoid of `x` for the unit range and `x` itself otherwise.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SetRange;

    impl Transform for SetRange {
        const OP: TransformOp = TransformOp::SetRange;
        const PARAMS: usize = 2;

        #[inline(always)]
        fn op<T: Element>(x: T, params: &[T]) -> T {
            let (min, max) = (param_or(params, 0, 0.0), param_or(params, 1, 1.0));
            if x >= min && x <= max {
                return x;
            }
            let v = if min == T::zero() && max == T::one() {
                sigmoid(x)
            } else {
                x
            };
            (v * (max - min)).floor() + min
        }
    }

    unary_transform!(Sigmoid, |x, _| sigmoid(x));
    unary_transform!(
        /// `(x > 0) - (x < 0)`; NaN maps to zero.
        Sign,
        |x, _| {
            if x > T::zero() {
                T::one()
            } else if x < T::zero() {
                -T::one()
            } else {
                T::zero()
            }
        }
    );
    unary_transform!(Sin, |x, _| x.sin());
    unary_transform!(SoftPlus, |x, _| (T::one() + x.exp()).ln());
    unary_transform!(Sqrt, |x, _| x.sqrt());
    unary_transform!(Tanh, |x, _| x.tanh());
    unary_transform!(ACos, |x, _| x.acos());
    unary_transform!(ASin, |x, _| x.asin());
    unary_transform!(ATan, |x, _| x.atan());
    unary_transform!(
        /// Clamp to [-1, 1].
        HardTanh,
        |x, _| {
            if x < -T::one() {
                -T::one()
            } else if x > T::one() {
                T::one()
            } else {
                x
            }
        }
    );
    unary_transform!(SoftSign, |x, _| x / (T::one() + x.abs()));
    unary_transform!(Elu, |x, _| if x >= T::zero() {
        x
    } else {
        x.exp() - T::one()
    });
    unary_transform!(EluDerivative, |x, _| if x >= T::zero() {
        T::one()
    } else {
        x.exp()
    });
    unary_transform!(TanhDerivative, |x, _| {
        let t = x.tanh();
        T::one() - t * t
    });
    unary_transform!(TimesOneMinus, |x, _| x * (T::one() - x));
    unary_transform!(HardTanhDerivative, |x, _| if x >= -T::one() && x <= T::one() {
        T::one()
    } else {
        T::zero()
    });
    unary_transform!(Ones, |_x, _| T::one());
    unary_transform!(Identity, |x, _| x);

    /// Keeps `x * params[0]` inside ±3.79 so later exponentials stay finite.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Stabilize;

    impl Transform for Stabilize {
        const OP: TransformOp = TransformOp::Stabilize;
        const PARAMS: usize = 1;

        #[inline(always)]
        fn op<T: Element>(x: T, params: &[T]) -> T {
            let k = param_or(params, 0, 1.0);
            let cutoff: T = lit(MIN_CUTOFF);
            if x * k > -cutoff {
                -cutoff / k
            } else if x * k < cutoff {
                cutoff / k
            } else {
                x
            }
        }
    }

    unary_transform!(SigmoidDerivative, |x, _| {
        let s = sigmoid(x);
        s * (T::one() - s)
    });
    unary_transform!(SoftSignDerivative, |x, _| {
        let d = T::one() + x.abs();
        T::one() / (d * d)
    });
    unary_transform!(
        /// Slope `params[0]` (default 0.01) below zero.
        LeakyRelu,
        |x, p| if x < T::zero() {
            param_or(p, 0, 0.01) * x
        } else {
            x
        }
    );
    unary_transform!(LeakyReluDerivative, |x, p| if x >= T::zero() {
        T::one()
    } else {
        param_or(p, 0, 0.01)
    });
    unary_transform!(
        /// `max(x, params[0])`, cutoff defaults to zero.
        Relu,
        |x, p| {
            let cutoff = param_or(p, 0, 0.0);
            if x < cutoff {
                cutoff
            } else {
                x
            }
        }
    );
    unary_transform!(Step, |x, p| if x > param_or(p, 0, 0.0) {
        T::one()
    } else {
        T::zero()
    });
    unary_transform!(OneMinus, |x, _| T::one() - x);

    special_transform!(
        /// Fold `[n, c, kh, kw, oh, ow]` columns back into `[n, c, h, w]`.
        /// Params: `[sy, sx, ph, pw, h, w]`.
        Col2Im,
        Col2Im,
        6
    );
    special_transform!(
        /// Unfold `[n, c, h, w]` into `[n, c, kh, kw, oh, ow]` columns.
        /// Params: `[kh, kw, sy, sx, ph, pw]`.
        Im2col,
        Im2col,
        6
    );
    special_transform!(SoftMax, SoftMax, 0);
    special_transform!(SoftMaxDerivative, SoftMaxDerivative, 0);
    special_transform!(LogSoftMax, LogSoftMax, 0);
    special_transform!(
        /// 1 at the first maximum of each segment, 0 elsewhere.
        /// Params: empty for the whole array, or `[k, d0, .., dk-1]`.
        IsMax,
        IsMax,
        0
    );

    unary_transform!(
        /// Blockwise softmax derivative on already-normalised input.
        SpecialDerivative,
        |x, _| x * (T::one() - x)
    );
}
