use crate::shape::Shape;

/// All errors that can occur within strand.
///
/// Engines validate descriptors, buffers and index arrays before touching
/// memory, so every failure surfaces here instead of as a panic. An unknown
/// opcode is deliberately *not* an error: it is reported through
/// [`crate::Dispatch::UnknownOpcode`] and a `tracing` warning.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source and destination descriptors disagree on the logical shape.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// A descriptor has the wrong number of dimensions for the call.
    #[error("expected a rank-{expected} descriptor, got rank {got}")]
    RankMismatch { expected: usize, got: usize },

    /// Dimension index out of range for the array's rank.
    #[error("dimension out of range: dim {dim} for array with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// Rank exceeds the fixed coordinate scratch capacity.
    #[error("rank {rank} exceeds the maximum supported rank {max}")]
    RankTooLarge { rank: usize, max: usize },

    /// A slab `start..start + len` does not fit the extent of `dim`.
    #[error("slab of {len} from {start} exceeds extent {dim_size} of dim {dim}")]
    NarrowOutOfBounds {
        dim: usize,
        start: usize,
        len: usize,
        dim_size: usize,
    },

    /// A descriptor or stride reaches outside the buffer it describes.
    #[error("buffer too small: access spans {required} elements, buffer holds {len}")]
    BufferTooSmall { required: usize, len: usize },

    /// A layout with a negative stride would address before the buffer start.
    #[error("layout addresses offset {offset} before the start of its buffer")]
    NegativeOffset { offset: isize },

    /// An index array entry points outside its buffer.
    #[error("index {index} at position {position} is out of bounds for buffer of {len}")]
    IndexOutOfBounds {
        index: usize,
        position: usize,
        len: usize,
    },

    /// Source and destination index arrays differ in length.
    #[error("index arrays differ in length: {src} source vs {dst} destination")]
    IndexLengthMismatch { src: usize, dst: usize },

    /// A stride of zero was given to the linear engine.
    #[error("stride must be at least 1")]
    ZeroStride,

    /// The operation needs more extra parameters than were supplied.
    #[error("{op} requires {required} extra parameter(s), got {got}")]
    MissingParams {
        op: &'static str,
        required: usize,
        got: usize,
    },

    /// Extra parameter has a value the operation cannot use.
    #[error("invalid parameter for {op}: {msg}")]
    InvalidParam { op: &'static str, msg: String },

    /// Whole-array operations have no per-index meaning.
    #[error("{op} needs whole-array context and cannot run through index arrays")]
    NotIndexable { op: &'static str },

    /// A concatenation source disagrees with the destination off the axis.
    #[error(
        "concat shape mismatch: source {source_index} has shape {got}, destination is {expected} along dim {dim}"
    )]
    ConcatShapeMismatch {
        source_index: usize,
        expected: Shape,
        got: Shape,
        dim: usize,
    },

    /// Row-stacked vectors must all have the destination's row length.
    #[error("row stack: source {source_index} has length {got}, rows hold {expected}")]
    ConcatRowLength {
        source_index: usize,
        expected: usize,
        got: usize,
    },

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
