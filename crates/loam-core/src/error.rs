use crate::shape::Shape;

/// All errors that can occur within loam.
///
/// Every failure mode in the workspace is a programmer error: a shape that
/// cannot broadcast, trees that disagree structurally, a path that misses a
/// leaf. They are detected eagerly at the point of violation and propagated
/// immediately; nothing is retried or silently coerced.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two shapes were required to be identical and are not.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Operation requires a specific rank (number of dimensions).
    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// Buffer length does not match the product of the shape.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Cannot reshape because element counts differ.
    #[error("cannot reshape {src} elements into shape {dst_shape} ({dst} elements)")]
    ReshapeElementMismatch {
        src: usize,
        dst: usize,
        dst_shape: Shape,
    },

    /// Two shapes are not compatible under the trailing-axis broadcast rule.
    #[error("shapes {lhs} and {rhs} are not broadcast-compatible (dim {axis} from the right)")]
    BroadcastIncompatible { lhs: Shape, rhs: Shape, axis: usize },

    /// Matrix multiplication inner dimensions do not match.
    #[error("matmul shape mismatch: [{m}x{k1}] @ [{k2}x{n}], inner dims must match")]
    MatmulShapeMismatch {
        m: usize,
        k1: usize,
        k2: usize,
        n: usize,
    },

    /// Axis index outside `[-rank, rank)`.
    #[error("axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: isize, rank: usize },

    /// Element index outside a dimension.
    #[error("index {index} out of range for dimension of size {dim_size}")]
    IndexOutOfRange { index: usize, dim_size: usize },

    /// Leading-axis slice outside the array.
    #[error("slice [{start}, {end}) out of bounds for leading dimension {dim_size}")]
    SliceOutOfBounds {
        start: usize,
        end: usize,
        dim_size: usize,
    },

    /// Tried to read a single item from a non-scalar array.
    #[error("not a scalar: array has shape {shape}")]
    NotAScalar { shape: Shape },

    /// A token/label id is not a non-negative integer below the table size.
    #[error("invalid token id {value} for table of {vocab} entries")]
    InvalidTokenId { value: f64, vocab: usize },

    /// Trees passed to a structural operation disagree in variant, length,
    /// or key set.
    #[error("tree structure mismatch: expected {expected}, got {got}")]
    StructureMismatch { expected: String, got: String },

    /// A path does not resolve to exactly one leaf.
    #[error("path {path} does not address a leaf")]
    InvalidPath { path: String },

    /// A layer's backward was called more times than its forward.
    #[error("backward called with an empty tape in {layer}")]
    EmptyTape { layer: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout loam.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
