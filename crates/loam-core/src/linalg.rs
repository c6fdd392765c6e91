use crate::array::NdArray;
use crate::error::{Error, Result};

impl NdArray {
    /// Matrix product of two rank-2 arrays: `[m, k] @ [k, n] -> [m, n]`.
    ///
    /// Classic triple loop; no batching, no transposition tricks.
    pub fn matmul(&self, other: &NdArray) -> Result<NdArray> {
        if self.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: self.rank(),
            });
        }
        if other.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: other.rank(),
            });
        }

        let (m, k1) = (self.dims()[0], self.dims()[1]);
        let (k2, n) = (other.dims()[0], other.dims()[1]);
        if k1 != k2 {
            return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
        }

        let mut out = vec![0f32; m * n];
        NdArray::with_data2(self, other, |a, b| {
            for i in 0..m {
                for k in 0..n {
                    let mut s = 0.0;
                    for j in 0..k1 {
                        s += a[i * k1 + j] * b[j * n + k];
                    }
                    out[i * n + k] = s;
                }
            }
        });
        NdArray::make((m, n), out)
    }
}
