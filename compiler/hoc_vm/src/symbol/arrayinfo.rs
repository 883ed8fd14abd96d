//! Array shapes.

use smallvec::SmallVec;

use crate::errors::{array_too_large, subscript_below_one, subscript_out_of_range, ExecResult};

/// Dimensions of an array variable, outermost first.
///
/// A shape is shared (`Rc<Arrayinfo>`) between the symbol that declared it and
/// the data slots allocated from it; redeclaring the array installs a new
/// shape rather than mutating the shared one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Arrayinfo {
    dims: SmallVec<[usize; 4]>,
}

impl Arrayinfo {
    /// Largest element count a single array may hold.
    pub const MAX_TOTAL: usize = 2_000_000_000;

    /// Build a shape from declared sizes as they come off the stack.
    ///
    /// Each size is `floor(x + epsilon)`; sizes below 1 and totals above
    /// [`Arrayinfo::MAX_TOTAL`] are rejected.
    pub fn from_sizes(name: &str, sizes: &[f64], epsilon: f64) -> ExecResult<Self> {
        let mut dims = SmallVec::new();
        let mut total = 1.0f64;
        for &size in sizes {
            let dim = (size + epsilon).floor();
            if dim.is_nan() || dim < 1.0 {
                return Err(subscript_below_one(name));
            }
            total *= dim;
            if total > 2e9 {
                return Err(array_too_large(name));
            }
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "dim is in 1..=2e9"
            )]
            let dim = dim as usize;
            dims.push(dim);
        }
        Ok(Arrayinfo { dims })
    }

    /// Build a shape from exact dimensions (host arrays, native properties).
    pub fn from_dims(name: &str, dims: &[usize]) -> ExecResult<Self> {
        let mut total: usize = 1;
        for &dim in dims {
            if dim == 0 {
                return Err(subscript_below_one(name));
            }
            total = total
                .checked_mul(dim)
                .filter(|t| *t <= Self::MAX_TOTAL)
                .ok_or_else(|| array_too_large(name))?;
        }
        Ok(Arrayinfo {
            dims: dims.iter().copied().collect(),
        })
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of subscripts.
    #[inline]
    pub fn nsub(&self) -> usize {
        self.dims.len()
    }

    /// Number of elements.
    pub fn total(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major element index for the given subscripts, outermost first.
    ///
    /// Each subscript is truncated after adding `epsilon`, so `2.9999999999999`
    /// selects element 3.
    pub fn flat_index(&self, name: &str, subs: &[f64], epsilon: f64) -> ExecResult<usize> {
        if subs.len() != self.dims.len() {
            return Err(subscript_out_of_range(name));
        }
        let mut flat = 0usize;
        for (&sub, &dim) in subs.iter().zip(self.dims.iter()) {
            // trunc(-0.99..) is -0.0, which would pass the range check
            if sub + epsilon < 0.0 {
                return Err(subscript_out_of_range(name));
            }
            let sub = (sub + epsilon).trunc();
            #[allow(
                clippy::cast_precision_loss,
                reason = "dims are at most 2e9, exact in f64"
            )]
            let in_range = sub >= 0.0 && sub < dim as f64;
            if !in_range {
                return Err(subscript_out_of_range(name));
            }
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "checked against dim above"
            )]
            let sub = sub as usize;
            flat = flat * dim + sub;
        }
        Ok(flat)
    }

    /// Subscripts of a flat element index; inverse of [`Arrayinfo::flat_index`].
    pub fn subscripts(&self, mut flat: usize) -> SmallVec<[usize; 4]> {
        let mut subs: SmallVec<[usize; 4]> = SmallVec::from_elem(0, self.dims.len());
        for (slot, &dim) in subs.iter_mut().zip(self.dims.iter()).rev() {
            *slot = flat % dim;
            flat /= dim;
        }
        subs
    }

    /// `name[i][j]` for a flat element index.
    pub fn element_name(&self, name: &str, flat: usize) -> String {
        let mut out = name.to_string();
        for sub in self.subscripts(flat) {
            out.push('[');
            out.push_str(&sub.to_string());
            out.push(']');
        }
        out
    }
}
