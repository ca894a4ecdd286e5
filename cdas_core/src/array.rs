//! Owned, type-erased array values.
//!
//! [`AnyArray`] is the lingua franca between the buffering writers, the
//! store handles, and the engine boundary: a dtype tag, a shape, and a
//! row-major byte payload. Conversions to and from `ndarray` enforce the
//! engine's row-major contiguity precondition locally, before any engine
//! call.

use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};

use crate::error::{Error, Result};
use crate::types::{DType, Element};

/// A dynamically typed n-dimensional array in row-major layout.
#[derive(Debug, Clone, PartialEq)]
pub struct AnyArray {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl AnyArray {
    /// Capture an `ndarray` view by copying it into an owned, row-major
    /// buffer.
    ///
    /// Fails with a layout error when the view is not in standard
    /// (C-contiguous) layout; callers should materialize such views with
    /// [`ndarray::ArrayBase::as_standard_layout`] first.
    pub fn from_array<T, S, D>(array: &ArrayBase<S, D>) -> Result<Self>
    where
        T: Element,
        S: Data<Elem = T>,
        D: Dimension,
    {
        let slice = array.as_slice().ok_or(Error::NonContiguous)?;
        Ok(Self {
            dtype: T::DTYPE,
            shape: array.shape().to_vec(),
            data: bytemuck::cast_slice(slice).to_vec(),
        })
    }

    /// Wrap a vector of scalars as a 1-D array.
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        Self {
            dtype: T::DTYPE,
            shape: vec![values.len()],
            data: bytemuck::cast_slice(&values).to_vec(),
        }
    }

    /// Assemble an array from a dtype tag, shape, and raw row-major bytes.
    ///
    /// The byte length must equal `product(shape) * dtype.size_bytes()`.
    pub fn from_raw_parts(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * dtype.size_bytes();
        if data.len() != expected {
            return Err(Error::ShapeMismatch(format!(
                "shape {:?} of dtype {} needs {} bytes but buffer holds {}",
                shape,
                dtype.name(),
                expected,
                data.len()
            )));
        }
        Ok(Self { dtype, shape, data })
    }

    /// A zero-length 1-D array of the given dtype.
    pub fn empty(dtype: DType) -> Self {
        Self {
            dtype,
            shape: vec![0],
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Leading-dimension size, i.e. the number of rows in a data stream.
    #[inline]
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload size in bytes.
    #[inline]
    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    /// Raw row-major payload.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes occupied by one leading-dimension row.
    pub fn row_bytes(&self) -> usize {
        self.shape.iter().skip(1).product::<usize>() * self.dtype.size_bytes()
    }

    /// Copy of the first `rows` leading-dimension rows (clamped to the
    /// available row count). Used by the calibration sampler.
    pub fn head(&self, rows: usize) -> Self {
        let rows = rows.min(self.rows());
        if rows == self.rows() {
            return self.clone();
        }
        let mut shape = self.shape.clone();
        shape[0] = rows;
        Self {
            dtype: self.dtype,
            shape,
            data: self.data[..rows * self.row_bytes()].to_vec(),
        }
    }

    /// Concatenate arrays along the leading axis, preserving order.
    ///
    /// All parts must share one dtype and identical trailing dimensions.
    pub fn concat(parts: &[AnyArray]) -> Result<AnyArray> {
        let first = match parts.first() {
            Some(first) => first,
            None => return Err(Error::ShapeMismatch("cannot concatenate zero arrays".into())),
        };
        if first.rank() == 0 {
            return Err(Error::ShapeMismatch(
                "cannot concatenate 0-dimensional arrays".into(),
            ));
        }
        let mut rows = 0usize;
        let mut total_bytes = 0usize;
        for part in parts {
            if part.dtype != first.dtype {
                return Err(Error::MixedDtypes);
            }
            if part.shape[1..] != first.shape[1..] {
                return Err(Error::ShapeMismatch(format!(
                    "trailing dimensions differ: {:?} vs {:?}",
                    &first.shape[1..],
                    &part.shape[1..]
                )));
            }
            rows += part.rows();
            total_bytes += part.nbytes();
        }
        let mut shape = first.shape.clone();
        shape[0] = rows;
        let mut data = Vec::with_capacity(total_bytes);
        for part in parts {
            data.extend_from_slice(&part.data);
        }
        Ok(AnyArray {
            dtype: first.dtype,
            shape,
            data,
        })
    }

    /// Extract the payload as a typed vector.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if self.dtype != T::DTYPE {
            return Err(Error::DtypeMismatch {
                expected: T::DTYPE,
                actual: self.dtype,
            });
        }
        // The payload buffer carries no alignment guarantee, so collect
        // rather than cast in place.
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }

    /// Convert into a typed `ndarray`.
    pub fn into_array<T: Element>(self) -> Result<ArrayD<T>> {
        let shape = self.shape.clone();
        let values = self.to_vec::<T>()?;
        ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|e| Error::ShapeMismatch(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array2};

    #[test]
    fn roundtrip_through_ndarray() {
        let source = arr2(&[[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let erased = AnyArray::from_array(&source).unwrap();
        assert_eq!(erased.dtype(), DType::Float32);
        assert_eq!(erased.shape(), &[3, 2]);
        assert_eq!(erased.rows(), 3);
        assert_eq!(erased.nbytes(), 24);
        let back = erased.into_array::<f32>().unwrap();
        assert_eq!(back, source.into_dyn());
    }

    #[test]
    fn non_contiguous_view_is_rejected() {
        let source: Array2<i64> = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as i64);
        let transposed = source.t();
        let err = AnyArray::from_array(&transposed).unwrap_err();
        assert!(matches!(err, Error::NonContiguous));
    }

    #[test]
    fn typed_extraction_checks_dtype() {
        let erased = AnyArray::from_vec(vec![1i64, 2, 3]);
        let err = erased.to_vec::<f32>().unwrap_err();
        assert!(matches!(
            err,
            Error::DtypeMismatch {
                expected: DType::Float32,
                actual: DType::Int64,
            }
        ));
    }

    #[test]
    fn head_takes_a_row_prefix() {
        let source = arr2(&[[1i32, 2], [3, 4], [5, 6]]);
        let erased = AnyArray::from_array(&source).unwrap();
        let head = erased.head(2);
        assert_eq!(head.shape(), &[2, 2]);
        assert_eq!(head.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4]);
        // Clamped when asking for more rows than exist.
        assert_eq!(erased.head(10).rows(), 3);
    }

    #[test]
    fn concat_preserves_arrival_order() {
        let a = AnyArray::from_array(&arr1(&[1i64, 2])).unwrap();
        let b = AnyArray::from_array(&arr1(&[3i64])).unwrap();
        let c = AnyArray::from_array(&arr1(&[4i64, 5])).unwrap();
        let joined = AnyArray::concat(&[a, b, c]).unwrap();
        assert_eq!(joined.shape(), &[5]);
        assert_eq!(joined.to_vec::<i64>().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn concat_rejects_mixed_dtypes_and_shapes() {
        let a = AnyArray::from_vec(vec![1i64, 2]);
        let b = AnyArray::from_vec(vec![1.0f32]);
        assert!(matches!(
            AnyArray::concat(&[a.clone(), b]).unwrap_err(),
            Error::MixedDtypes
        ));

        let c = AnyArray::from_array(&arr2(&[[1i64, 2]])).unwrap();
        assert!(matches!(
            AnyArray::concat(&[a, c]).unwrap_err(),
            Error::ShapeMismatch(_)
        ));
    }

    #[test]
    fn raw_parts_length_is_validated() {
        let err = AnyArray::from_raw_parts(DType::Int64, vec![3], vec![0u8; 23]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
        let ok = AnyArray::from_raw_parts(DType::Int64, vec![3], vec![0u8; 24]).unwrap();
        assert_eq!(ok.len(), 3);
    }
}
