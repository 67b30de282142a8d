//! Math transforms between coordinate spaces.
//!
//! A [`MathTransform`] is a tagged union over the three kinds
//! of transform the engine distinguishes: the identity, an
//! affine map (homogeneous matrix), and a general transform
//! given by an evaluator. Classification of a composed chain
//! is then a `match` over the variant.
//!
//! Affine matrices have `target_dim + 1` rows and
//! `source_dim + 1` columns; the last column holds the
//! translation and the last row is `(0, …, 0, 1)`.

use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, Matrix3};

use crate::error::TransformError;
use crate::geometry::{bounding_box, Envelope, PixelTransform};

/// Point evaluator of a general transform.
pub type Evaluator = Arc<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync>;

/// A transform known only through its forward (and maybe
/// inverse) evaluator.
#[derive(Clone)]
pub struct GeneralTransform {
    source_dim: usize,
    target_dim: usize,
    forward: Evaluator,
    inverse: Option<Evaluator>,
}

impl GeneralTransform {
    pub fn source_dimension(&self) -> usize {
        self.source_dim
    }

    pub fn target_dimension(&self) -> usize {
        self.target_dim
    }

    pub fn has_inverse(&self) -> bool {
        self.inverse.is_some()
    }
}

/// A transform between two coordinate spaces.
#[derive(Clone)]
pub enum MathTransform {
    /// Identity of the given dimension.
    Identity(usize),
    /// Affine map as a homogeneous matrix.
    Affine(DMatrix<f64>),
    /// Arbitrary forward mapping.
    General(GeneralTransform),
}

impl MathTransform {
    pub fn identity(dim: usize) -> Self {
        MathTransform::Identity(dim)
    }

    /// Affine transform from a homogeneous matrix.
    ///
    /// # Panics
    ///
    /// Panics if the matrix is smaller than 2x2.
    pub fn affine(matrix: DMatrix<f64>) -> Self {
        assert!(
            matrix.nrows() >= 2 && matrix.ncols() >= 2,
            "affine matrix needs at least one dimension"
        );
        MathTransform::Affine(matrix)
    }

    /// Two dimensional affine transform.
    pub fn from_pixel_transform(t: &PixelTransform) -> Self {
        MathTransform::Affine(DMatrix::from_column_slice(3, 3, t.as_slice()))
    }

    /// `t` acting on axes 0 and 1 of a `dim` dimensional
    /// space; other axes are left unchanged.
    pub fn embed_pixel_transform(t: &PixelTransform, dim: usize) -> Self {
        if dim <= 2 {
            return Self::from_pixel_transform(t);
        }
        let mut m = DMatrix::identity(dim + 1, dim + 1);
        for row in 0..2 {
            m[(row, 0)] = t[(row, 0)];
            m[(row, 1)] = t[(row, 1)];
            m[(row, dim)] = t[(row, 2)];
        }
        MathTransform::Affine(m)
    }

    /// Axis-aligned scale followed by a translation:
    /// `x'ᵢ = scalesᵢ · xᵢ + offsetsᵢ`.
    ///
    /// # Panics
    ///
    /// Panics if `scales` and `offsets` differ in length.
    pub fn scale_translate(scales: &[f64], offsets: &[f64]) -> Self {
        assert_eq!(scales.len(), offsets.len(), "scale and offset dimensions differ");
        let dim = scales.len();
        let mut m = DMatrix::identity(dim + 1, dim + 1);
        for axis in 0..dim {
            m[(axis, axis)] = scales[axis];
            m[(axis, dim)] = offsets[axis];
        }
        MathTransform::Affine(m)
    }

    /// Pure translation.
    pub fn translation(offsets: &[f64]) -> Self {
        Self::scale_translate(&vec![1.; offsets.len()], offsets)
    }

    /// General transform from evaluators. The inverse, if
    /// given, must map target coordinates back to source.
    pub fn general<F>(source_dim: usize, target_dim: usize, forward: F, inverse: Option<Evaluator>) -> Self
    where
        F: Fn(&[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        MathTransform::General(GeneralTransform {
            source_dim,
            target_dim,
            forward: Arc::new(forward),
            inverse,
        })
    }

    pub fn source_dimension(&self) -> usize {
        match self {
            MathTransform::Identity(dim) => *dim,
            MathTransform::Affine(m) => m.ncols() - 1,
            MathTransform::General(g) => g.source_dim,
        }
    }

    pub fn target_dimension(&self) -> usize {
        match self {
            MathTransform::Identity(dim) => *dim,
            MathTransform::Affine(m) => m.nrows() - 1,
            MathTransform::General(g) => g.target_dim,
        }
    }

    /// True for identity and affine transforms.
    pub fn is_affine(&self) -> bool {
        !matches!(self, MathTransform::General(_))
    }

    /// True if the transform is the identity, allowing matrix
    /// coefficients to deviate by `eps`.
    pub fn is_identity(&self, eps: f64) -> bool {
        match self {
            MathTransform::Identity(_) => true,
            MathTransform::Affine(m) => {
                m.is_square() && (m - DMatrix::identity(m.nrows(), m.ncols())).amax() <= eps
            }
            MathTransform::General(_) => false,
        }
    }

    /// Homogeneous matrix of an identity or affine transform.
    pub fn matrix(&self) -> Option<DMatrix<f64>> {
        match self {
            MathTransform::Identity(dim) => Some(DMatrix::identity(dim + 1, dim + 1)),
            MathTransform::Affine(m) => Some(m.clone()),
            MathTransform::General(_) => None,
        }
    }

    /// The transform as a 2D [`PixelTransform`], if it is a
    /// two dimensional affine transform.
    pub fn as_pixel_transform(&self) -> Option<PixelTransform> {
        let m = self.matrix()?;
        if m.nrows() != 3 || m.ncols() != 3 {
            return None;
        }
        Some(Matrix3::from_column_slice(m.as_slice()))
    }

    /// Transform a single point.
    pub fn transform_point(&self, pt: &[f64]) -> Result<Vec<f64>, TransformError> {
        if pt.len() != self.source_dimension() {
            return Err(TransformError::DimensionMismatch {
                expected: self.source_dimension(),
                found: pt.len(),
            });
        }
        Ok(match self {
            MathTransform::Identity(_) => pt.to_vec(),
            MathTransform::Affine(m) => apply_matrix(m, pt),
            MathTransform::General(g) => (g.forward)(pt),
        })
    }

    /// Concatenate: the result applies `self` first, then
    /// `next`.
    pub fn then(&self, next: &MathTransform) -> Result<MathTransform, TransformError> {
        if self.target_dimension() != next.source_dimension() {
            return Err(TransformError::DimensionMismatch {
                expected: self.target_dimension(),
                found: next.source_dimension(),
            });
        }
        Ok(match (self, next) {
            (MathTransform::Identity(_), other) | (other, MathTransform::Identity(_)) => {
                other.clone()
            }
            (MathTransform::Affine(a), MathTransform::Affine(b)) => MathTransform::Affine(b * a),
            _ => {
                let first = self.evaluator();
                let second = next.evaluator();
                let inverse = match (self.inverse_evaluator(), next.inverse_evaluator()) {
                    (Some(first_inv), Some(second_inv)) => {
                        let inv: Evaluator = Arc::new(move |pt: &[f64]| first_inv(&second_inv(pt)));
                        Some(inv)
                    }
                    _ => None,
                };
                MathTransform::General(GeneralTransform {
                    source_dim: self.source_dimension(),
                    target_dim: next.target_dimension(),
                    forward: Arc::new(move |pt: &[f64]| second(&first(pt))),
                    inverse,
                })
            }
        })
    }

    /// The inverse transform. Fails for singular or
    /// non-square matrices, and for general transforms without
    /// an inverse evaluator.
    pub fn inverse(&self) -> Result<MathTransform, TransformError> {
        match self {
            MathTransform::Identity(dim) => Ok(MathTransform::Identity(*dim)),
            MathTransform::Affine(m) => {
                if !m.is_square() {
                    return Err(TransformError::NonInvertible);
                }
                let det = m.determinant();
                if det == 0. || !det.is_finite() {
                    return Err(TransformError::NonInvertible);
                }
                let inv = m
                    .clone()
                    .try_inverse()
                    .ok_or(TransformError::NonInvertible)?;
                if inv.iter().any(|v| !v.is_finite()) {
                    return Err(TransformError::NonInvertible);
                }
                Ok(MathTransform::Affine(inv))
            }
            MathTransform::General(g) => {
                let inverse = g.inverse.clone().ok_or(TransformError::NonInvertible)?;
                Ok(MathTransform::General(GeneralTransform {
                    source_dim: g.target_dim,
                    target_dim: g.source_dim,
                    forward: inverse,
                    inverse: Some(g.forward.clone()),
                }))
            }
        }
    }

    /// Extract the 2D transform acting on source axes `(x, y)`
    /// and producing target axes `(x, y)`. Fails when those
    /// outputs depend on other input axes.
    pub fn sub_transform_2d(&self, x: usize, y: usize) -> Result<MathTransform, TransformError> {
        let dim = self.source_dimension().min(self.target_dimension());
        if x == y || x >= dim || y >= dim {
            return Err(TransformError::NonSeparable(x, y));
        }
        match self {
            MathTransform::Identity(_) => Ok(MathTransform::Identity(2)),
            MathTransform::Affine(m) => {
                let src = self.source_dimension();
                for &row in &[x, y] {
                    for col in 0..src {
                        if col != x && col != y && m[(row, col)] != 0. {
                            return Err(TransformError::NonSeparable(x, y));
                        }
                    }
                }
                let t = Matrix3::new(
                    m[(x, x)],
                    m[(x, y)],
                    m[(x, src)],
                    m[(y, x)],
                    m[(y, y)],
                    m[(y, src)],
                    0.,
                    0.,
                    1.,
                );
                Ok(MathTransform::from_pixel_transform(&t))
            }
            MathTransform::General(g) => {
                if g.source_dim == 2 && g.target_dim == 2 && x == 0 && y == 1 {
                    Ok(self.clone())
                } else {
                    Err(TransformError::NonSeparable(x, y))
                }
            }
        }
    }

    /// Bounding box of the image of `env`. Affine transforms
    /// map the corners; general transforms are sampled on a
    /// lattice covering the edges and interior. The result
    /// carries no CRS.
    pub fn transform_envelope(&self, env: &Envelope) -> Result<Envelope, TransformError> {
        let dim = env.dimension();
        if dim != self.source_dimension() {
            return Err(TransformError::DimensionMismatch {
                expected: self.source_dimension(),
                found: dim,
            });
        }
        let samples = if self.is_affine() {
            env.corners()
        } else {
            lattice(env, if dim <= 2 { LATTICE_2D } else { LATTICE_ND })
        };
        let mut points = Vec::with_capacity(samples.len());
        for pt in samples {
            let out = self.transform_point(&pt)?;
            if out.iter().all(|v| v.is_finite()) {
                points.push(out);
            }
        }
        let (lower, upper) = bounding_box(points, self.target_dimension());
        Ok(Envelope::new(lower, upper))
    }

    /// Compare two transforms: matrices up to `eps`, general
    /// transforms by identity of their evaluator.
    pub fn approx_eq(&self, other: &MathTransform, eps: f64) -> bool {
        match (self, other) {
            (MathTransform::General(a), MathTransform::General(b)) => Arc::ptr_eq(&a.forward, &b.forward),
            (MathTransform::General(_), _) | (_, MathTransform::General(_)) => false,
            _ => match (self.matrix(), other.matrix()) {
                (Some(a), Some(b)) => a.shape() == b.shape() && (a - b).amax() <= eps,
                _ => false,
            },
        }
    }

    fn evaluator(&self) -> Evaluator {
        match self {
            MathTransform::Identity(_) => Arc::new(|pt: &[f64]| pt.to_vec()),
            MathTransform::Affine(m) => {
                let m = m.clone();
                Arc::new(move |pt: &[f64]| apply_matrix(&m, pt))
            }
            MathTransform::General(g) => g.forward.clone(),
        }
    }

    fn inverse_evaluator(&self) -> Option<Evaluator> {
        match self {
            MathTransform::General(g) => g.inverse.clone(),
            _ => self.inverse().ok().map(|inv| inv.evaluator()),
        }
    }
}

impl fmt::Debug for MathTransform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MathTransform::Identity(dim) => write!(f, "Identity({})", dim),
            MathTransform::Affine(m) => f.debug_tuple("Affine").field(m).finish(),
            MathTransform::General(g) => f
                .debug_struct("General")
                .field("source_dim", &g.source_dim)
                .field("target_dim", &g.target_dim)
                .field("invertible", &g.inverse.is_some())
                .finish(),
        }
    }
}

const LATTICE_2D: usize = 17;
const LATTICE_ND: usize = 5;

fn apply_matrix(m: &DMatrix<f64>, pt: &[f64]) -> Vec<f64> {
    let src = m.ncols() - 1;
    (0..m.nrows() - 1)
        .map(|row| {
            (0..src).fold(m[(row, src)], |acc, col| acc + m[(row, col)] * pt[col])
        })
        .collect()
}

/// `n^dim` points evenly covering the envelope, boundary
/// included.
fn lattice(env: &Envelope, n: usize) -> Vec<Vec<f64>> {
    let dim = env.dimension();
    let total = n.pow(dim as u32);
    (0..total)
        .map(|mut idx| {
            (0..dim)
                .map(|axis| {
                    let k = idx % n;
                    idx /= n;
                    let (lo, hi) = (env.lower()[axis], env.upper()[axis]);
                    lo + (hi - lo) * k as f64 / (n - 1) as f64
                })
                .collect()
        })
        .collect()
}
