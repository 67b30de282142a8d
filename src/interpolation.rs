//! Pixel interpolation and border extension.
//!
//! Coordinates given to a [`Sampler`] are absolute pixel-centre
//! coordinates: `(x, y) = (3., 4.)` is the centre of pixel
//! `(3, 4)`.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;
use serde_derive::{Deserialize, Serialize};

/// Interpolation method for resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Nearest neighbour (preserves exact values).
    #[default]
    Nearest,
    /// Bilinear interpolation.
    Bilinear,
    /// Bicubic (Catmull-Rom) interpolation.
    Bicubic,
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" | "nearest_neighbor" => Ok(Interpolation::Nearest),
            "bilinear" => Ok(Interpolation::Bilinear),
            "bicubic" | "cubic" => Ok(Interpolation::Bicubic),
            other => Err(format!("unknown interpolation: {}", other)),
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpolation::Nearest => write!(f, "nearest"),
            Interpolation::Bilinear => write!(f, "bilinear"),
            Interpolation::Bicubic => write!(f, "bicubic"),
        }
    }
}

/// How samples outside an image are synthesised when a kernel
/// reaches past its edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderExtender {
    /// Outside samples are zero.
    Zero,
    /// Outside samples repeat the nearest edge sample.
    #[default]
    Copy,
    /// The image is mirrored at its edges.
    Reflect,
    /// The image repeats periodically.
    Wrap,
}

impl BorderExtender {
    /// Map an out-of-range index into `0..len`; `None` means
    /// the sample is zero.
    fn extend(self, idx: i64, len: usize) -> Option<usize> {
        let n = len as i64;
        if (0..n).contains(&idx) {
            return Some(idx as usize);
        }
        match self {
            BorderExtender::Zero => None,
            BorderExtender::Copy => Some(idx.max(0).min(n - 1) as usize),
            BorderExtender::Reflect => {
                let m = idx.rem_euclid(2 * n);
                let m = if m < n { m } else { 2 * n - 1 - m };
                Some(m as usize)
            }
            BorderExtender::Wrap => Some(idx.rem_euclid(n) as usize),
        }
    }
}

impl FromStr for BorderExtender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zero" => Ok(BorderExtender::Zero),
            "copy" => Ok(BorderExtender::Copy),
            "reflect" => Ok(BorderExtender::Reflect),
            "wrap" => Ok(BorderExtender::Wrap),
            other => Err(format!("unknown border extender: {}", other)),
        }
    }
}

/// Interpolates one band of an image.
pub struct Sampler<'a> {
    band: ArrayView2<'a, f64>,
    origin: (i64, i64),
    interpolation: Interpolation,
    border: Option<BorderExtender>,
}

impl<'a> Sampler<'a> {
    /// Sampler over `band`, whose top-left sample is the
    /// absolute pixel `origin`. Without a border extender,
    /// points outside the image footprint yield `None`.
    pub fn new(
        band: ArrayView2<'a, f64>,
        origin: (i64, i64),
        interpolation: Interpolation,
        border: Option<BorderExtender>,
    ) -> Self {
        Sampler {
            band,
            origin,
            interpolation,
            border,
        }
    }

    /// Interpolated value at the absolute pixel-centre
    /// coordinate `(x, y)`.
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (rows, cols) = self.band.dim();
        if rows == 0 || cols == 0 || !x.is_finite() || !y.is_finite() {
            return None;
        }
        let x = x - self.origin.0 as f64;
        let y = y - self.origin.1 as f64;
        if self.border.is_none()
            && (x < -0.5 || y < -0.5 || x >= cols as f64 - 0.5 || y >= rows as f64 - 0.5)
        {
            return None;
        }

        Some(match self.interpolation {
            Interpolation::Nearest => self.fetch((x + 0.5).floor() as i64, (y + 0.5).floor() as i64),
            Interpolation::Bilinear => self.bilinear(x, y),
            Interpolation::Bicubic => self.bicubic(x, y),
        })
    }

    #[inline]
    fn fetch(&self, col: i64, row: i64) -> f64 {
        let (rows, cols) = self.band.dim();
        // Inside the footprint, neighbours past the edge repeat it.
        let border = self.border.unwrap_or(BorderExtender::Copy);
        match (border.extend(col, cols), border.extend(row, rows)) {
            (Some(c), Some(r)) => self.band[(r, c)],
            _ => 0.,
        }
    }

    fn bilinear(&self, x: f64, y: f64) -> f64 {
        let x0 = x.floor();
        let y0 = y.floor();
        let xf = x - x0;
        let yf = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let v00 = self.fetch(x0, y0);
        let v10 = self.fetch(x0 + 1, y0);
        let v01 = self.fetch(x0, y0 + 1);
        let v11 = self.fetch(x0 + 1, y0 + 1);

        // Handle NaN values - if any corner is NaN, return NaN
        if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
            return f64::NAN;
        }

        let top = v00 * (1. - xf) + v10 * xf;
        let bottom = v01 * (1. - xf) + v11 * xf;
        top * (1. - yf) + bottom * yf
    }

    fn bicubic(&self, x: f64, y: f64) -> f64 {
        let xi = x.floor() as i64;
        let yi = y.floor() as i64;
        let xf = x - xi as f64;
        let yf = y - yi as f64;

        let mut rows = [0.; 4];
        for (j, row) in rows.iter_mut().enumerate() {
            let mut vals = [0.; 4];
            for (i, val) in vals.iter_mut().enumerate() {
                *val = self.fetch(xi + i as i64 - 1, yi + j as i64 - 1);
                if val.is_nan() {
                    return self.bilinear(x, y);
                }
            }
            *row = cubic_1d(vals, xf);
        }
        cubic_1d(rows, yf)
    }
}

/// 1D cubic interpolation using Catmull-Rom spline.
fn cubic_1d(p: [f64; 4], t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p[0] + 1.5 * p[1] - 1.5 * p[2] + 0.5 * p[3];
    let b = p[0] - 2.5 * p[1] + 2. * p[2] - 0.5 * p[3];
    let c = -0.5 * p[0] + 0.5 * p[2];
    let d = p[1];

    a * t3 + b * t2 + c * t + d
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    fn grid() -> Array2<f64> {
        arr2(&[[1., 2., 3.], [4., 5., 6.], [7., 8., 9.]])
    }

    #[test]
    fn test_nearest() {
        let data = grid();
        let s = Sampler::new(data.view(), (0, 0), Interpolation::Nearest, None);
        assert_eq!(s.sample(0., 0.), Some(1.));
        assert_eq!(s.sample(1., 1.), Some(5.));
        assert_eq!(s.sample(0.4, 0.4), Some(1.));
        assert_eq!(s.sample(0.6, 0.6), Some(5.));
        assert_eq!(s.sample(-0.6, 0.), None);
        assert_eq!(s.sample(2.6, 0.), None);
    }

    #[test]
    fn test_origin_offset() {
        let data = grid();
        let s = Sampler::new(data.view(), (10, 20), Interpolation::Nearest, None);
        assert_eq!(s.sample(12., 21.), Some(6.));
        assert_eq!(s.sample(1., 1.), None);
    }

    #[test]
    fn test_bilinear() {
        let data = arr2(&[[1., 2.], [3., 4.]]);
        let s = Sampler::new(data.view(), (0, 0), Interpolation::Bilinear, None);
        assert_eq!(s.sample(0., 0.), Some(1.));
        assert_eq!(s.sample(1., 1.), Some(4.));
        let center = s.sample(0.5, 0.5).unwrap();
        assert!((center - 2.5).abs() < 1e-12);

        let data = arr2(&[[1., f64::NAN], [3., 4.]]);
        let s = Sampler::new(data.view(), (0, 0), Interpolation::Bilinear, None);
        assert!(s.sample(0.5, 0.5).unwrap().is_nan());
    }

    #[test]
    fn test_bicubic_reproduces_linear_ramp() {
        let data = Array2::from_shape_fn((6, 6), |(r, c)| (r + 2 * c) as f64);
        let s = Sampler::new(data.view(), (0, 0), Interpolation::Bicubic, None);
        let v = s.sample(2.25, 2.5).unwrap();
        assert!((v - (2.5 + 4.5)).abs() < 1e-9);
    }

    #[test]
    fn test_border_extenders() {
        assert_eq!(BorderExtender::Copy.extend(-3, 4), Some(0));
        assert_eq!(BorderExtender::Copy.extend(7, 4), Some(3));
        assert_eq!(BorderExtender::Reflect.extend(-1, 4), Some(0));
        assert_eq!(BorderExtender::Reflect.extend(-2, 4), Some(1));
        assert_eq!(BorderExtender::Reflect.extend(4, 4), Some(3));
        assert_eq!(BorderExtender::Wrap.extend(-1, 4), Some(3));
        assert_eq!(BorderExtender::Wrap.extend(5, 4), Some(1));
        assert_eq!(BorderExtender::Zero.extend(5, 4), None);

        let data = grid();
        let s = Sampler::new(data.view(), (0, 0), Interpolation::Nearest, Some(BorderExtender::Zero));
        assert_eq!(s.sample(-1., 0.), Some(0.));
        let s = Sampler::new(data.view(), (0, 0), Interpolation::Nearest, Some(BorderExtender::Wrap));
        assert_eq!(s.sample(-1., 0.), Some(3.));
    }

    #[test]
    fn test_parse() {
        assert_eq!("Bilinear".parse::<Interpolation>().unwrap(), Interpolation::Bilinear);
        assert_eq!("cubic".parse::<Interpolation>().unwrap(), Interpolation::Bicubic);
        assert!("lanczos".parse::<Interpolation>().is_err());
        assert_eq!("reflect".parse::<BorderExtender>().unwrap(), BorderExtender::Reflect);
    }
}
