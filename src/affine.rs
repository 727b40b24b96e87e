/// A north-up 2D affine geotransform.
///
/// Maps cell coordinates (col, row) to projected coordinates (x, y):
///   x = a * col + b * row + c
///   y = d * col + e * row + f
///
/// Grids built by [`crate::grid::GridTemplate`] never rotate, so `b` and `d`
/// are zero and `e` is the negated resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform with square cells and its upper-left corner at `(x0, y0)`.
    pub fn north_up(x0: f64, y0: f64, resolution: f64) -> Self {
        Self::new(resolution, 0.0, x0, 0.0, -resolution, y0)
    }

    /// Apply the forward transform: (col, row) -> (x, y).
    pub fn forward(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.a * col + self.b * row + self.c;
        let y = self.d * col + self.e * row + self.f;
        (x, y)
    }

    /// Compute the inverse affine transform.
    pub fn inverse(&self) -> Result<Affine, crate::error::ClimatologyError> {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::EPSILON {
            return Err(crate::error::ClimatologyError::InvalidGrid(
                "Singular affine transform (determinant is zero)".into(),
            ));
        }
        let inv_det = 1.0 / det;
        Ok(Affine {
            a: self.e * inv_det,
            b: -self.b * inv_det,
            c: (self.b * self.f - self.e * self.c) * inv_det,
            d: -self.d * inv_det,
            e: self.a * inv_det,
            f: (self.d * self.c - self.a * self.f) * inv_det,
        })
    }
}
