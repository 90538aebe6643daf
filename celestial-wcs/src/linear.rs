use crate::error::{WcsError, WcsResult};

const DETERMINANT_THRESHOLD: f64 = 1e-15;

/// Reference pixel plus CD matrix of a two-axis celestial WCS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTransform {
    crpix: [f64; 2],
    cd: [[f64; 2]; 2],
}

impl LinearTransform {
    /// Refuses a singular CD matrix.
    pub fn from_cd(crpix: [f64; 2], cd: [[f64; 2]; 2]) -> WcsResult<Self> {
        let det = determinant(cd);
        if det.abs() < DETERMINANT_THRESHOLD {
            return Err(WcsError::non_invertible_matrix(det));
        }
        Ok(Self { crpix, cd })
    }

    #[inline]
    pub fn crpix(&self) -> [f64; 2] {
        self.crpix
    }

    #[inline]
    pub fn cd_matrix(&self) -> [[f64; 2]; 2] {
        self.cd
    }

    /// Position angle of the image y axis east of north, in degrees.
    #[inline]
    pub fn orientation(&self) -> f64 {
        libm::atan2(self.cd[0][1], self.cd[1][1]).to_degrees()
    }
}

/// Inverts a 2x2 matrix, refusing singular ones.
pub fn invert(m: [[f64; 2]; 2]) -> WcsResult<[[f64; 2]; 2]> {
    let det = determinant(m);
    if det.abs() < DETERMINANT_THRESHOLD {
        return Err(WcsError::non_invertible_matrix(det));
    }
    let inv_det = 1.0 / det;
    Ok([
        [m[1][1] * inv_det, -m[0][1] * inv_det],
        [-m[1][0] * inv_det, m[0][0] * inv_det],
    ])
}

#[inline]
fn determinant(m: [[f64; 2]; 2]) -> f64 {
    m[0][0] * m[1][1] - m[0][1] * m[1][0]
}
