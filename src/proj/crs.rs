use crate::error::ProjError;
use proj4rs::Proj;

/// Thin wrapper around proj4rs that handles radians/degrees conversion transparently.
///
/// proj4rs works in radians for geographic CRS while survey tables carry
/// decimal degrees, so geographic endpoints are converted on the way in and out.
pub struct CrsTransform {
    src: Proj,
    dst: Proj,
    src_is_geo: bool,
    dst_is_geo: bool,
}

impl CrsTransform {
    /// Create a transform from `src_crs` to `dst_crs`.
    ///
    /// Accepts EPSG codes ("EPSG:4326") or PROJ strings ("+proj=utm +zone=19 ...").
    pub fn new(src_crs: &str, dst_crs: &str) -> Result<Self, ProjError> {
        let src = Proj::from_user_string(src_crs)
            .map_err(|e| ProjError::UnknownCrs(format!("{src_crs}: {e}")))?;
        let dst = Proj::from_user_string(dst_crs)
            .map_err(|e| ProjError::UnknownCrs(format!("{dst_crs}: {e}")))?;
        let src_is_geo = src.is_latlong();
        let dst_is_geo = dst.is_latlong();
        Ok(Self {
            src,
            dst,
            src_is_geo,
            dst_is_geo,
        })
    }

    /// Transform points from the source CRS to the destination CRS, in place.
    ///
    /// Coordinates are in CRS native units (degrees for geographic, metres
    /// for projected).
    pub fn transform_batch(&self, coords: &mut [(f64, f64)]) -> Result<(), ProjError> {
        if self.src_is_geo {
            for c in coords.iter_mut() {
                c.0 = c.0.to_radians();
                c.1 = c.1.to_radians();
            }
        }

        proj4rs::transform::transform(&self.src, &self.dst, coords)
            .map_err(|e| ProjError::TransformFailed(e.to_string()))?;

        if self.dst_is_geo {
            for c in coords.iter_mut() {
                c.0 = c.0.to_degrees();
                c.1 = c.1.to_degrees();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_roundtrip_4326_to_utm19() {
        // Gulf of Maine: ~68.5°W, ~43.5°N
        let fwd = CrsTransform::new("EPSG:4326", "EPSG:32619").unwrap();
        let inv = CrsTransform::new("EPSG:32619", "EPSG:4326").unwrap();

        let mut coords = vec![(-68.5, 43.5), (-69.0, 43.0), (-68.0, 44.0)];
        fwd.transform_batch(&mut coords).unwrap();
        let (e, n) = coords[0];
        assert!(e > 200_000.0 && e < 800_000.0, "easting out of range: {e}");
        assert!(n > 4_700_000.0 && n < 4_900_000.0, "northing out of range: {n}");
        // Further north is a larger northing
        assert!(coords[2].1 > coords[1].1);

        inv.transform_batch(&mut coords).unwrap();
        let expected = [(-68.5, 43.5), (-69.0, 43.0), (-68.0, 44.0)];
        for (got, want) in coords.iter().zip(&expected) {
            assert_relative_eq!(got.0, want.0, epsilon = 1e-8);
            assert_relative_eq!(got.1, want.1, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_invalid_crs() {
        assert!(CrsTransform::new("EPSG:99999", "EPSG:4326").is_err());
    }
}
