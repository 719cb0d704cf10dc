//! Relief raster loading and velocity grid construction.

use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array2, Array3, Axis};

use crate::error::GridError;

/// Standard deviation of the smoothing kernel, in grid cells.
pub const SMOOTHING_SIGMA: f64 = 2.0;

/// Kernel half-width in standard deviations.
const TRUNCATE: f64 = 4.0;

/// Regular lon/lat terrain raster.
#[derive(Debug, Clone, PartialEq)]
pub struct ReliefRaster {
    /// Sorted distinct longitudes, degrees.
    pub longitudes: Vec<f64>,
    /// Sorted distinct latitudes, degrees.
    pub latitudes: Vec<f64>,
    /// Elevation in km, indexed `[lon, lat]`.
    pub elevation_km: Array2<f64>,
}

impl ReliefRaster {
    /// Read a relief file from disk.
    pub fn load(path: &Path) -> Result<Self, GridError> {
        let text = std::fs::read_to_string(path).map_err(|source| GridError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse `lon lat elevation_m` lines. Blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self, GridError> {
        let mut points = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let values = line
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| GridError::Malformed {
                    line: n + 1,
                    message: e.to_string(),
                })?;
            let [lon, lat, elevation] = values[..] else {
                return Err(GridError::Malformed {
                    line: n + 1,
                    message: format!("expected 3 columns, found {}", values.len()),
                });
            };
            points.push((lon, lat, elevation));
        }
        if points.is_empty() {
            return Err(GridError::Irregular("no points".to_string()));
        }

        let longitudes = distinct_sorted(points.iter().map(|p| p.0));
        let latitudes = distinct_sorted(points.iter().map(|p| p.1));
        if longitudes.len() * latitudes.len() != points.len() {
            return Err(GridError::Irregular(format!(
                "{} points for {} longitudes x {} latitudes",
                points.len(),
                longitudes.len(),
                latitudes.len()
            )));
        }

        let lon_index = index_of(&longitudes);
        let lat_index = index_of(&latitudes);
        let mut elevation_km = Array2::<f64>::from_elem((longitudes.len(), latitudes.len()), f64::NAN);
        for (lon, lat, elevation) in points {
            let cell = &mut elevation_km[[lon_index[&lon.to_bits()], lat_index[&lat.to_bits()]]];
            if !cell.is_nan() {
                return Err(GridError::Irregular(format!(
                    "duplicate point at {} {}",
                    lon, lat
                )));
            }
            *cell = elevation / 1000.0;
        }

        Ok(Self {
            longitudes,
            latitudes,
            elevation_km,
        })
    }

    /// `(min_lon, max_lon, min_lat, max_lat)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let lon = &self.longitudes;
        let lat = &self.latitudes;
        (lon[0], lon[lon.len() - 1], lat[0], lat[lat.len() - 1])
    }

    /// Midpoint of the geographic bounding box, `(lon, lat)`.
    pub fn origin(&self) -> (f64, f64) {
        let (min_lon, max_lon, min_lat, max_lat) = self.bounds();
        (
            min_lon + (max_lon - min_lon).abs() / 2.0,
            min_lat + (max_lat - min_lat).abs() / 2.0,
        )
    }

    /// Lowest and highest elevation, km.
    pub fn elevation_range(&self) -> (f64, f64) {
        self.elevation_km
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Topography resampled to `(nx, ny)` and negated, so that it is
    /// positive below sea level.
    pub fn topography(&self, nx: usize, ny: usize) -> Result<Array2<f64>, GridError> {
        Ok(zoom_nearest_2d(&self.elevation_km, (nx, ny))?.mapv(|v| -v))
    }
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

fn index_of(values: &[f64]) -> HashMap<u64, usize> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (v.to_bits(), i))
        .collect()
}

/// Source index for output position `i` when resampling `input` cells to
/// `output` cells, aligning the first and last samples.
fn source_index(i: usize, input: usize, output: usize) -> usize {
    if output <= 1 || input <= 1 {
        return 0;
    }
    let pos = i as f64 * (input - 1) as f64 / (output - 1) as f64;
    (pos.round() as usize).min(input - 1)
}

/// Nearest-neighbour resampling of a 2-D array.
pub fn zoom_nearest_2d(input: &Array2<f64>, shape: (usize, usize)) -> Result<Array2<f64>, GridError> {
    check_shape(input.shape(), &[shape.0, shape.1])?;
    let (ni, nj) = input.dim();
    Ok(Array2::from_shape_fn(shape, |(i, j)| {
        input[[source_index(i, ni, shape.0), source_index(j, nj, shape.1)]]
    }))
}

/// Nearest-neighbour resampling of a 3-D array.
pub fn zoom_nearest_3d(
    input: &Array3<f64>,
    shape: (usize, usize, usize),
) -> Result<Array3<f64>, GridError> {
    check_shape(input.shape(), &[shape.0, shape.1, shape.2])?;
    let (ni, nj, nk) = input.dim();
    Ok(Array3::from_shape_fn(shape, |(i, j, k)| {
        input[[
            source_index(i, ni, shape.0),
            source_index(j, nj, shape.1),
            source_index(k, nk, shape.2),
        ]]
    }))
}

fn check_shape(input: &[usize], output: &[usize]) -> Result<(), GridError> {
    if input.contains(&0) {
        return Err(GridError::Shape("input array is empty".to_string()));
    }
    if output.contains(&0) {
        return Err(GridError::Shape(format!("target shape {:?} has a zero axis", output)));
    }
    Ok(())
}

/// Reflect an out-of-range index back into `0..n`, mirroring about the
/// array edges (`d c b a | a b c d | d c b a`).
fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Separable Gaussian smoothing along every axis with reflecting borders.
pub fn gaussian_filter_3d(input: &Array3<f64>, sigma: f64) -> Array3<f64> {
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;

    let mut current = input.to_owned();
    for axis in 0..3 {
        let n = current.len_of(Axis(axis));
        let mut next = Array3::<f64>::zeros(current.dim());
        for (src, mut dst) in current
            .lanes(Axis(axis))
            .into_iter()
            .zip(next.lanes_mut(Axis(axis)))
        {
            for i in 0..n {
                dst[i] = kernel
                    .iter()
                    .enumerate()
                    .map(|(t, w)| w * src[reflect(i as isize + t as isize - radius, n)])
                    .sum();
            }
        }
        current = next;
    }
    current
}

/// Starting P and S velocity grids from a 1-D `[depth, vp, vs]` profile.
///
/// The profile runs along the last axis; it is stretched to `dims` by
/// nearest-neighbour resampling and then smoothed.
pub fn base_velocity_grid(
    base_model: &[[f64; 3]],
    dims: [usize; 3],
) -> Result<(Array3<f64>, Array3<f64>), GridError> {
    if base_model.is_empty() {
        return Err(GridError::Shape("base model is empty".to_string()));
    }
    let n = base_model.len();
    let vp = Array3::from_shape_fn((1, 1, n), |(_, _, k)| base_model[k][1]);
    let vs = Array3::from_shape_fn((1, 1, n), |(_, _, k)| base_model[k][2]);

    let shape = (dims[0], dims[1], dims[2]);
    let vp = gaussian_filter_3d(&zoom_nearest_3d(&vp, shape)?, SMOOTHING_SIGMA);
    let vs = gaussian_filter_3d(&zoom_nearest_3d(&vs, shape)?, SMOOTHING_SIGMA);
    Ok((vp, vs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relief_text() -> String {
        let mut text = String::new();
        for lon in [30.0, 30.5, 31.0] {
            for lat in [70.0, 70.5] {
                text.push_str(&format!("{} {} {}\n", lon, lat, (lon - 30.0) * 1000.0 + lat));
            }
        }
        text
    }

    #[test]
    fn test_parse_relief() {
        let relief = ReliefRaster::parse(&relief_text()).unwrap();
        assert_eq!(relief.longitudes, vec![30.0, 30.5, 31.0]);
        assert_eq!(relief.latitudes, vec![70.0, 70.5]);
        assert_eq!(relief.elevation_km.dim(), (3, 2));
        assert!((relief.elevation_km[[2, 1]] - 1.0705).abs() < 1e-12);
        assert_eq!(relief.origin(), (30.5, 70.25));
    }

    #[test]
    fn test_irregular_relief_rejected() {
        let text = "30 70 1\n30 71 1\n31 70 1\n";
        assert!(matches!(
            ReliefRaster::parse(text),
            Err(GridError::Irregular(_))
        ));
        assert!(matches!(
            ReliefRaster::parse("30 70\n"),
            Err(GridError::Malformed { line: 1, .. })
        ));
        assert!(ReliefRaster::parse("").is_err());
    }

    #[test]
    fn test_topography_is_negated_and_resampled() {
        let relief = ReliefRaster::parse(&relief_text()).unwrap();
        let topo = relief.topography(4, 4).unwrap();
        assert_eq!(topo.dim(), (4, 4));
        assert_eq!(topo[[0, 0]], -relief.elevation_km[[0, 0]]);
        assert_eq!(topo[[3, 3]], -relief.elevation_km[[2, 1]]);
    }

    #[test]
    fn test_zoom_nearest_keeps_corners() {
        let input = Array2::from_shape_fn((3, 3), |(i, j)| (i * 3 + j) as f64);
        let out = zoom_nearest_2d(&input, (5, 2)).unwrap();
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[4, 1]], 8.0);
        assert_eq!(out[[2, 0]], 3.0);
        assert!(zoom_nearest_2d(&input, (0, 2)).is_err());
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 4), 2);
        assert_eq!(reflect(-9, 1), 0);
    }

    #[test]
    fn test_gaussian_preserves_constant_field() {
        let input = Array3::from_elem((4, 3, 5), 6.5);
        let out = gaussian_filter_3d(&input, SMOOTHING_SIGMA);
        assert!(out.iter().all(|v| (v - 6.5).abs() < 1e-12));
    }

    #[test]
    fn test_gaussian_smooths_step() {
        let input = Array3::from_shape_fn((1, 1, 10), |(_, _, k)| if k < 5 { 0.0 } else { 1.0 });
        let out = gaussian_filter_3d(&input, SMOOTHING_SIGMA);
        assert!(out[[0, 0, 4]] > 0.0 && out[[0, 0, 4]] < 0.5);
        assert!(out[[0, 0, 5]] > 0.5 && out[[0, 0, 5]] < 1.0);
        assert!(out[[0, 0, 0]] < out[[0, 0, 9]]);
    }

    #[test]
    fn test_base_velocity_grid_shape() {
        let model = [[0.0, 5.8, 3.4], [20.0, 6.5, 3.7], [40.0, 8.0, 4.5]];
        let (vp, vs) = base_velocity_grid(&model, [4, 4, 4]).unwrap();
        assert_eq!(vp.dim(), (4, 4, 4));
        assert_eq!(vs.dim(), (4, 4, 4));
        // Laterally uniform, increasing with depth.
        assert_eq!(vp[[0, 0, 2]], vp[[3, 1, 2]]);
        assert!(vp[[0, 0, 0]] < vp[[0, 0, 3]]);
        assert!(vs.iter().all(|v| (3.4..=4.5).contains(v)));
    }
}
