//! Assembly of the `HPS_ST3D/Input` tree from a task's observations and
//! tomography parameters.

use seistomo_core::{ObservationSet, Phase, TomographyParameters};
use tracing::debug;

use crate::container::{Container, NdArray};
use crate::error::GridError;
use crate::geo::LocalFrame;
use crate::grid::{base_velocity_grid, ReliefRaster};

/// Residual limit written for every outer iteration.
const ITER_RESID_LIMIT: f64 = 1.5;
/// Parameterization selector understood by the solver.
const PARAM_TYPE: u8 = 2;
const SRCS_PSV_RELOC_LIMIT: [f64; 3] = [40.0, 40.0, 40.0];
const TOMO_GRID_ROT_ANGLES: [f64; 4] = [0.0, 22.5, 45.0, 67.5];

/// Vertical extent of the velocity grid, km.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthLimits {
    pub min_km: f64,
    pub max_km: f64,
}

impl Default for DepthLimits {
    fn default() -> Self {
        Self {
            min_km: -1.0,
            max_km: 60.0,
        }
    }
}

/// Velocity grid bounds in the local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBounds {
    pub low: [f64; 3],
    pub high: [f64; 3],
}

impl GridBounds {
    /// Horizontal bounds from the relief corners, vertical from `depth`.
    pub fn from_relief(relief: &ReliefRaster, frame: &LocalFrame, depth: DepthLimits) -> Self {
        let (min_lon, max_lon, min_lat, max_lat) = relief.bounds();
        let (min_elev, max_elev) = relief.elevation_range();
        let a = frame.to_local(min_lon, min_lat, min_elev);
        let b = frame.to_local(max_lon, max_lat, max_elev);

        Self {
            low: [a[0].min(b[0]), a[1].min(b[1]), depth.min_km],
            high: [a[0].max(b[0]), a[1].max(b[1]), depth.max_km],
        }
    }

    /// Node spacing for a grid of `dims` nodes spanning the bounds.
    pub fn step(&self, dims: [usize; 3]) -> [f64; 3] {
        let mut step = [0.0; 3];
        for axis in 0..3 {
            let span = (self.high[axis] - self.low[axis]).abs();
            step[axis] = span / (dims[axis].max(2) - 1) as f64;
        }
        step
    }
}

/// Build the solver input tree.
pub fn build_solver_input(
    params: &TomographyParameters,
    observations: &ObservationSet,
    relief: &ReliefRaster,
    depth: DepthLimits,
) -> Result<Container, GridError> {
    let dims = params.grid_dims();
    let (lon0, lat0) = relief.origin();
    let frame = LocalFrame::new(lon0, lat0);
    let bounds = GridBounds::from_relief(relief, &frame, depth);

    let topography = relief.topography(dims[0], dims[1])?;
    let (vp, vs) = base_velocity_grid(&params.base_model, dims)?;

    // Station elevation goes in as `h` unchanged, like the relief extremes.
    let receivers: Vec<[f64; 3]> = observations
        .stations
        .iter()
        .map(|s| frame.to_local(s.x, s.y, s.z))
        .collect();
    let sources: Vec<[f64; 3]> = observations
        .events
        .iter()
        .map(|e| frame.to_local(e.x, e.y, e.z))
        .collect();

    debug!(
        origin_lon = lon0,
        origin_lat = lat0,
        receivers = receivers.len(),
        sources = sources.len(),
        "Assembling solver input"
    );

    let mut container = Container::default();
    let input = container.root.group_mut("HPS_ST3D").group_mut("Input");

    input
        .set_attr("IterMax", NdArray::i64(vec![i64::from(params.iter_max)]))
        .set_attr(
            "IterResidLimits",
            NdArray::f64(vec![ITER_RESID_LIMIT; params.iter_max as usize]),
        )
        .set_attr(
            "LinSysLSQRIterMax",
            NdArray::i64(vec![i64::from(params.lin_sys_lsqr_iter_max)]),
        )
        .set_attr("ParamType", NdArray::u8(vec![PARAM_TYPE]))
        .set_attr("SrcsPsvRelocLimit", NdArray::f64(SRCS_PSV_RELOC_LIMIT.to_vec()))
        .set_attr("TomoGridRotAngles", NdArray::f64(TOMO_GRID_ROT_ANGLES.to_vec()))
        .set_attr("TomoGridStep", NdArray::f64(params.grid_step.clone()))
        .set_attr("VLimitsP", NdArray::f64(params.v_limits_p.clone()))
        .set_attr("VLimitsS", NdArray::f64(params.v_limits_s.clone()));

    for (name, value) in [
        ("TomoMatDampingP", params.damping_p),
        ("TomoMatDampingP4V", params.damping_p4v),
        ("TomoMatDampingS", params.damping_s),
        ("TomoMatDampingS4V", params.damping_s4v),
        ("TomoMatSmoothHP", params.smooth_hp),
        ("TomoMatSmoothHP4V", params.smooth_hp4v),
        ("TomoMatSmoothHS", params.smooth_hs),
        ("TomoMatSmoothHS4V", params.smooth_hs4v),
        ("TomoMatSmoothVP", params.smooth_vp),
        ("TomoMatSmoothVP4V", params.smooth_vp4v),
        ("TomoMatSmoothVS", params.smooth_vs),
        ("TomoMatSmoothVS4V", params.smooth_vs4v),
    ] {
        input.set_attr(name, NdArray::f64(vec![value]));
    }

    let rays = input.group_mut("RaysPsv");
    rays.group_mut("P")
        .set_dataset("TObs", NdArray::f64(observations.arrival_times(Phase::P)));
    rays.group_mut("S")
        .set_dataset("TObs", NdArray::f64(observations.arrival_times(Phase::S)));
    rays.set_dataset(
        "Rcvs",
        NdArray::i64((1..=receivers.len() as i64).collect()),
    );
    rays.set_dataset("Srcs", NdArray::i64((0..sources.len() as i64).collect()));

    input
        .group_mut("Rcvs")
        .set_dataset("Coords", NdArray::rows3(&receivers));
    input
        .group_mut("SrcsPsv")
        .set_dataset("Coords", NdArray::rows3(&sources));
    input.set_dataset("Topography", NdArray::from_ndarray(&topography));

    let grid_size = dims.iter().map(|&n| n as i64).collect();
    input
        .group_mut("VGrid")
        .set_attr("CoordLimLow", NdArray::f64(bounds.low.to_vec()))
        .set_attr("CoordLimHigh", NdArray::f64(bounds.high.to_vec()))
        .set_attr("GridSize", NdArray::i64(grid_size))
        .set_attr("GridStep", NdArray::f64(bounds.step(dims).to_vec()))
        .set_dataset("VP", NdArray::from_ndarray(&vp))
        .set_dataset("VS", NdArray::from_ndarray(&vs));

    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use seistomo_core::{Detection, Event, Station, TaskId};

    fn relief() -> ReliefRaster {
        let mut text = String::new();
        for lon in [30.0, 30.5, 31.0] {
            for lat in [70.0, 70.5, 71.0] {
                text.push_str(&format!("{} {} 150\n", lon, lat));
            }
        }
        ReliefRaster::parse(&text).unwrap()
    }

    fn params() -> TomographyParameters {
        TomographyParameters {
            iter_max: 3,
            lin_sys_lsqr_iter_max: 100,
            damping_p: 1.0,
            damping_p4v: 2.0,
            damping_s: 3.0,
            damping_s4v: 4.0,
            smooth_hp: 10.0,
            smooth_hp4v: 10.0,
            smooth_hs: 10.0,
            smooth_hs4v: 10.0,
            smooth_vp: 10.0,
            smooth_vp4v: 10.0,
            smooth_vs: 10.0,
            smooth_vs4v: 10.5,
            srcs_psv_corr_h: 0.1,
            srcs_psv_corr_i: 0.1,
            srcs_psv_corr_v: 0.1,
            v_limits_p: vec![0.1, 10.0],
            v_limits_s: vec![0.1, 6.0],
            grid_size: vec![4, 4, 4],
            grid_step: vec![1.0, 1.0, 1.0],
            base_model: vec![[0.0, 5.8, 3.4], [20.0, 6.5, 3.7], [40.0, 8.0, 4.5]],
        }
    }

    fn observations() -> ObservationSet {
        let task_id = TaskId::new("t");
        let station = |id, x, y| Station {
            id,
            task_id: task_id.clone(),
            network: "XX".to_string(),
            code: format!("ST{:02}", id),
            x,
            y,
            z: 0.1,
        };
        let detection = |id, station_id, phase, t| Detection {
            id,
            event_id: 1,
            station_id,
            phase,
            arrival_offset: t,
        };
        ObservationSet {
            stations: vec![station(1, 30.2, 70.3), station(2, 30.8, 70.7)],
            events: vec![Event {
                id: 1,
                task_id: task_id.clone(),
                name: "e1".to_string(),
                time: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
                magnitude: Some(1.2),
                network: "XX".to_string(),
                x: 30.5,
                y: 70.5,
                z: 8.0,
            }],
            detections: vec![
                detection(1, 1, Phase::P, 1.5),
                detection(2, 1, Phase::S, 2.6),
                detection(3, 2, Phase::P, 1.9),
                detection(4, 2, Phase::S, 3.1),
            ],
        }
    }

    #[test]
    fn test_schema_layout() {
        let c = build_solver_input(&params(), &observations(), &relief(), DepthLimits::default())
            .unwrap();
        c.validate().unwrap();

        assert_eq!(c.attr("HPS_ST3D/Input/IterMax").unwrap().as_i64(), Some(&[3][..]));
        assert_eq!(
            c.attr("HPS_ST3D/Input/IterResidLimits").unwrap().as_f64(),
            Some(&[1.5, 1.5, 1.5][..])
        );
        assert_eq!(
            c.attr("HPS_ST3D/Input/TomoMatDampingS4V").unwrap().as_f64(),
            Some(&[4.0][..])
        );
        assert_eq!(
            c.attr("HPS_ST3D/Input/TomoMatSmoothVS4V").unwrap().as_f64(),
            Some(&[10.5][..])
        );
        assert_eq!(
            c.attr("HPS_ST3D/Input/VLimitsS").unwrap().as_f64(),
            Some(&[0.1, 6.0][..])
        );

        assert_eq!(
            c.dataset("HPS_ST3D/Input/RaysPsv/P/TObs").unwrap().as_f64(),
            Some(&[1.5, 1.9][..])
        );
        assert_eq!(
            c.dataset("HPS_ST3D/Input/RaysPsv/S/TObs").unwrap().as_f64(),
            Some(&[2.6, 3.1][..])
        );
        assert_eq!(
            c.dataset("HPS_ST3D/Input/RaysPsv/Rcvs").unwrap().as_i64(),
            Some(&[1, 2][..])
        );
        assert_eq!(
            c.dataset("HPS_ST3D/Input/RaysPsv/Srcs").unwrap().as_i64(),
            Some(&[0][..])
        );
        assert_eq!(c.dataset("HPS_ST3D/Input/Rcvs/Coords").unwrap().shape, vec![2, 3]);
        assert_eq!(c.dataset("HPS_ST3D/Input/SrcsPsv/Coords").unwrap().shape, vec![1, 3]);
        assert_eq!(c.dataset("HPS_ST3D/Input/Topography").unwrap().shape, vec![4, 4]);
        assert_eq!(c.dataset("HPS_ST3D/Input/VGrid/VP").unwrap().shape, vec![4, 4, 4]);
        assert_eq!(
            c.attr("HPS_ST3D/Input/VGrid/GridSize").unwrap().as_i64(),
            Some(&[4, 4, 4][..])
        );
    }

    #[test]
    fn test_grid_bounds_and_step() {
        let c = build_solver_input(&params(), &observations(), &relief(), DepthLimits::default())
            .unwrap();
        let low = c.attr("HPS_ST3D/Input/VGrid/CoordLimLow").unwrap().as_f64().unwrap();
        let high = c.attr("HPS_ST3D/Input/VGrid/CoordLimHigh").unwrap().as_f64().unwrap();
        let step = c.attr("HPS_ST3D/Input/VGrid/GridStep").unwrap().as_f64().unwrap();

        assert_eq!(low[2], -1.0);
        assert_eq!(high[2], 60.0);
        assert!(low[0] < 0.0 && high[0] > 0.0);
        assert!(low[1] < 0.0 && high[1] > 0.0);
        assert!((step[2] - 61.0 / 3.0).abs() < 1e-12);
        assert!((step[0] - (high[0] - low[0]) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_event_at_origin_lies_on_axis() {
        let c = build_solver_input(&params(), &observations(), &relief(), DepthLimits::default())
            .unwrap();
        let srcs = c.dataset("HPS_ST3D/Input/SrcsPsv/Coords").unwrap().as_f64().unwrap();
        assert!(srcs[0].abs() < 1e-9);
        assert!(srcs[1].abs() < 1e-9);
        assert!((srcs[2] - 8.0).abs() < 1e-9);

        let topo = c.dataset("HPS_ST3D/Input/Topography").unwrap().as_f64().unwrap();
        assert!(topo.iter().all(|v| (*v + 0.15).abs() < 1e-12));
    }

    #[test]
    fn test_receiver_height_passes_through() {
        let mut obs = observations();
        obs.stations[0].x = 30.5;
        obs.stations[0].y = 70.5;
        obs.stations[0].z = 0.25;
        let c = build_solver_input(&params(), &obs, &relief(), DepthLimits::default()).unwrap();

        let rcvs = c.dataset("HPS_ST3D/Input/Rcvs/Coords").unwrap().as_f64().unwrap();
        assert!(rcvs[0].abs() < 1e-9);
        assert!(rcvs[1].abs() < 1e-9);
        assert!((rcvs[2] - 0.25).abs() < 1e-9);
    }
}
