use image::GrayImage;
use log::{debug, trace};
use nalgebra::Matrix3x4;
use stk_core::{
    CalibrationRecord, CameraIntrinsics, GeometryInvalid, PinholeCamera, Pt2, Pt3, RectificationTransforms,
    RigidTransform, Side, StkError,
};

use crate::remap::RemapTable;
use crate::triangulate::{
    TriangulationMethod, projection_matrix, reproject_disparity, triangulate_dlt,
};

/// Millimetres (board units) to the centimetres reported to callers.
const MM_PER_CM: f64 = 10.0;

struct View {
    camera: PinholeCamera,
    /// Rectified → raw, for whole frames.
    remap: RemapTable,
    /// Raw → rectified, for single points.
    forward: RemapTable,
    /// Projection used by DLT.
    projection: Matrix3x4<f64>,
}

/// Rectification and triangulation for a fully calibrated stereo pair.
///
/// Lookup tables are built once on construction and reused for the lifetime
/// of the estimator.
pub struct DepthEstimator {
    views: [View; 2],
    rectification: RectificationTransforms,
    /// World → left camera, used to reject points behind the left camera when
    /// DLT runs in a world frame.
    left_from_world: RigidTransform,
    method: TriangulationMethod,
}

impl std::fmt::Debug for DepthEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthEstimator")
            .field("method", &self.method)
            .field("size", &self.views[0].remap.size())
            .finish_non_exhaustive()
    }
}

impl DepthEstimator {
    /// Build from a record carrying both intrinsics, extrinsics and
    /// rectification.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip_all))]
    pub fn new(record: &CalibrationRecord) -> Result<Self, StkError> {
        let (left, right, stereo, rectification) = record.require_complete()?;

        // Per-camera world transforms replace the left-camera frame when present.
        let (left_pose, right_pose) = if left.has_world_transform() || right.has_world_transform() {
            (left.world_transform(), right.world_transform())
        } else {
            (RigidTransform::identity(), stereo.transform())
        };

        let build = |side: Side, intrinsics: &CameraIntrinsics, pose: &RigidTransform| {
            let camera = intrinsics.camera();
            let remap = RemapTable::inverse(
                &camera,
                rectification.rotation(side),
                rectification.projection(side),
            )?;
            let forward =
                RemapTable::forward(&camera, |p| rectification.rectify_pixel(side, &camera, p))?;
            debug!("built {side} rectification tables {:?}", remap.size());
            Ok::<_, StkError>(View {
                projection: projection_matrix(&intrinsics.camera_matrix, pose),
                camera,
                remap,
                forward,
            })
        };
        let left_view = build(Side::Left, left, &left_pose)?;
        let right_view = build(Side::Right, right, &right_pose)?;

        Ok(Self {
            views: [left_view, right_view],
            rectification: rectification.clone(),
            left_from_world: left_pose,
            method: TriangulationMethod::default(),
        })
    }

    pub fn with_method(mut self, method: TriangulationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn method(&self) -> TriangulationMethod {
        self.method
    }

    pub fn rectification(&self) -> &RectificationTransforms {
        &self.rectification
    }

    fn view(&self, side: Side) -> &View {
        &self.views[side.index()]
    }

    /// Resample a raw frame into the rectified image of `side`.
    pub fn rectify_image(&self, frame: &GrayImage, side: Side) -> GrayImage {
        self.view(side).remap.apply(frame)
    }

    /// Rectified position of a raw pixel, from the lookup table at the nearest
    /// integer pixel.
    pub fn rectify_point(&self, point: &Pt2, side: Side) -> Option<Pt2> {
        self.view(side).forward.lookup(point)
    }

    /// Rectified position of a raw pixel computed without the table.
    pub fn rectify_point_exact(&self, point: &Pt2, side: Side) -> Option<Pt2> {
        let view = self.view(side);
        self.rectification.rectify_pixel(side, &view.camera, point)
    }

    /// Triangulate raw pixels with the configured method. Centimetres.
    pub fn triangulate(&self, left: &Pt2, right: &Pt2) -> Option<Pt3> {
        self.triangulate_with(left, right, self.method)
    }

    pub fn triangulate_with(
        &self,
        left: &Pt2,
        right: &Pt2,
        method: TriangulationMethod,
    ) -> Option<Pt3> {
        match self.try_triangulate(left, right, method) {
            Ok(point) => Some(point),
            Err(reason) => {
                trace!("no depth for {left:?} / {right:?}: {reason}");
                None
            }
        }
    }

    fn try_triangulate(
        &self,
        left: &Pt2,
        right: &Pt2,
        method: TriangulationMethod,
    ) -> Result<Pt3, GeometryInvalid> {
        let rect_left = self
            .rectify_point_exact(left, Side::Left)
            .ok_or(GeometryInvalid::BehindCamera)?;
        let rect_right = self
            .rectify_point_exact(right, Side::Right)
            .ok_or(GeometryInvalid::BehindCamera)?;
        let axis = self.rectification.baseline_axis();
        let disparity = rect_left[axis] - rect_right[axis];
        // Q[3][2] is -1/T_rect, so a point in front gives a positive product.
        if disparity * self.rectification.q[(3, 2)] <= 0.0 {
            return Err(GeometryInvalid::NonPositiveDisparity);
        }

        let point_mm = match method {
            TriangulationMethod::Dlt => {
                let left_px = self.undistort(Side::Left, left)?;
                let right_px = self.undistort(Side::Right, right)?;
                let [l, r] = &self.views;
                let point = triangulate_dlt(&l.projection, &r.projection, &left_px, &right_px)?;
                if self.left_from_world.apply(&point).z <= 0.0 {
                    return Err(GeometryInvalid::BehindCamera);
                }
                point
            }
            TriangulationMethod::QMatrix => {
                let rectified = reproject_disparity(&self.rectification.q, &rect_left, disparity)?;
                if rectified.z <= 0.0 {
                    return Err(GeometryInvalid::BehindCamera);
                }
                let camera = self.rectification.r1.transpose() * rectified;
                self.left_from_world.inverse().apply(&camera)
            }
        };
        Ok(Pt3::from(point_mm / MM_PER_CM))
    }

    fn undistort(&self, side: Side, pixel: &Pt2) -> Result<Pt2, GeometryInvalid> {
        self.view(side)
            .camera
            .undistort_pixel(pixel)
            .map_err(|_| GeometryInvalid::BehindCamera)
    }
}

impl TryFrom<&CalibrationRecord> for DepthEstimator {
    type Error = StkError;

    fn try_from(record: &CalibrationRecord) -> Result<Self, Self::Error> {
        Self::new(record)
    }
}
