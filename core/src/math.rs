//! Math type aliases and culling primitives.
//!
//! Rendering math is always `f32`. Planes use the `normal . p - dist`
//! convention: a point is on the inner side when that value is non-negative.

pub use nalgebra;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector (f32).
pub type Vec4 = nalgebra::Vector4<f32>;

/// 4x4 matrix (f32).
pub type Mat4 = nalgebra::Matrix4<f32>;

/// Build a right-handed perspective projection with depth range [0, 1] (wgpu/Vulkan convention).
pub fn perspective_rh(yfov: f32, aspect: f32, znear: f32, zfar: f32) -> Mat4 {
    let f = 1.0 / (yfov / 2.0).tan();
    let nf = 1.0 / (znear - zfar);
    #[rustfmt::skip]
    let result = Mat4::new(
        f / aspect, 0.0,  0.0,              0.0,
        0.0,        f,    0.0,              0.0,
        0.0,        0.0,  zfar * nf,        znear * zfar * nf,
        0.0,        0.0,  -1.0,             0.0,
    );
    result
}

/// Right-handed look-at view matrix.
pub fn look_at_rh(eye: &Vec3, target: &Vec3, up: &Vec3) -> Mat4 {
    let eye_point = nalgebra::Point3::from(*eye);
    let target_point = nalgebra::Point3::from(*target);
    nalgebra::Isometry3::look_at_rh(&eye_point, &target_point, up).to_homogeneous()
}

/// Convert a 4x4 matrix to a column-major `[[f32; 4]; 4]` array.
pub fn mat4_to_cols_array_2d(m: &Mat4) -> [[f32; 4]; 4] {
    let s = m.as_slice();
    [
        [s[0], s[1], s[2], s[3]],
        [s[4], s[5], s[6], s[7]],
        [s[8], s[9], s[10], s[11]],
        [s[12], s[13], s[14], s[15]],
    ]
}

/// Bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere centered on the average of `points`, reaching the farthest one.
    ///
    /// Returns `None` for an empty point set.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let sum = points.iter().fold(Vec3::zeros(), |acc, p| acc + p);
        let center = sum / points.len() as f32;
        let radius = points
            .iter()
            .map(|p| (p - center).norm())
            .fold(0.0_f32, f32::max);

        Some(Self { center, radius })
    }

    /// GPU layout: `[x, y, z, radius]`.
    pub fn to_array(&self) -> [f32; 4] {
        [self.center.x, self.center.y, self.center.z, self.radius]
    }
}

/// Oriented plane, `normal . p == dist` on the plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
}

impl Plane {
    pub fn new(normal: Vec3, dist: f32) -> Self {
        Self { normal, dist }
    }

    /// Plane from `a*x + b*y + c*z + d >= 0`, normalized.
    fn from_coefficients(v: Vec4) -> Self {
        let normal = Vec3::new(v.x, v.y, v.z);
        let len = normal.norm();
        if len <= f32::EPSILON {
            return Self::new(Vec3::zeros(), 0.0);
        }
        Self::new(normal / len, -v.w / len)
    }

    /// Signed distance of `point` from the plane.
    pub fn distance(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) - self.dist
    }

    /// GPU layout: `[nx, ny, nz, dist]`.
    pub fn to_array(&self) -> [f32; 4] {
        [self.normal.x, self.normal.y, self.normal.z, self.dist]
    }
}

impl Default for Plane {
    fn default() -> Self {
        Self::new(Vec3::zeros(), 0.0)
    }
}

/// Six view frustum planes, normals pointing inwards.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract the planes of a view-projection matrix with depth range [0, 1].
    ///
    /// Plane order: left, right, bottom, top, near, far.
    pub fn from_view_projection(m: &Mat4) -> Self {
        let row = |i: usize| Vec4::new(m[(i, 0)], m[(i, 1)], m[(i, 2)], m[(i, 3)]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self::new([
            Plane::from_coefficients(r3 + r0),
            Plane::from_coefficients(r3 - r0),
            Plane::from_coefficients(r3 + r1),
            Plane::from_coefficients(r3 - r1),
            Plane::from_coefficients(r2),
            Plane::from_coefficients(r3 - r2),
        ])
    }

    /// Whether any part of `sphere` is on the inner side of all planes.
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance(&sphere.center) >= -sphere.radius)
    }

    pub fn to_arrays(&self) -> [[f32; 4]; 6] {
        self.planes.map(|plane| plane.to_array())
    }
}
