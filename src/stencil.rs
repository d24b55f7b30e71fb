// stencil.rs — per-cell terrain formulas over a 3x3 neighbourhood.
//
// Window layout (row index grows southward, column index eastward):
//
//     nw  n  ne
//      w  z  e
//     sw  s  se
//
// Every formula takes the full window (centre included) and the physical
// cell size. These are the authoritative CPU versions; the WGSL kernel in
// shaders/stencil.wgsl mirrors them term for term and GPU output is
// validated against them.

use std::f32::consts::{FRAC_PI_2, PI};

use crate::operator::Operator;

/// Physical distance spanned by one cell along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    pub x: f32,
    pub y: f32,
}

impl CellSize {
    pub const UNIT: CellSize = CellSize { x: 1.0, y: 1.0 };

    pub fn new(x: f32, y: f32) -> Self {
        CellSize { x, y }
    }
}

impl Default for CellSize {
    fn default() -> Self {
        CellSize::UNIT
    }
}

/// The 3x3 window of elevations centred on one cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Neighborhood {
    pub nw: f32,
    pub n: f32,
    pub ne: f32,
    pub w: f32,
    pub z: f32,
    pub e: f32,
    pub sw: f32,
    pub s: f32,
    pub se: f32,
}

impl Neighborhood {
    /// Build from rows north to south.
    pub fn from_rows(rows: [[f32; 3]; 3]) -> Self {
        let [[nw, n, ne], [w, z, e], [sw, s, se]] = rows;
        Neighborhood { nw, n, ne, w, z, e, sw, s, se }
    }

    /// Gather the window centred at `(row, col)` from a row-major buffer of
    /// the given width.
    ///
    /// The caller guarantees `(row, col)` is strictly interior, i.e. all
    /// eight neighbours are inside the buffer.
    #[inline]
    pub fn gather(src: &[f32], width: usize, row: usize, col: usize) -> Self {
        let up = (row - 1) * width + col;
        let mid = row * width + col;
        let down = (row + 1) * width + col;
        Neighborhood {
            nw: src[up - 1],
            n: src[up],
            ne: src[up + 1],
            w: src[mid - 1],
            z: src[mid],
            e: src[mid + 1],
            sw: src[down - 1],
            s: src[down],
            se: src[down + 1],
        }
    }

    /// Horn's weighted gradient `(dz/dx, dz/dy)`, east and south positive.
    #[inline]
    fn horn_gradient(&self, cell: CellSize) -> (f32, f32) {
        let dx = ((self.ne + 2.0 * self.e + self.se) - (self.nw + 2.0 * self.w + self.sw))
            / (8.0 * cell.x);
        let dy = ((self.sw + 2.0 * self.s + self.se) - (self.nw + 2.0 * self.n + self.ne))
            / (8.0 * cell.y);
        (dx, dy)
    }
}

/// Signature shared by every registered formula.
pub type StencilFn = fn(&Neighborhood, CellSize) -> f32;

impl Operator {
    /// The pure formula registered for this operator.
    pub fn stencil(self) -> StencilFn {
        match self {
            Operator::SlopeBurrough => slope_burrough,
            Operator::SlopeZevenbergen => slope_zevenbergen,
            Operator::Hillshade => hillshade,
            Operator::Aspect => aspect,
            Operator::TotalCurvature => total_curvature,
            Operator::PlanCurvature => plan_curvature,
            Operator::ProfileCurvature => profile_curvature,
        }
    }

    #[inline]
    pub fn evaluate(self, nb: &Neighborhood, cell: CellSize) -> f32 {
        (self.stencil())(nb, cell)
    }
}

// ---------------------------------------------------------------------------
// Slope
// ---------------------------------------------------------------------------

/// Slope in degrees, Burrough & McDonnell (Horn 3x3 weights).
pub fn slope_burrough(nb: &Neighborhood, cell: CellSize) -> f32 {
    let (dx, dy) = nb.horn_gradient(cell);
    (dx * dx + dy * dy).sqrt().atan().to_degrees()
}

/// Slope in degrees, Zevenbergen & Thorne (4-neighbour differences).
pub fn slope_zevenbergen(nb: &Neighborhood, cell: CellSize) -> f32 {
    let dx = (nb.e - nb.w) / (2.0 * cell.x);
    let dy = (nb.s - nb.n) / (2.0 * cell.y);
    (dx * dx + dy * dy).sqrt().atan().to_degrees()
}

// ---------------------------------------------------------------------------
// Aspect / hillshade
// ---------------------------------------------------------------------------

/// Value written for cells with no downslope direction.
pub const FLAT_ASPECT: f32 = -1.0;

/// Downslope direction as a compass bearing in degrees (0 = north,
/// clockwise). Flat cells yield [`FLAT_ASPECT`].
pub fn aspect(nb: &Neighborhood, cell: CellSize) -> f32 {
    let (dx, dy) = nb.horn_gradient(cell);
    if dx == 0.0 && dy == 0.0 {
        return FLAT_ASPECT;
    }
    let a = dy.atan2(-dx).to_degrees();
    if a < 0.0 {
        90.0 - a
    } else if a > 90.0 {
        360.0 - a + 90.0
    } else {
        90.0 - a
    }
}

/// Sun altitude above the horizon, degrees.
pub const HILLSHADE_ALTITUDE: f32 = 45.0;
/// Sun azimuth, compass degrees.
pub const HILLSHADE_AZIMUTH: f32 = 315.0;

/// Illumination in `[0, 255]` for a sun at [`HILLSHADE_AZIMUTH`] /
/// [`HILLSHADE_ALTITUDE`], z-factor 1.
pub fn hillshade(nb: &Neighborhood, cell: CellSize) -> f32 {
    let zenith = (90.0 - HILLSHADE_ALTITUDE).to_radians();
    let mut azimuth_math = 360.0 - HILLSHADE_AZIMUTH + 90.0;
    if azimuth_math >= 360.0 {
        azimuth_math -= 360.0;
    }
    let azimuth = azimuth_math.to_radians();

    let (dx, dy) = nb.horn_gradient(cell);
    let slope = (dx * dx + dy * dy).sqrt().atan();

    let aspect = if dx != 0.0 {
        let a = dy.atan2(-dx);
        if a < 0.0 { a + 2.0 * PI } else { a }
    } else if dy > 0.0 {
        FRAC_PI_2
    } else if dy < 0.0 {
        2.0 * PI - FRAC_PI_2
    } else {
        0.0
    };

    let shade = 255.0
        * (zenith.cos() * slope.cos() + zenith.sin() * slope.sin() * (azimuth - aspect).cos());
    shade.max(0.0)
}

// ---------------------------------------------------------------------------
// Curvature (Zevenbergen & Thorne quadratic surface)
// ---------------------------------------------------------------------------

struct Quadratic {
    d: f32,
    e: f32,
    f: f32,
    g: f32,
    h: f32,
}

impl Quadratic {
    #[inline]
    fn fit(nb: &Neighborhood, cell: CellSize) -> Self {
        let (cx, cy) = (cell.x, cell.y);
        Quadratic {
            d: ((nb.w + nb.e) / 2.0 - nb.z) / (cx * cx),
            e: ((nb.n + nb.s) / 2.0 - nb.z) / (cy * cy),
            f: (-nb.nw + nb.ne + nb.sw - nb.se) / (4.0 * cx * cy),
            g: (nb.e - nb.w) / (2.0 * cx),
            h: (nb.n - nb.s) / (2.0 * cy),
        }
    }
}

/// Total (standard) curvature, `-2(D + E) * 100`.
pub fn total_curvature(nb: &Neighborhood, cell: CellSize) -> f32 {
    let q = Quadratic::fit(nb, cell);
    -2.0 * (q.d + q.e) * 100.0
}

/// Curvature along the slope direction. Zero on flat cells.
pub fn profile_curvature(nb: &Neighborhood, cell: CellSize) -> f32 {
    let q = Quadratic::fit(nb, cell);
    let denom = q.g * q.g + q.h * q.h;
    if denom == 0.0 {
        return 0.0;
    }
    -2.0 * (q.d * q.g * q.g + q.e * q.h * q.h + q.f * q.g * q.h) / denom * 100.0
}

/// Curvature across the slope direction. Zero on flat cells.
pub fn plan_curvature(nb: &Neighborhood, cell: CellSize) -> f32 {
    let q = Quadratic::fit(nb, cell);
    let denom = q.g * q.g + q.h * q.h;
    if denom == 0.0 {
        return 0.0;
    }
    2.0 * (q.d * q.h * q.h + q.e * q.g * q.g - q.f * q.g * q.h) / denom * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(v: f32) -> Neighborhood {
        Neighborhood::from_rows([[v; 3]; 3])
    }

    /// Plane rising `gx` per column and `gy` per row.
    fn plane(gx: f32, gy: f32) -> Neighborhood {
        let mut rows = [[0.0f32; 3]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = 100.0 + gx * c as f32 + gy * r as f32;
            }
        }
        Neighborhood::from_rows(rows)
    }

    #[test]
    fn test_gather_layout() {
        // 3x4 buffer, value = row * 10 + col.
        let src: Vec<f32> = (0..3).flat_map(|r| (0..4).map(move |c| (r * 10 + c) as f32)).collect();
        let nb = Neighborhood::gather(&src, 4, 1, 2);
        assert_eq!(nb.nw, 1.0);
        assert_eq!(nb.n, 2.0);
        assert_eq!(nb.ne, 3.0);
        assert_eq!(nb.w, 11.0);
        assert_eq!(nb.z, 12.0);
        assert_eq!(nb.e, 13.0);
        assert_eq!(nb.sw, 21.0);
        assert_eq!(nb.s, 22.0);
        assert_eq!(nb.se, 23.0);
    }

    #[test]
    fn test_flat_surface() {
        let nb = flat(250.0);
        assert_eq!(slope_burrough(&nb, CellSize::UNIT), 0.0);
        assert_eq!(slope_zevenbergen(&nb, CellSize::UNIT), 0.0);
        assert_eq!(aspect(&nb, CellSize::UNIT), FLAT_ASPECT);
        assert_eq!(total_curvature(&nb, CellSize::UNIT), 0.0);
        assert_eq!(plan_curvature(&nb, CellSize::UNIT), 0.0);
        assert_eq!(profile_curvature(&nb, CellSize::UNIT), 0.0);
        // Flat ground lit from 45 degrees: 255 * cos(45).
        let hs = hillshade(&nb, CellSize::UNIT);
        assert!((hs - 180.312).abs() < 1e-2, "hillshade on flat = {hs}");
    }

    #[test]
    fn test_slope_45_degrees() {
        // One unit rise per one unit run along x.
        let nb = plane(1.0, 0.0);
        assert!((slope_burrough(&nb, CellSize::UNIT) - 45.0).abs() < 1e-4);
        assert!((slope_zevenbergen(&nb, CellSize::UNIT) - 45.0).abs() < 1e-4);
    }

    #[test]
    fn test_slope_scales_with_cell_size() {
        let nb = plane(10.0, 0.0);
        let s = slope_burrough(&nb, CellSize::new(10.0, 10.0));
        assert!((s - 45.0).abs() < 1e-4, "got {s}");
        // Anisotropic cells: y spacing does not affect a pure x gradient.
        let s = slope_burrough(&nb, CellSize::new(10.0, 3.0));
        assert!((s - 45.0).abs() < 1e-4, "got {s}");
    }

    #[test]
    fn test_aspect_cardinal_directions() {
        // Rising eastward faces west, etc.
        assert!((aspect(&plane(1.0, 0.0), CellSize::UNIT) - 270.0).abs() < 1e-3);
        assert!((aspect(&plane(-1.0, 0.0), CellSize::UNIT) - 90.0).abs() < 1e-3);
        // Rising southward faces north.
        let north = aspect(&plane(0.0, 1.0), CellSize::UNIT);
        assert!(north.abs() < 1e-3 || (north - 360.0).abs() < 1e-3, "got {north}");
        assert!((aspect(&plane(0.0, -1.0), CellSize::UNIT) - 180.0).abs() < 1e-3);
    }

    #[test]
    fn test_hillshade_faces_sun() {
        // Northwest sun: a slope facing northwest is brighter than one facing
        // southeast.
        let facing_nw = plane(1.0, 1.0);
        let facing_se = plane(-1.0, -1.0);
        let lit = hillshade(&facing_nw, CellSize::UNIT);
        let dark = hillshade(&facing_se, CellSize::UNIT);
        assert!(lit > dark, "lit={lit} dark={dark}");
        assert!((0.0..=255.0).contains(&lit));
        assert!(dark >= 0.0);
    }

    #[test]
    fn test_curvature_of_bowl_and_dome() {
        // Bowl: centre lower than neighbours -> negative total curvature.
        let bowl = Neighborhood::from_rows([[1.0, 1.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0]]);
        assert!((total_curvature(&bowl, CellSize::UNIT) + 400.0).abs() < 1e-3);
        let dome = Neighborhood::from_rows([[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);
        assert!((total_curvature(&dome, CellSize::UNIT) - 400.0).abs() < 1e-3);
    }

    #[test]
    fn test_plane_has_no_curvature() {
        let nb = plane(2.0, -3.0);
        assert!(total_curvature(&nb, CellSize::UNIT).abs() < 1e-3);
        assert!(plan_curvature(&nb, CellSize::UNIT).abs() < 1e-3);
        assert!(profile_curvature(&nb, CellSize::UNIT).abs() < 1e-3);
    }

    #[test]
    fn test_profile_curvature_on_convex_ramp() {
        // Elevation 0,1,3 west to east: slope steepens eastward.
        let nb = Neighborhood::from_rows([[0.0, 1.0, 3.0]; 3]);
        // D = ((0+3)/2 - 1) = 0.5, G = 1.5, E = F = H = 0.
        // profile = -2 * D * G^2 / G^2 * 100 = -100.
        assert!((profile_curvature(&nb, CellSize::UNIT) + 100.0).abs() < 1e-3);
        assert!(plan_curvature(&nb, CellSize::UNIT).abs() < 1e-3);
        assert!((total_curvature(&nb, CellSize::UNIT) + 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_registry_dispatches_to_formula() {
        let nb = plane(1.0, 0.5);
        let cell = CellSize::new(2.0, 2.0);
        assert_eq!(Operator::SlopeBurrough.evaluate(&nb, cell), slope_burrough(&nb, cell));
        assert_eq!(Operator::Aspect.evaluate(&nb, cell), aspect(&nb, cell));
        assert_eq!(Operator::PlanCurvature.evaluate(&nb, cell), plan_curvature(&nb, cell));
    }
}
