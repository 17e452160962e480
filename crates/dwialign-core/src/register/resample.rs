use ndarray::ArrayView3;

/// Sample a volume at a fractional voxel coordinate with trilinear
/// interpolation. Returns `None` outside the field of view, so callers can
/// exclude out-of-bounds voxels instead of biasing towards an edge value.
pub fn trilinear_sample(volume: &ArrayView3<'_, f32>, point: [f64; 3]) -> Option<f32> {
    let (nx, ny, nz) = volume.dim();
    let [x, y, z] = point;
    if x < 0.0 || y < 0.0 || z < 0.0 {
        return None;
    }
    if x > (nx - 1) as f64 || y > (ny - 1) as f64 || z > (nz - 1) as f64 {
        return None;
    }

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let z0 = z.floor() as usize;
    let x1 = (x0 + 1).min(nx - 1);
    let y1 = (y0 + 1).min(ny - 1);
    let z1 = (z0 + 1).min(nz - 1);
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;
    let fz = (z - z0 as f64) as f32;

    let c00 = volume[[x0, y0, z0]] * (1.0 - fx) + volume[[x1, y0, z0]] * fx;
    let c10 = volume[[x0, y1, z0]] * (1.0 - fx) + volume[[x1, y1, z0]] * fx;
    let c01 = volume[[x0, y0, z1]] * (1.0 - fx) + volume[[x1, y0, z1]] * fx;
    let c11 = volume[[x0, y1, z1]] * (1.0 - fx) + volume[[x1, y1, z1]] * fx;

    let c0 = c00 * (1.0 - fy) + c10 * fy;
    let c1 = c01 * (1.0 - fy) + c11 * fy;
    Some(c0 * (1.0 - fz) + c1 * fz)
}
