#![allow(dead_code)]

use ndarray::Array4;

use dwialign_core::gradient::{GradientEntry, GradientScheme};
use dwialign_core::volume::{Mask, VolumeSeries};

/// Synthetic series: a smooth Gaussian blob, identical in every volume.
pub fn blob_series(nx: usize, ny: usize, nz: usize, volumes: usize) -> VolumeSeries {
    blob_series_shifted(nx, ny, nz, volumes, &vec![[0.0; 3]; volumes])
}

/// Synthetic series with a per-volume blob displacement, emulating
/// rigid subject motion between volumes.
pub fn blob_series_shifted(
    nx: usize,
    ny: usize,
    nz: usize,
    volumes: usize,
    shifts: &[[f64; 3]],
) -> VolumeSeries {
    let cx = (nx as f64 - 1.0) / 2.0;
    let cy = (ny as f64 - 1.0) / 2.0;
    let cz = (nz as f64 - 1.0) / 2.0;
    let sigma2 = 2.0 * 9.0;
    let data = Array4::from_shape_fn((nx, ny, nz, volumes), |(x, y, z, v)| {
        let dx = x as f64 - cx - shifts[v][0];
        let dy = y as f64 - cy - shifts[v][1];
        let dz = z as f64 - cz - shifts[v][2];
        (100.0 * (-(dx * dx + dy * dy + dz * dz) / sigma2).exp()) as f32
    });
    VolumeSeries::new(data)
}

/// Single-shell scheme at b=1000 with directions spread over the sphere;
/// the first volume is b=0.
pub fn single_shell_scheme(volumes: usize) -> GradientScheme {
    let mut entries = vec![GradientEntry {
        direction: [0.0, 0.0, 0.0],
        bvalue: 0.0,
    }];
    for i in 1..volumes {
        let theta = 0.5 + 2.2 * i as f64;
        let phi = 1.1 * i as f64;
        entries.push(GradientEntry {
            direction: [
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            ],
            bvalue: 1000.0,
        });
    }
    GradientScheme::new(entries)
}

/// All-b=0 scheme.
pub fn b0_scheme(volumes: usize) -> GradientScheme {
    GradientScheme::new(
        (0..volumes)
            .map(|_| GradientEntry {
                direction: [0.0, 0.0, 0.0],
                bvalue: 0.0,
            })
            .collect(),
    )
}

/// Two-shell scheme: half the volumes at b=1000, half at b=2000.
pub fn two_shell_scheme(volumes: usize) -> GradientScheme {
    GradientScheme::new(
        (0..volumes)
            .map(|i| GradientEntry {
                direction: [1.0, 0.0, 0.0],
                bvalue: if i % 2 == 0 { 1000.0 } else { 2000.0 },
            })
            .collect(),
    )
}

pub fn full_mask(series: &VolumeSeries) -> Mask {
    Mask::full(series.spatial_dims())
}

/// Minimal float32 NIfTI-1 file with the given dimensions, all voxels zero.
/// Used to exercise dimensionality checks the writer cannot produce.
pub fn build_nifti_bytes(dims: &[usize]) -> Vec<u8> {
    let mut header = vec![0u8; 352];
    header[0..4].copy_from_slice(&348i32.to_le_bytes());
    header[40..42].copy_from_slice(&(dims.len() as i16).to_le_bytes());
    for (i, &d) in dims.iter().enumerate() {
        header[42 + 2 * i..44 + 2 * i].copy_from_slice(&(d as i16).to_le_bytes());
    }
    header[70..72].copy_from_slice(&16i16.to_le_bytes()); // float32
    header[72..74].copy_from_slice(&32i16.to_le_bytes());
    header[108..112].copy_from_slice(&352f32.to_le_bytes());
    header[112..116].copy_from_slice(&1f32.to_le_bytes());
    header[344..348].copy_from_slice(b"n+1\0");

    let count: usize = dims.iter().product();
    header.extend(std::iter::repeat(0u8).take(count * 4));
    header
}

/// Write bytes to a temp file and return the handle keeping it alive.
pub fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut f = tempfile::NamedTempFile::new().expect("create temp file");
    f.write_all(bytes).expect("write data");
    f.flush().expect("flush");
    f
}
