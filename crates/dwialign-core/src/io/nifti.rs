use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array4, ArrayD, IxDyn, ShapeBuilder};

use crate::error::{DwiAlignError, Result};
use crate::volume::{Mask, VolumeSeries};

const HEADER_SIZE: usize = 348;
const MAGIC_OFFSET: usize = 344;

// NIfTI-1 datatype codes.
const DT_UINT8: i16 = 2;
const DT_INT16: i16 = 4;
const DT_INT32: i16 = 8;
const DT_FLOAT32: i16 = 16;
const DT_FLOAT64: i16 = 64;
const DT_UINT16: i16 = 512;

/// Parsed NIfTI-1 header fields used by this crate.
#[derive(Clone, Debug)]
pub struct NiftiHeader {
    pub dims: Vec<usize>,
    pub datatype: i16,
    pub voxel_sizes: Vec<f32>,
    pub vox_offset: usize,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub little_endian: bool,
}

impl NiftiHeader {
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Read a NIfTI-1 file (`.nii` or `.nii.gz`) into a dynamic-dimension f32
/// array in (x, y, slice, volume) axis order.
pub fn load(path: &Path) -> Result<(NiftiHeader, ArrayD<f32>)> {
    let bytes = read_all(path)?;
    if bytes.len() < HEADER_SIZE {
        return Err(DwiAlignError::InvalidNifti(format!(
            "{}: file too small for NIfTI-1 header",
            path.display()
        )));
    }

    let header = parse_header(&bytes, path)?;
    let data = decode_data(&bytes, &header, path)?;
    let array = ArrayD::from_shape_vec(IxDyn(&header.dims).f(), data)
        .map_err(|e| DwiAlignError::InvalidNifti(format!("{}: {}", path.display(), e)))?;
    Ok((header, array))
}

/// Load a 4-D DWI series. Non-4-D input is rejected here, before any mask
/// or shell processing happens.
pub fn load_series(path: &Path) -> Result<VolumeSeries> {
    let (_, array) = load(path)?;
    VolumeSeries::from_dyn(array)
}

/// Load a 3-D mask volume; voxels above 0.5 are inside.
pub fn load_mask(path: &Path) -> Result<Mask> {
    let (_, array) = load(path)?;
    if array.ndim() != 3 {
        return Err(DwiAlignError::InvalidInput(format!(
            "3-D mask expected, got {}-D input",
            array.ndim()
        )));
    }
    let array = array
        .into_dimensionality::<ndarray::Ix3>()
        .map_err(|e| DwiAlignError::InvalidInput(e.to_string()))?;
    Ok(Mask::new(array.mapv(|v| v > 0.5)))
}

/// Write a 4-D series as float32 NIfTI-1 (`.nii`, gzip-compressed when the
/// path ends in `.gz`).
pub fn save_series(path: &Path, data: &Array4<f32>) -> Result<()> {
    let dims: Vec<usize> = data.shape().to_vec();
    let mut buf = Vec::with_capacity(HEADER_SIZE + 4 + data.len() * 4);
    write_header(&mut buf, &dims)?;
    // Data block in Fortran order (x fastest), matching the on-disk layout.
    for &v in data.t().iter() {
        buf.write_f32::<LittleEndian>(v)?;
    }

    if path.extension().is_some_and(|e| e == "gz") {
        let file = File::create(path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&buf)?;
        encoder.finish()?;
    } else {
        File::create(path)?.write_all(&buf)?;
    }
    Ok(())
}

fn read_all(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;

    // Gzip magic; extension is not trusted.
    if raw.len() >= 2 && raw[0] == 0x1f && raw[1] == 0x8b {
        let mut decoded = Vec::new();
        GzDecoder::new(&raw[..]).read_to_end(&mut decoded)?;
        Ok(decoded)
    } else {
        Ok(raw)
    }
}

fn parse_header(buf: &[u8], path: &Path) -> Result<NiftiHeader> {
    let magic = &buf[MAGIC_OFFSET..MAGIC_OFFSET + 4];
    if &magic[..3] != b"n+1" && &magic[..3] != b"ni1" {
        return Err(DwiAlignError::InvalidNifti(format!(
            "{}: missing NIfTI-1 magic",
            path.display()
        )));
    }

    // Endianness is signalled by whether sizeof_hdr reads as 348.
    let little_endian = LittleEndian::read_i32(&buf[0..4]) == HEADER_SIZE as i32;
    if !little_endian && BigEndian::read_i32(&buf[0..4]) != HEADER_SIZE as i32 {
        return Err(DwiAlignError::InvalidNifti(format!(
            "{}: bad sizeof_hdr field",
            path.display()
        )));
    }

    let read_i16 = |off: usize| -> i16 {
        if little_endian {
            LittleEndian::read_i16(&buf[off..off + 2])
        } else {
            BigEndian::read_i16(&buf[off..off + 2])
        }
    };
    let read_f32 = |off: usize| -> f32 {
        if little_endian {
            LittleEndian::read_f32(&buf[off..off + 4])
        } else {
            BigEndian::read_f32(&buf[off..off + 4])
        }
    };

    let ndim = read_i16(40) as usize;
    if ndim == 0 || ndim > 7 {
        return Err(DwiAlignError::InvalidNifti(format!(
            "{}: invalid dimension count {}",
            path.display(),
            ndim
        )));
    }
    let dims: Vec<usize> = (1..=ndim).map(|i| read_i16(40 + 2 * i).max(1) as usize).collect();
    let voxel_sizes: Vec<f32> = (1..=ndim).map(|i| read_f32(76 + 4 * i)).collect();

    let scl_slope = read_f32(112);
    Ok(NiftiHeader {
        dims,
        datatype: read_i16(70),
        voxel_sizes,
        vox_offset: read_f32(108) as usize,
        scl_slope: if scl_slope == 0.0 { 1.0 } else { scl_slope },
        scl_inter: read_f32(116),
        little_endian,
    })
}

fn decode_data(buf: &[u8], header: &NiftiHeader, path: &Path) -> Result<Vec<f32>> {
    let count = header.element_count();
    let elem_size = match header.datatype {
        DT_UINT8 => 1,
        DT_INT16 | DT_UINT16 => 2,
        DT_INT32 | DT_FLOAT32 => 4,
        DT_FLOAT64 => 8,
        dt => {
            return Err(DwiAlignError::InvalidNifti(format!(
                "{}: unsupported datatype code {}",
                path.display(),
                dt
            )))
        }
    };
    let offset = header.vox_offset.max(HEADER_SIZE);
    let end = offset + count * elem_size;
    if buf.len() < end {
        return Err(DwiAlignError::InvalidNifti(format!(
            "{}: truncated data block, expected {} bytes, got {}",
            path.display(),
            end,
            buf.len()
        )));
    }

    let mut cursor = Cursor::new(&buf[offset..end]);
    let mut data = Vec::with_capacity(count);
    macro_rules! decode {
        ($read:ident) => {
            for _ in 0..count {
                let v = if header.little_endian {
                    cursor.$read::<LittleEndian>()? as f32
                } else {
                    cursor.$read::<BigEndian>()? as f32
                };
                data.push(v * header.scl_slope + header.scl_inter);
            }
        };
    }
    match header.datatype {
        DT_UINT8 => {
            for _ in 0..count {
                let v = cursor.read_u8()? as f32;
                data.push(v * header.scl_slope + header.scl_inter);
            }
        }
        DT_INT16 => decode!(read_i16),
        DT_UINT16 => decode!(read_u16),
        DT_INT32 => decode!(read_i32),
        DT_FLOAT32 => decode!(read_f32),
        DT_FLOAT64 => decode!(read_f64),
        _ => unreachable!(),
    }
    Ok(data)
}

fn write_header(buf: &mut Vec<u8>, dims: &[usize]) -> Result<()> {
    let mut header = vec![0u8; HEADER_SIZE + 4];
    LittleEndian::write_i32(&mut header[0..4], HEADER_SIZE as i32);

    LittleEndian::write_i16(&mut header[40..42], dims.len() as i16);
    for (i, &d) in dims.iter().enumerate() {
        LittleEndian::write_i16(&mut header[42 + 2 * i..44 + 2 * i], d as i16);
    }
    for i in dims.len()..7 {
        LittleEndian::write_i16(&mut header[42 + 2 * i..44 + 2 * i], 1);
    }

    LittleEndian::write_i16(&mut header[70..72], DT_FLOAT32);
    LittleEndian::write_i16(&mut header[72..74], 32); // bitpix

    // pixdim: unit voxels; spatial calibration is carried by the input.
    for i in 0..=dims.len() {
        LittleEndian::write_f32(&mut header[76 + 4 * i..80 + 4 * i], 1.0);
    }

    LittleEndian::write_f32(&mut header[108..112], (HEADER_SIZE + 4) as f32); // vox_offset
    LittleEndian::write_f32(&mut header[112..116], 1.0); // scl_slope

    header[MAGIC_OFFSET..MAGIC_OFFSET + 4].copy_from_slice(b"n+1\0");
    buf.extend_from_slice(&header);
    Ok(())
}
