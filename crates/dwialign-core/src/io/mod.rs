pub mod nifti;
pub mod text;

pub use nifti::{load_mask, load_series, save_series, NiftiHeader};
