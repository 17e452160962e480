use thiserror::Error;

#[derive(Error, Debug)]
pub enum DwiAlignError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid NIfTI file: {0}")]
    InvalidNifti(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Gradient scheme has {rows} entries but the series has {volumes} volumes")]
    GradientMismatch { rows: usize, volumes: usize },

    #[error("Mask dimensions {mask:?} do not match series dimensions {series:?}")]
    MaskMismatch {
        mask: (usize, usize, usize),
        series: (usize, usize, usize),
    },

    #[error("Multiband factor {factor} does not divide slice count {slices}")]
    InvalidMultiband { factor: usize, slices: usize },

    #[error("Incompatible basis: {0}")]
    IncompatibleBasis(String),

    #[error("Registration failed for volume {volume}, slice group {group}: {reason}")]
    RegistrationFailed {
        volume: usize,
        group: usize,
        reason: String,
    },

    #[error("Reconstruction failed: {0}")]
    Reconstruction(String),

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, DwiAlignError>;
