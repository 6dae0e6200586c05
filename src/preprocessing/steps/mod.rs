//! Individual preprocessing steps

pub mod denoise;
pub mod encode;
pub mod equalize;
pub mod grayscale;
pub mod rotate;
