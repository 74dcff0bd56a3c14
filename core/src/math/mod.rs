pub mod calculus;
pub mod fft;
pub mod interp;
pub mod matrix;
pub mod poly;
pub mod stats;

pub use fft::{FftHelper, PowerSpectrum};
pub use interp::LinearInterpolator;
pub use matrix::MatrixHelper;
pub use poly::PolyHelper;
pub use stats::StatsHelper;
