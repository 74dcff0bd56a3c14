pub mod average;
pub mod detrend;
pub mod ellipse;
pub mod extract;
pub mod filter;
pub mod fit;
pub mod flat;
pub mod integrate;
pub mod radius;
pub mod slope;

pub use average::{AveragedProfile, MultiPassAverager, GRID_SIZE};
pub use detrend::{DetrendStage, ErrorStats};
pub use ellipse::EllipticalMirrorFitter;
pub use extract::{ExtractedProfile, ProfileExtractor};
pub use filter::NoiseFilter;
pub use fit::{fit_profile, fitter_for, FitResult, FittedShape};
pub use flat::FlatMirrorFitter;
pub use integrate::HeightIntegrator;
pub use radius::{RadiusEstimate, RadiusEstimator};
pub use slope::Orientation;
