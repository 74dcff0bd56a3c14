pub mod directory;
pub mod model;

pub use directory::DirectorySink;
pub use model::RunSummary;
