pub mod converter;
pub mod oracle;

pub use converter::{Mda2AsciiConverter, PrecomputedConverter};
pub use oracle::CommandOracle;
