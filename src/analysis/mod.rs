//! Post-compilation analysis: complexity classification and hint scanning

pub mod complexity;
pub mod corrector;

pub use complexity::{ComplexityAnalyzer, ComplexityLevel, ComplexityMetrics};
pub use corrector::SqlCorrector;
