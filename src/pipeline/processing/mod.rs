// Pipeline processing: extraction, normalization, and validation

pub mod extract;
pub mod normalize;
pub mod quality_gate;
