pub mod generator;
pub mod highlight;
pub mod values;

pub use generator::{
    GenerationMetadata, GenerationResult, POINT_IN_TIME, STATED_IN, StatementGenerator, Window,
};
pub use highlight::highlights;
