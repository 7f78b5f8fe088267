pub mod annotation;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod grid;
pub mod logging;
pub mod mapping;
pub mod metrics;
pub mod model;
pub mod resolver;
pub mod utils;
pub mod wikify;

pub use annotation::{Annotation, Rect, Region, Source, SubjectRegion, ValueType};
pub use cache::{CacheOutcome, CacheStats, ResultCache, SheetCache};
pub use config::{ConfigArgs, EngineConfig};
pub use engine::{Engine, EngineOutput, EngineStats};
pub use error::{CellError, CellErrorKind, EngineError, EngineResult, StatementField};
pub use grid::{FileGridSource, Grid, GridSource};
pub use logging::{LoggingConfig, init_logging};
pub use mapping::{GenerationResult, StatementGenerator, Window};
pub use metrics::METRICS;
pub use model::{CellCoord, CellValue, Statement, StatementValue};
pub use wikify::{ItemTable, Wikifier};
