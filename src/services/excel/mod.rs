pub mod analyzer;
pub mod cleaner;
pub mod processor;
pub mod types;
pub mod utils;

pub use analyzer::ColumnAnalyzer;
pub use processor::SheetDecoder;
