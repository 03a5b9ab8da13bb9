pub mod backup;
pub mod charts;
pub mod db_loader;
pub mod excel;
pub mod filters;
pub mod pipeline;
pub mod workspace;
