pub mod backfill_fcs;
pub mod config;
pub mod import_charts;
