pub mod announce;
pub mod backfill;
pub mod client;
pub mod clonehero;
pub mod config;
pub mod context;
pub mod links;
pub mod logs;
pub mod songs;
pub mod submission;
pub mod time;
pub mod user;
