#![forbid(unsafe_code)]

pub mod app;
pub mod archive;
pub mod chapters;
pub mod cli;
pub mod convert;
pub mod crawl;
pub mod encode;
pub mod error;
pub mod fetch;
pub mod frontier;
pub mod logging;
pub mod mirror;
pub mod path_map;
pub mod urls;
