pub mod config;
pub mod counters;
pub mod dto;
pub mod error;
pub mod export;
pub mod recorder;
pub mod response;
pub mod selector;
pub mod service;
pub mod store;
pub mod util;

pub use service::ReviewService;
