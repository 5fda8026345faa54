pub mod api;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod identification;
pub mod issuance;
pub mod queries;
pub mod records;
pub mod registry;
pub mod service;
pub mod splitter;
pub mod store;
pub mod trading;
pub mod types;

pub use error::{RegoError, RegoResult};
pub use service::RegoService;
