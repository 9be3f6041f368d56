pub mod batch;
pub mod client;
pub mod config;
pub mod download_plan;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod image_selection;
pub mod item_type;
pub mod order;
pub mod retry;
pub mod search;
