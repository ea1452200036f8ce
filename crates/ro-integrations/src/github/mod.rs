pub mod client;
pub mod collector;
pub mod fetcher;
pub mod mock;
pub mod source;
