pub mod api;
pub mod consume;
mod store;
