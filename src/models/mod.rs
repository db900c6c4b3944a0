pub mod api;
pub mod item;
