pub mod components;
pub mod notify;
pub mod pipeline;
pub mod retrieve;
pub mod seed;
pub mod upload;
