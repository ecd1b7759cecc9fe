pub mod error;
pub mod overlay;
pub mod session;
pub mod tracking;
pub mod video;
pub mod web;
