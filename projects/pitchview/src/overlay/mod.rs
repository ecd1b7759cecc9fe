pub mod annotations;
pub mod geometry;
pub mod projector;
pub mod types;
pub mod viewport;
