//! Small, self-contained helpers shared across the object-building code.

pub mod resources;
