//! The container handle and its lifecycle (open, create, temporary, init).

mod gpkg;

pub use gpkg::Gpkg;
