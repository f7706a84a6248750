pub mod bulk;
pub mod filter;
pub mod selection;
pub mod shelf;
pub mod store;
pub mod surface;
pub mod upload;

pub use shelf::{Shelf, ShelfStats, UploadReport};

#[cfg(test)]
mod testing;
