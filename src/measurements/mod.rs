//! Measurement categories and the detail batch linker.

mod category;
mod linker;

pub use category::Category;
pub use linker::{DetailLinker, LinkerError, SaveMode};
