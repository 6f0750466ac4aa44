pub mod cluster;
pub mod entity;
pub mod filter;
pub mod records;
pub mod selection;

pub use cluster::*;
pub use entity::*;
pub use filter::*;
pub use records::*;
pub use selection::*;
