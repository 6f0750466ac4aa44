// Layers crate: turns scene selections into what the detail surface shows.

pub mod detail;
pub mod distance;
pub mod symbology;

pub use detail::*;
pub use distance::*;
pub use symbology::*;
