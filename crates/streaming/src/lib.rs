// Streaming crate: backend sources, viewport aggregation and the map session.

pub mod coordinator;
pub mod error;
pub mod location;
pub mod protocol;
pub mod session;
pub mod source;

pub use coordinator::*;
pub use error::*;
pub use location::*;
pub use protocol::*;
pub use session::*;
pub use source::*;
