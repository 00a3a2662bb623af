pub mod coordinator;
pub mod log_store;
pub mod metadata;
pub mod recovery;
pub mod registry;


pub use coordinator::*;
pub use log_store::*;
pub use metadata::*;
pub use recovery::*;
pub use registry::*;
