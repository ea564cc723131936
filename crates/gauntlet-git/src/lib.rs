pub mod command;
pub mod error;
pub mod session;
pub mod workspace;

pub use command::*;
pub use error::*;
pub use session::*;
pub use workspace::*;
