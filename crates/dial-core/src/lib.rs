pub mod diagnostic;
pub mod error;
pub mod save_log;
pub mod types;
pub mod value;

pub use diagnostic::*;
pub use error::DialError;
pub use save_log::*;
pub use types::*;
pub use value::*;
