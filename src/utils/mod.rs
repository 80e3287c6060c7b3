//! The `utils` module holds pieces shared by every other module: the error
//! taxonomy and the tracing setup.

pub mod error;
pub mod logging;

pub use error::{CodecError, DeliveryError, Error, Result};
