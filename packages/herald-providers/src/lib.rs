pub mod rooms;
pub mod webhook;

mod error;

pub use error::{Error, Result};
