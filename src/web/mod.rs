//! HTTP surface: start/stop/status endpoints and the live event stream

pub mod error;
pub mod handlers;
pub mod router;
pub mod stream;

pub use error::AppError;
pub use router::{AppState, create_router};
