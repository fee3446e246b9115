// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod session;
pub mod state;

pub use error::{classify_transport_error, Error, Result};
pub use protocol::*;
pub use session::{Session, SessionStatus};
pub use state::{ConnectionState, ConnectionStatus};
