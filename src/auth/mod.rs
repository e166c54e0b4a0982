//! Bearer-token authentication backed by server-side sessions.

pub mod middleware;
pub mod session;
pub mod verify;

pub use middleware::{authenticate, Access, AppState, AuthGate, Identity};
pub use session::{generate_session_id, SessionRegistry};
pub use verify::{Claims, JwtCodec, TokenCodec};
