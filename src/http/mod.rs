//! HTTP/1.1 front end.
//!
//! - **`connection`**: per-connection request/response state machine
//! - **`parser`**: parses inbound requests from byte buffers
//! - **`request`**: request representation and header/query helpers
//! - **`response`**: locally generated responses with a builder
//! - **`writer`**: serializes responses onto the client socket
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Route, forward or probe
//!        └──────┬───────────┘
//!               │
//!       ┌───────┴────────┐
//!       ▼                ▼
//!  ┌──────────┐    ┌──────────┐
//!  │ Writing  │    │ Relaying │ ← Upstream bytes streamed through
//!  └────┬─────┘    └────┬─────┘
//!       ├─ Keep-Alive → Reading
//!       └─ Close ───────┴──→ Closed
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
