//! Session lifecycle management
//!
//! A session is born when a handshake succeeds, lives in the [`table::SessionTable`],
//! and dies when its engine closes. The [`router::SessionRouter`] decides which
//! engine, if any, serves each request.

pub mod router;
pub mod table;
