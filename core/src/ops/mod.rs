//! Business operations over the document store. Each operation is exactly one
//! store transaction; the HTTP layer in `apps/server` is thin glue over these.

pub mod heartbeat;
pub mod maintenance;
pub mod sync;
