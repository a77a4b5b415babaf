pub mod connection;
pub mod guard;
pub mod query;

pub use connection::{connect_with_settings, probe, DbPool};
pub use guard::{GuardPolicy, QueryGuard, RejectedQuery};
pub use query::{DataAccess, DataAccessError, QueryParams, Row, SqlDataAccess};
