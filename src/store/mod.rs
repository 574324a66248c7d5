//! Persistence layer — libSQL-backed storage for verification policies.

pub mod libsql_backend;
pub mod migrations;
pub mod policy;
pub mod traits;

pub use libsql_backend::LibSqlPolicyStore;
pub use policy::VerificationPolicy;
pub use traits::PolicyStore;
