#![allow(dead_code)]

pub mod builders;
pub mod dir;
pub mod server;

pub use builders::{PolicyBuilder, RoleBuilder};
pub use dir::TestPolicyDir;
pub use server::TestServer;
