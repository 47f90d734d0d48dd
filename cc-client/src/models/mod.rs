pub mod commits;
pub mod tables;

pub use commits::{CommitInfo, CommitRequest, CommitsRequest, CommitsResponse};
pub use tables::{RegisterTableRequest, RegisterTableResponse};
