pub mod http;
pub mod report;
pub mod sessions;
pub mod workflow;
