mod http;

pub use http::{task_committed, TaskCommittedRequest, TaskCommittedResponse};
