pub mod channel;
pub mod host_message;
pub mod messages;
pub mod retry_policy;
