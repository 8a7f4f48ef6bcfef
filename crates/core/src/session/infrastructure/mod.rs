pub mod coordinator;
pub mod coordinator_handle;
pub mod thread_provisioner;
