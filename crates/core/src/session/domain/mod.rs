pub mod alert_policy;
pub mod capture_session;
pub mod confidence_smoother;
pub mod context_provisioner;
pub mod session_error;
pub mod target;
