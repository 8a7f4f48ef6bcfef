pub mod analysis;
pub mod capture;
pub mod inference;
pub mod messaging;
pub mod overlay;
pub mod runtime;
pub mod session;
pub mod shared;
pub mod tracking;
