pub mod event;
pub mod signal;
pub mod worker;
