pub mod diagnostics;
pub mod manager;
pub mod store;
