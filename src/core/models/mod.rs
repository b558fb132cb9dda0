pub mod backend;
pub mod entry;
pub mod event;
pub mod payload;
