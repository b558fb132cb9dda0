pub mod dir_provider;
pub mod gpg_provider;
pub mod memory_provider;
