pub mod entry;
pub mod user;
