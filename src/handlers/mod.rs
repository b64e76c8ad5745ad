pub mod account;
pub mod auth;
pub mod entries;
pub mod health;
pub mod media;
pub mod stats;
