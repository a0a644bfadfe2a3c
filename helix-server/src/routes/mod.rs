pub mod admin;
pub mod chat;
pub mod completions;
pub mod health;
pub mod models;
