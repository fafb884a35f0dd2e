pub mod auth;
pub mod chat;
pub mod error;
pub mod items;
pub mod middleware;
pub mod notifications;
pub mod requests;
