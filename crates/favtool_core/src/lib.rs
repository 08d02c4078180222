pub mod action;
pub mod api;
pub mod cache;
pub mod config;
pub mod messages;
pub mod remote;
pub mod runtime;
pub mod session;
pub mod store;
pub mod title;
