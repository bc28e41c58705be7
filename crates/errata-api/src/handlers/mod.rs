//! HTTP handlers, one module per route group.

pub mod admin;
pub mod auth;
pub mod chat;
pub mod files;
pub mod models;
pub mod notes;
pub mod quiz;
pub mod upload;
