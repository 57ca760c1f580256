pub mod airtable;
pub mod config;
pub mod dispatch;
pub mod extract;
pub mod model;
pub mod render;
pub mod telegram;
pub mod webhook;
