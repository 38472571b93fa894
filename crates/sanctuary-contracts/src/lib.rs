pub mod chat;
pub mod components;
pub mod error;
pub mod events;
pub mod ledger;
pub mod messages;
pub mod models;
pub mod payload;
pub mod rooms;
