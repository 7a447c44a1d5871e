//! Trainer Assist: conversational task engine for trainers and their clients.

pub mod actors;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod flows;
pub mod invitations;
pub mod monitor;
pub mod relationships;
pub mod store;
pub mod tasks;
