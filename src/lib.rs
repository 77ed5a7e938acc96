//! Terminal client for the Daria companion server: a desktop of windows,
//! icons and toasts driven by the server's notification stream, pollers and
//! image jobs.

pub mod actions;
pub mod api;
pub mod catalog;
pub mod chat;
pub mod choreography;
pub mod config;
pub mod desktop;
pub mod error;
pub mod geometry;
pub mod icons;
pub mod jobs;
pub mod logging;
pub mod notify;
pub mod player;
pub mod pollers;
pub mod session;
pub mod stream;
pub mod tasks;
pub mod ui;
pub mod wm;

#[cfg(test)]
mod testing;
