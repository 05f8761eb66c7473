//! Storybook API Library Crate
//!
//! This library contains the HTTP surface of the storybook builder: the
//! configuration, the application state, the proxy and story handlers, and the
//! routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod session;
pub mod state;
