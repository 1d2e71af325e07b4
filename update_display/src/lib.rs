//! Put an image on a 10.3 inch IT8951 e-paper panel.
//!
//! Both `update-display` and `update-screen` are thin wrappers around
//! [`cli::main`], each with its own [`config::Profile`].

pub mod bitmap;
pub mod cli;
pub mod config;
pub mod display;
pub mod format;
pub mod it8951;
pub mod packed4bpp;
pub mod session;
