//! towel - idle-aware rest break enforcer for X11.
//!
//! Accumulates active-use time from periodic idle samples and, once enough
//! has piled up, covers the screen with an input-grabbing countdown until the
//! break is over.

pub mod config;
pub mod countdown;
pub mod daemon;
pub mod display;
pub mod idle;
pub mod machine;
pub mod notify;
pub mod overlay;
pub mod render;
pub mod work;
