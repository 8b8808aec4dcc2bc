//! Listener adapters. Each one turns raw connections into [`Connection`]s
//! and hands them to the [`Hub`]; framing never leaks past this module.
//!
//! [`Connection`]: crate::connection::Connection
//! [`Hub`]: crate::session::Hub

pub mod tcp;
pub mod ws;
