//! Wire types shared across the checkin crates.
//!
//! * [`cdp`] - Chrome DevTools Protocol envelopes (requests, responses, events)
//! * [`api`] - JSON payloads of the relying-party and draw-site HTTP APIs

pub mod api;
pub mod cdp;
