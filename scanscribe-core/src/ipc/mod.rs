//! Newline-delimited JSON protocol spoken with the parent controller.
//!
//! Requests arrive on stdin ([`job`]), responses and liveness signals leave
//! on stdout ([`events`]). Logging never touches stdout.

pub mod events;
pub mod job;
