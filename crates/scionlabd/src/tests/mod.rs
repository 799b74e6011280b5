//! Test suites for the stack supervisor.

#![cfg(unix)]

mod lifecycle_behaviour;
mod support;
