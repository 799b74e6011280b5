//! Test suites for process supervision.
