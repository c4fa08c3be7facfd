//! Test suites for the warden controller.

pub(crate) mod support;
