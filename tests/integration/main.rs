//! Integration tests for the auth client and request pipeline.
//! These drive real HTTP against a mock identity provider and backend.

pub mod test_harness;

mod init_flow_test;
mod refresh_flow_test;
