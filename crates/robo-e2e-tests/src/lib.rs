//! End-to-end tests for robocore.
//!
//! These tests run the full stack on a loopback port:
//! - coordinator startup and ordered shutdown
//! - WebSocket subscribe/publish fan-out between real clients
//! - protocol error handling over a live connection
//! - the HTTP API backed by the in-process collaborators

#![cfg(test)]
