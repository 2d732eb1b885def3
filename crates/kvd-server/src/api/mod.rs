// ABOUTME: HTTP API modules for the kvd server.
// ABOUTME: The key-value endpoints live in kv.

pub mod kv;
