//! Infrastructure layer for the client.
//!
//! Contains the OS-facing adapters: UDP discovery and TCP links to the
//! gateway, an in-memory gateway for tests, and configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `comfoq_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
