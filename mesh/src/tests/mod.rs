//! Internal tests module
//!
//! Multi-node scenarios that drive whole groups over the emulated network and
//! have full access to private crate internals.
