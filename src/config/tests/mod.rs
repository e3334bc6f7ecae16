//! Unit tests for podhost configuration types.
//!
//! This module contains tests organised into:
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults and TOML deserialisation
//! - [`validation`] - Cross-field validation of `AppConfig`
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests

mod helpers;
