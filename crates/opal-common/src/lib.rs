//! # opal-common
//!
//! Common constants and error types for the OpalDB catalog core.
//!
//! This crate provides the foundational pieces shared across OpalDB
//! components:
//!
//! - **Constants**: identifier limits, on-disk file extensions, page geometry
//! - **Errors**: the unified [`OpalError`] type and [`OpalResult`] alias
//!
//! ## Example
//!
//! ```rust
//! use opal_common::error::{Entity, OpalError, OpalResult};
//!
//! fn lookup(name: &str) -> OpalResult<()> {
//!     Err(OpalError::not_found(Entity::Table, name))
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod error;

pub use constants::*;
pub use error::{Entity, OpalError, OpalResult};
