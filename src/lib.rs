//! # accountd
//!
//! Core of a user-account service: registration, lookup, update, deletion and
//! password login that issues an HS256 bearer token. The crate is a library;
//! a transport parses requests, calls [`service::AccountService`] and returns
//! the [`envelope::ApiResponse`] it builds from the result.
//!
//! ## Layout
//!
//! - [`credentials`]: Argon2id hashing behind the `CredentialHasher` trait.
//! - [`token`]: HS256 issuance and validation, bearer header parsing.
//! - [`store`]: the `AccountStore` adapter over a document collection, with
//!   PostgreSQL and in-memory backends.
//! - [`service`]: orchestration of the account operations.
//! - [`envelope`]: success/error response shapes and status mapping.
//! - [`health`]: name/version/status payload for a health endpoint.
//! - [`monitor`]: periodic account count log.
//! - [`cli`]: clap command, typed settings and tracing bootstrap.
//!
//! ## Email uniqueness
//!
//! The adapter checks for an existing email before each write, but the check
//! is not atomic with the write. The `UNIQUE (email)` constraint in
//! `sql/schema.sql` is authoritative; its violation surfaces as
//! `AccountError::EmailConflict` like the pre-check does.

pub mod cli;
pub mod context;
pub mod credentials;
pub mod envelope;
pub mod error;
pub mod health;
pub mod model;
pub mod monitor;
pub mod service;
pub mod store;
pub mod token;

pub use error::AccountError;
