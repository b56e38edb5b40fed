//! Namespace finalizer library
//!
//! Guards Kubernetes namespaces with a finalizer and runs registered cleanup
//! routines before letting their deletion complete.

pub mod config;
pub mod controller;
pub mod error;
pub mod reconcilers;
pub mod resource;
pub mod rest_api;
pub mod telemetry;

pub use error::{Error, Result};
