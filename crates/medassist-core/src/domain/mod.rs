//! Domain types for the connection and generation core.
//!
//! These are plain data types with no infrastructure dependencies.

mod connection;
mod generation;
mod medical;
mod model;

pub use connection::{ConnectionState, Endpoint};
pub use generation::{GenerationRequest, GenerationResult, RawGeneration};
pub use medical::{MedicalGuidance, MedicalResponse, Severity};
pub use model::{PREFERRED_MODELS, select_model};
