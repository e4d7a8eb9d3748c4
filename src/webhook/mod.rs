// =============================================================================
// Webhook ingestion — auth, normalization, validation
// =============================================================================

pub mod auth;
pub mod normalizer;
pub mod validator;

pub use auth::verify_signature;
pub use normalizer::{normalize, NormalizeOutcome};
pub use validator::validate;
