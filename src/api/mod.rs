// =============================================================================
// HTTP API
// =============================================================================
//
// `rest` mounts the webhook ingestion endpoint, the exit-worker trigger, and
// the admin/health surface. `auth` is the Bearer-token extractor guarding the
// admin endpoints.
// =============================================================================

pub mod auth;
pub mod rest;
