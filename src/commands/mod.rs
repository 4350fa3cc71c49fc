pub mod api_resources;
pub mod reconcile;
pub mod validate;
