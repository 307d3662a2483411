#[path = "../fixtures/mod.rs"]
mod fixtures;

mod t10_validation_errors;
