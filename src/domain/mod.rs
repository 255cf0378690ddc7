//! Domain layer: entities, filter enums, errors and the traits the
//! pagination loop is driven through.

pub mod entities;
pub mod errors;
pub mod filters;
pub mod repositories;
