pub mod builder;
pub mod hash;
pub mod manifest;
pub mod provenance;
pub mod store;
