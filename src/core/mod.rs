pub mod commands;
pub mod context;
pub mod domain;
pub mod policy;
pub mod service;
pub mod supervisor;
pub mod traits;
