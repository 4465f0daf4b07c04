// Common library for the actuator: payload protocol, parameter binding and the step engine

pub mod binder;
pub mod config;
pub mod context;
pub mod crypto;
pub mod env;
pub mod errors;
pub mod general;
pub mod payload;
pub mod retry;
pub mod schema;
pub mod steps;
pub mod telemetry;
