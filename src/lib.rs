//! Perihelion — in-process PERM authorization engine.
//!
//! A request tuple (subject, object, action, optionally a domain) is
//! checked against stored policy rules by a matcher expression compiled
//! from an INI model file; per-rule outcomes are collapsed by a
//! policy-effect reducer, and role inheritance is resolved through an
//! in-memory RBAC graph whose read path takes no locks.

pub mod adapter;
pub mod config;
pub mod effect;
pub mod engine;
pub mod errors;
pub mod matcher;
pub mod model;
pub mod operators;
pub mod policy;
pub mod rbac;
pub mod registry;
pub mod watcher;

pub use adapter::{Adapter, FileAdapter, MemoryAdapter, PolicyRow};
pub use config::EngineConfig;
pub use effect::{Effect, Effector};
pub use engine::{Engine, EngineSnapshot};
pub use errors::EngineError;
pub use matcher::{compile, CompiledMatcher};
pub use model::Model;
pub use policy::PolicyStore;
pub use rbac::{MatchingFn, RoleManager};
pub use watcher::{PolicyEvent, UpdateCallback, Watcher};
