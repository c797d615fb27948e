//! Action registry and executor
//!
//! Actions are named asynchronous handlers with a parameter schema. The
//! registry guarantees one handler invocation per `execute` call and always
//! returns an [`ActionResult`], whatever the handler does.

pub mod builtin;
pub mod registry;
pub mod schema;
pub mod types;

pub use builtin::register_builtins;
pub use registry::{ActionDescriptor, ActionRegistry};
pub use schema::{ParamKind, ParamSchema, ParamSpec};
pub use types::{ActionContext, ActionError, ActionHandler, ActionResult, FnHandler, Params};
