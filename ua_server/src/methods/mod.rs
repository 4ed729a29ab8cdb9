pub mod dispatcher;

pub use dispatcher::{method_fn, MethodContext, MethodDispatcher, MethodHandler};
