pub mod context;
pub mod services;

pub use context::ServerContext;
pub use services::{
    BrowseDescription, BrowseResult, CallMethodRequest, CallMethodResult, Dispatcher,
    MonitoredItemResult, ServiceRequest, ServiceResponse, WriteValue,
};
