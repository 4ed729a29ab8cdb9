pub mod engine;
pub mod monitored_item;
pub mod subscription;

pub use engine::{CreateSubscriptionRequest, EngineConfig, SubscriptionCreated, SubscriptionEngine};
pub use monitored_item::{
    DataChangeNotification, EventFieldList, MonitoredItemCreated, MonitoredItemRequest,
    NotificationData,
};
pub use subscription::{
    NotificationMessage, NotificationOrdering, PublishResponse, SessionId, SubscriptionParameters,
    SubscriptionState,
};
