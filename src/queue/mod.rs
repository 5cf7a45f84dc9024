pub mod backoff;
pub mod message;
pub mod repository;
pub mod subscriber;

pub use backoff::retry_delay;
pub use message::{SUBJECT_LINKS_SAVED, link_saved_payload, parse_link_saved};
pub use repository::MessageRepository;
pub use subscriber::{HandlerError, MessageHandler, Subscriber, SubscriberConfig};
