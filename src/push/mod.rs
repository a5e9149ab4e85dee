pub mod listener;
pub mod message;
pub mod router;

pub use listener::{BroadcastListener, UpdateListener};
pub use message::{ClientMessage, PushMessage};
pub use router::UpdateRouter;
