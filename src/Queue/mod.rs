mod builder;
pub mod codec;
pub mod layout;
pub mod notify;
mod peer;
mod rx;

pub use builder::{QueueBuilder, MIN_QUEUE_PIPE_SIZE};
pub use notify::{Doorbell, NotificationFlag};
pub use peer::RxPeer;
pub use rx::{inspect_packet, DropReason, Packet, Rx, RxStats};
