// Module naming follows project convention (Core = mapping primitives, Pipe = SPSC byte pipes)
#[allow(non_snake_case)]
pub mod Core {
    pub mod SharedMemory;
    pub mod futex;
    pub mod region;
    pub use region::Region;
    pub use SharedMemory::{
        attach_shared_memory, create_shared_memory, unlink_shared_memory, HeapMemory, RawHandle,
        SharedMemoryBackend,
    };
}

#[allow(non_snake_case)]
pub mod Pipe {
    pub mod Pipe;
    pub mod Pipe_impl;
    pub mod layout;
    pub use Pipe::{PipeRx, PipeTx}; // re-export for stable path
    pub use Pipe_impl::{RingRx, RingTx};
}

#[allow(non_snake_case)]
pub mod Structs {
    pub mod Buffer_Structs;
    pub use Buffer_Structs::{NotificationState, RxBuffer}; // re-export for stable path
}

#[allow(non_snake_case)]
pub mod Queue;

#[allow(non_snake_case)]
mod Debug {
    pub mod StructDebug;
}

pub use Queue::{QueueBuilder, Rx, RxPeer, RxStats};
pub use Structs::RxBuffer;
