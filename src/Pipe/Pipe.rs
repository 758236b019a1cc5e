// The capability the receive queue needs from a shared-memory pipe.
//
// A pipe carries discrete messages from exactly one producer to exactly one
// consumer. Writers stage messages and make them visible in one step; readers
// look at messages in place and release the ring space afterwards.

/// Producer side of a pipe.
pub trait PipeTx {
    /// Reserve a contiguous window of exactly `len` bytes for a new message.
    ///
    /// The message is invisible to the consumer until `publish`. Returns
    /// `None` when the pipe lacks space; earlier reservations stay pending.
    fn reserve(&mut self, len: usize) -> Option<&mut [u8]>;

    /// Make every reservation since the last publish/abort visible at once,
    /// in reservation order.
    fn publish(&mut self);

    /// Discard every reservation since the last publish, as if it never happened.
    fn abort(&mut self);

    /// Largest message `reserve` can ever satisfy. Larger requests always
    /// fail, so callers should treat them as invalid rather than retry.
    fn max_message_len(&self) -> usize {
        usize::MAX
    }
}

/// Consumer side of a pipe.
pub trait PipeRx {
    /// Next message published by the producer that has not been pulled yet,
    /// or `None` if there is none. The bytes stay owned by the ring until
    /// `acknowledge`.
    fn pull(&mut self) -> Option<&[u8]>;

    /// Release every pulled message so the producer can reuse its space.
    fn acknowledge(&mut self);
}
