//! Cycle broadcast to peripherals and bounded idle waits.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{Fault, MemoryMap};

/// Peripheral hook invoked after every instruction with its elapsed cycles.
pub trait CycleListener {
    /// Accounts for `elapsed` cycles. May read and write machine memory.
    ///
    /// # Errors
    ///
    /// Faults abort the current step and propagate to its caller.
    fn on_cycles(&mut self, elapsed: u32, memory: &mut MemoryMap) -> Result<(), Fault>;
}

impl<F> CycleListener for F
where
    F: FnMut(u32, &mut MemoryMap) -> Result<(), Fault>,
{
    fn on_cycles(&mut self, elapsed: u32, memory: &mut MemoryMap) -> Result<(), Fault> {
        self(elapsed, memory)
    }
}

/// Handle returned by [`CycleClock::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Total cycle counter plus listeners notified in registration order.
#[derive(Default)]
pub struct CycleClock {
    total: u64,
    next_id: u64,
    listeners: Vec<(ListenerId, Box<dyn CycleListener>)>,
}

impl fmt::Debug for CycleClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleClock")
            .field("total", &self.total)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl CycleClock {
    /// Creates a clock at zero without listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cycles elapsed since creation or the last [`Self::reset`].
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Appends a listener; it sees only cycles elapsed after registration.
    pub fn add_listener(&mut self, listener: impl CycleListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` for an unknown id.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Adds `elapsed` to the total and notifies every listener in order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first listener fault; later listeners are not
    /// notified for this advance.
    pub fn advance(&mut self, elapsed: u32, memory: &mut MemoryMap) -> Result<(), Fault> {
        self.total += u64::from(elapsed);
        for (_, listener) in &mut self.listeners {
            listener.on_cycles(elapsed, memory)?;
        }
        Ok(())
    }

    /// Zeroes the total; listeners stay registered.
    pub fn reset(&mut self) {
        self.total = 0;
    }

    /// Restores a saved total.
    pub fn set_total(&mut self, total: u64) {
        self.total = total;
    }
}

/// Result of an [`IdleClock`] wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleWait<T> {
    /// Data arrived before the timeout.
    Ready(T),
    /// The timeout elapsed without data.
    TimedOut,
    /// Reset or shutdown interrupted the wait.
    Cancelled,
    /// The sending side is gone.
    Disconnected,
}

/// Bounded, cancellable wait owned by the scheduler and handed to
/// peripherals that may block on host input or output.
///
/// Clones share the cancellation flag, so the owner can interrupt a wait
/// happening on the emulation thread from any other thread.
#[derive(Debug, Clone)]
pub struct IdleClock {
    timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl Default for IdleClock {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

impl IdleClock {
    const SLICE: Duration = Duration::from_millis(5);

    /// Creates an idle clock whose waits last at most `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Longest single wait.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Interrupts the current wait and makes further waits return at once
    /// until [`Self::resume`] is called.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Re-arms waits after a cancellation.
    pub fn resume(&self) {
        self.cancel.store(false, Ordering::SeqCst);
    }

    /// Returns `true` while cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Waits for one value from `source`, bounded by the timeout and
    /// interruptible through [`Self::cancel`].
    pub fn wait_for<T>(&self, source: &Receiver<T>) -> IdleWait<T> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.is_cancelled() {
                return IdleWait::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                return IdleWait::TimedOut;
            }
            match source.recv_timeout(Self::SLICE.min(deadline - now)) {
                Ok(value) => return IdleWait::Ready(value),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return IdleWait::Disconnected,
            }
        }
    }

    /// Sleeps for the timeout unless cancelled first. Returns `false` when
    /// the sleep was cut short.
    pub fn idle(&self) -> bool {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(Self::SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::mpsc;
    use std::time::Duration;

    use super::{CycleClock, IdleClock, IdleWait};
    use crate::{AddressSpace, Fault, MemoryMap};

    #[test]
    fn listeners_run_in_registration_order() {
        let mut memory = MemoryMap::new();
        let ram = memory.add(AddressSpace::flat("RAM", 1)).expect("first");
        let mut clock = CycleClock::new();
        clock.add_listener(move |_: u32, memory: &mut MemoryMap| -> Result<(), Fault> {
            let value = memory.peek(ram, 0)?;
            memory.write(ram, 0, value * 10 + 1)
        });
        clock.add_listener(move |_: u32, memory: &mut MemoryMap| -> Result<(), Fault> {
            let value = memory.peek(ram, 0)?;
            memory.write(ram, 0, value * 10 + 2)
        });
        clock.advance(1, &mut memory).expect("no fault");
        assert_eq!(memory.peek(ram, 0), Ok(12));
    }

    #[test]
    fn listener_sees_only_cycles_after_registration() {
        let mut memory = MemoryMap::new();
        let mut clock = CycleClock::new();
        clock.advance(100, &mut memory).expect("no listeners");
        let seen = Rc::new(Cell::new(0u64));
        let sink = Rc::clone(&seen);
        let id = clock.add_listener(move |n: u32, _: &mut MemoryMap| -> Result<(), Fault> {
            sink.set(sink.get() + u64::from(n));
            Ok(())
        });
        clock.advance(3, &mut memory).expect("no fault");
        clock.advance(4, &mut memory).expect("no fault");
        assert_eq!(seen.get(), 7);
        assert_eq!(clock.total(), 107);
        assert!(clock.remove_listener(id));
        clock.advance(4, &mut memory).expect("no fault");
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn listener_fault_stops_advance() {
        let mut memory = MemoryMap::new();
        let mut clock = CycleClock::new();
        clock.add_listener(|_: u32, _: &mut MemoryMap| -> Result<(), Fault> {
            Err(Fault::Unsupported("timer".into()))
        });
        assert!(clock.advance(1, &mut memory).is_err());
    }

    #[test]
    fn idle_wait_returns_ready_value() {
        let (tx, rx) = mpsc::channel();
        tx.send(7u8).expect("receiver alive");
        let idle = IdleClock::new(Duration::from_millis(50));
        assert_eq!(idle.wait_for(&rx), IdleWait::Ready(7));
        assert_eq!(idle.wait_for(&rx), IdleWait::TimedOut);
        drop(tx);
        assert_eq!(idle.wait_for(&rx), IdleWait::Disconnected);
    }

    #[test]
    fn cancelled_wait_returns_immediately() {
        let (_tx, rx) = mpsc::channel::<u8>();
        let idle = IdleClock::new(Duration::from_secs(30));
        let remote = idle.clone();
        remote.cancel();
        assert_eq!(idle.wait_for(&rx), IdleWait::Cancelled);
        assert!(!idle.idle());
        idle.resume();
        assert!(!remote.is_cancelled());
    }
}
