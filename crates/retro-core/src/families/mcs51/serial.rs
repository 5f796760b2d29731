//! On-chip UART: SCON/SBUF registers backed by host channels.
//!
//! A byte written to SBUF leaves on the output channel one frame time later
//! and raises TI. Input bytes are latched into the receive buffer and raise
//! RI while reception is enabled and RI is clear. Polling SCON for input
//! with nothing queued, or idling in PCON.IDL, waits on the [`IdleClock`]
//! instead of spinning.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use tracing::{debug, trace, warn};

use super::{ie, pcon, scon, sfr, SFR};
use crate::{CycleListener, Fault, IdleClock, IdleWait, Machine, MemoryMap};

/// What times a frame in modes 1 and 3.
#[derive(Debug, Clone)]
pub enum BaudClock {
    /// Timer1 overflows, 32 per bit (16 with PCON.SMOD), as on the silicon.
    Timer1(Rc<Cell<u64>>),
    /// A fixed number of machine cycles per bit.
    Fixed(u32),
}

/// Host side of an attached UART.
#[derive(Debug)]
pub struct SerialPort {
    /// Bytes for the emulated program to receive.
    pub input: Sender<u8>,
    /// Bytes the emulated program transmitted.
    pub output: Receiver<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Cycles,
    Overflows,
}

#[derive(Debug, Clone, Copy)]
struct Transmit {
    byte: u8,
    remaining: u64,
    unit: Unit,
}

#[derive(Debug)]
struct Uart {
    input: Receiver<u8>,
    output: Sender<u8>,
    idle: IdleClock,
    baud: BaudClock,
    overflow_mark: u64,
    /// Arrived but RI not raised yet.
    arrived: Option<u8>,
    receive_buffer: u8,
    transmit: Option<Transmit>,
}

impl Uart {
    fn overflows(&self) -> u64 {
        match &self.baud {
            BaudClock::Timer1(count) => count.get(),
            BaudClock::Fixed(_) => 0,
        }
    }

    fn frame(&self, control: u8, smod: bool) -> (u64, Unit) {
        let bits = match control >> 6 {
            0 => return (8, Unit::Cycles),
            2 => return (if smod { 11 * 32 / 12 } else { 11 * 64 / 12 }, Unit::Cycles),
            1 => 10,
            _ => 11,
        };
        match &self.baud {
            BaudClock::Timer1(_) => (bits * if smod { 16 } else { 32 }, Unit::Overflows),
            BaudClock::Fixed(cycles) => (bits * u64::from(*cycles), Unit::Cycles),
        }
    }

    /// Pulls one pending input byte, waiting on the idle clock if allowed.
    fn poll_input(&mut self, wait: bool) {
        if self.arrived.is_some() {
            return;
        }
        match self.input.try_recv() {
            Ok(byte) => self.arrived = Some(byte),
            Err(TryRecvError::Empty) if wait && self.transmit.is_none() => {
                if let IdleWait::Ready(byte) = self.idle.wait_for(&self.input) {
                    self.arrived = Some(byte);
                }
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
        }
    }
}

/// MCS-51 UART peripheral.
#[derive(Debug)]
pub struct Serial {
    state: Rc<RefCell<Uart>>,
}

impl Serial {
    /// Creates a UART reading `input` and writing `output`.
    #[must_use]
    pub fn new(input: Receiver<u8>, output: Sender<u8>, idle: IdleClock, baud: BaudClock) -> Self {
        let overflow_mark = match &baud {
            BaudClock::Timer1(count) => count.get(),
            BaudClock::Fixed(_) => 0,
        };
        Self {
            state: Rc::new(RefCell::new(Uart {
                input,
                output,
                idle,
                baud,
                overflow_mark,
                arrived: None,
                receive_buffer: 0,
                transmit: None,
            })),
        }
    }

    /// Creates a UART together with its host-side channel ends.
    #[must_use]
    pub fn with_channels(idle: IdleClock, baud: BaudClock) -> (Self, SerialPort) {
        let (input, rx) = mpsc::channel();
        let (tx, output) = mpsc::channel();
        (Self::new(rx, tx, idle, baud), SerialPort { input, output })
    }

    /// Installs the SCON/SBUF observers, the two serial interrupt lines
    /// (transmit on the TI edge, receive on RI) and the frame listener.
    ///
    /// # Errors
    ///
    /// Propagates faults from observer and condition registration.
    pub fn attach(self, machine: &mut Machine) -> Result<(), Fault> {
        let space = machine.memory.space_mut(SFR)?;

        let state = Rc::clone(&self.state);
        space.add_read_observer(sfr::SBUF, move |_, _, _| state.borrow().receive_buffer)?;

        let state = Rc::clone(&self.state);
        space.add_write_observer(sfr::SBUF, move |space, _, byte, _| {
            let control = space.peek(sfr::SCON)?;
            let smod = space.peek(sfr::PCON)? & pcon::SMOD != 0;
            let mut uart = state.borrow_mut();
            let (remaining, unit) = uart.frame(control, smod);
            uart.overflow_mark = uart.overflows();
            uart.transmit = Some(Transmit {
                byte,
                remaining,
                unit,
            });
            trace!(byte, remaining, "serial transmit started");
            Ok(())
        })?;

        let state = Rc::clone(&self.state);
        space.add_read_observer(sfr::SCON, move |_, _, control| {
            if control & scon::REN != 0 && control & scon::RI == 0 {
                if let Ok(mut uart) = state.try_borrow_mut() {
                    uart.poll_input(true);
                }
            }
            control
        })?;

        let transmit = machine.interrupts.add_line("SERIAL TX", 0x23);
        machine.add_interrupt_condition(transmit, SFR, sfr::IE, ie::ES)?;
        machine.add_interrupt_rising_edge_condition(transmit, SFR, sfr::SCON, scon::TI)?;
        let receive = machine.interrupts.add_line("SERIAL RX", 0x23);
        machine.add_interrupt_condition(receive, SFR, sfr::IE, ie::ES)?;
        machine.add_interrupt_condition(receive, SFR, sfr::SCON, scon::RI)?;

        machine.add_cycle_listener(self);
        debug!("serial port attached");
        Ok(())
    }
}

impl CycleListener for Serial {
    fn on_cycles(&mut self, elapsed: u32, memory: &mut MemoryMap) -> Result<(), Fault> {
        let control = memory.peek(SFR, sfr::SCON)?;
        let idling = memory.peek(SFR, sfr::PCON)? & pcon::IDL != 0;
        let mut raise = 0u8;
        {
            let mut guard = self.state.borrow_mut();
            let uart = &mut *guard;
            let overflows = uart.overflows();
            let new_overflows = overflows - uart.overflow_mark;
            uart.overflow_mark = overflows;

            if let Some(transmit) = uart.transmit.as_mut() {
                let ticks = match transmit.unit {
                    Unit::Cycles => u64::from(elapsed),
                    Unit::Overflows => new_overflows,
                };
                if transmit.remaining <= ticks {
                    if uart.output.send(transmit.byte).is_err() {
                        warn!(byte = transmit.byte, "serial host side closed, byte dropped");
                    } else {
                        trace!(byte = transmit.byte, "serial transmit done");
                    }
                    uart.transmit = None;
                    raise |= scon::TI;
                } else {
                    transmit.remaining -= ticks;
                }
            }

            if control & scon::REN != 0 && control & scon::RI == 0 {
                uart.poll_input(idling);
                if let Some(byte) = uart.arrived.take() {
                    uart.receive_buffer = byte;
                    trace!(byte, "serial byte received");
                    raise |= scon::RI;
                }
            }
        }
        if raise != 0 {
            let control = memory.peek(SFR, sfr::SCON)?;
            memory.write(SFR, sfr::SCON, control | raise)?;
        }
        Ok(())
    }
}
