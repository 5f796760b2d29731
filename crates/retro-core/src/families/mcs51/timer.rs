//! Timer0/Timer1 (modes 0 to 3) and the 8052 Timer2 as cycle listeners.
//!
//! Counters live in their SFR cells and are advanced once per machine cycle.
//! Overflow sets the TCON/T2CON flag through an observed write, so interrupt
//! conditions watching it re-evaluate.

#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::cell::Cell;
use std::rc::Rc;

use super::{sfr, SFR};
use crate::{CycleListener, Fault, MemoryMap};

const TMOD_GATE: u8 = 0x08;
const TMOD_COUNTER: u8 = 0x04;

const TCON_TR0: u8 = 0x10;
const TCON_TF0: u8 = 0x20;
const TCON_TR1: u8 = 0x40;
const TCON_TF1: u8 = 0x80;

const P3_INT0: u8 = 0x04;
const P3_INT1: u8 = 0x08;

const T2CON_TR2: u8 = 0x04;
const T2CON_TF2: u8 = 0x80;

/// One counter's SFR cells and control bits.
#[derive(Debug, Clone, Copy)]
struct Channel {
    low: u32,
    high: u32,
    run: u8,
    flag: u8,
    int_pin: u8,
    /// Shift of this channel's nibble within TMOD.
    tmod_shift: u8,
}

const TIMER0: Channel = Channel {
    low: sfr::TL0,
    high: sfr::TH0,
    run: TCON_TR0,
    flag: TCON_TF0,
    int_pin: P3_INT0,
    tmod_shift: 0,
};

const TIMER1: Channel = Channel {
    low: sfr::TL1,
    high: sfr::TH1,
    run: TCON_TR1,
    flag: TCON_TF1,
    int_pin: P3_INT1,
    tmod_shift: 4,
};

/// Advances an 8-bit counter by `ticks`, reloading from `reload` on each
/// wrap. Returns the new value and the number of overflows.
fn count8(value: u8, ticks: u32, reload: u8) -> (u8, u32) {
    let total = u32::from(value) + ticks;
    if total <= 0xFF {
        return (total as u8, 0);
    }
    let period = 0x100 - u32::from(reload);
    let excess = total - 0x100;
    (
        (u32::from(reload) + excess % period) as u8,
        1 + excess / period,
    )
}

/// Timer0 and Timer1 of every MCS-51 part.
///
/// Counter mode (C/T set) counts external pin transitions, which are not
/// modeled, so such a channel stands still. Timer1 overflows are published
/// through [`Self::timer1_overflows`] for the serial port baud clock.
#[derive(Debug, Default)]
pub struct Timers {
    timer1_overflows: Rc<Cell<u64>>,
}

impl Timers {
    /// Creates the listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared running count of Timer1 overflows.
    #[must_use]
    pub fn timer1_overflows(&self) -> Rc<Cell<u64>> {
        Rc::clone(&self.timer1_overflows)
    }

    fn gate_open(channel: Channel, tmod: u8, tcon: u8, p3: u8) -> bool {
        let mode_bits = tmod >> channel.tmod_shift;
        tcon & channel.run != 0
            && mode_bits & TMOD_COUNTER == 0
            && (mode_bits & TMOD_GATE == 0 || p3 & channel.int_pin != 0)
    }

    /// Runs one channel in modes 0 to 2 and returns its overflow count.
    fn run_channel(
        memory: &mut MemoryMap,
        channel: Channel,
        mode: u8,
        ticks: u32,
    ) -> Result<u32, Fault> {
        let low = memory.peek(SFR, channel.low)?;
        let high = memory.peek(SFR, channel.high)?;
        let (new_low, new_high, overflows) = match mode {
            0 => {
                // 13 bits: TH plus the low five bits of TL
                let value = (u32::from(high) << 5) | u32::from(low & 0x1F);
                let total = value + ticks;
                (
                    (low & 0xE0) | (total & 0x1F) as u8,
                    (total >> 5) as u8,
                    total >> 13,
                )
            }
            1 => {
                let total = ((u32::from(high) << 8) | u32::from(low)) + ticks;
                (total as u8, (total >> 8) as u8, total >> 16)
            }
            _ => {
                let (value, overflows) = count8(low, ticks, high);
                (value, high, overflows)
            }
        };
        if new_low != low {
            memory.write(SFR, channel.low, new_low)?;
        }
        if new_high != high {
            memory.write(SFR, channel.high, new_high)?;
        }
        Ok(overflows)
    }

    fn set_tcon_flags(memory: &mut MemoryMap, flags: u8) -> Result<(), Fault> {
        if flags != 0 {
            let tcon = memory.peek(SFR, sfr::TCON)?;
            memory.write(SFR, sfr::TCON, tcon | flags)?;
        }
        Ok(())
    }
}

impl CycleListener for Timers {
    fn on_cycles(&mut self, elapsed: u32, memory: &mut MemoryMap) -> Result<(), Fault> {
        let tmod = memory.peek(SFR, sfr::TMOD)?;
        let tcon = memory.peek(SFR, sfr::TCON)?;
        let p3 = memory.peek(SFR, sfr::P3)?;
        let mode0 = tmod & 0x03;
        let mode1 = (tmod >> 4) & 0x03;
        let mut flags = 0u8;

        if mode0 == 3 {
            // TL0 runs under TR0 and sets TF0; TH0 runs under TR1 and sets TF1
            if Self::gate_open(TIMER0, tmod, tcon, p3) {
                let low = memory.peek(SFR, sfr::TL0)?;
                let (value, overflows) = count8(low, elapsed, 0);
                memory.write(SFR, sfr::TL0, value)?;
                if overflows > 0 {
                    flags |= TCON_TF0;
                }
            }
            if tcon & TCON_TR1 != 0 {
                let high = memory.peek(SFR, sfr::TH0)?;
                let (value, overflows) = count8(high, elapsed, 0);
                memory.write(SFR, sfr::TH0, value)?;
                if overflows > 0 {
                    flags |= TCON_TF1;
                }
            }
        } else if Self::gate_open(TIMER0, tmod, tcon, p3)
            && Self::run_channel(memory, TIMER0, mode0, elapsed)? > 0
        {
            flags |= TIMER0.flag;
        }

        // Timer1 keeps counting while Timer0 borrows TR1/TF1, but its
        // overflows then only clock the serial port
        let timer1_runs = mode1 != 3
            && if mode0 == 3 {
                tmod & (TMOD_COUNTER << 4) == 0
            } else {
                Self::gate_open(TIMER1, tmod, tcon, p3)
            };
        if timer1_runs {
            let overflows = Self::run_channel(memory, TIMER1, mode1, elapsed)?;
            if overflows > 0 {
                self.timer1_overflows
                    .set(self.timer1_overflows.get() + u64::from(overflows));
                if mode0 != 3 {
                    flags |= TIMER1.flag;
                }
            }
        }

        Self::set_tcon_flags(memory, flags)
    }
}

/// 8052 Timer2 in 16-bit auto-reload mode: on overflow TL2/TH2 reload from
/// RCAP2L/RCAP2H and TF2 is set.
#[derive(Debug, Default)]
pub struct Timer2;

impl CycleListener for Timer2 {
    fn on_cycles(&mut self, elapsed: u32, memory: &mut MemoryMap) -> Result<(), Fault> {
        let t2con = memory.peek(SFR, sfr::T2CON)?;
        if t2con & T2CON_TR2 == 0 {
            return Ok(());
        }
        let value = u32::from(memory.peek_u16_le(SFR, sfr::TL2)?);
        let reload = u32::from(memory.peek_u16_le(SFR, sfr::RCAP2L)?);
        let total = value + elapsed;
        let (next, overflowed) = if total <= 0xFFFF {
            (total, false)
        } else {
            let period = 0x1_0000 - reload;
            (reload + (total - 0x1_0000) % period, true)
        };
        memory.write(SFR, sfr::TL2, next as u8)?;
        memory.write(SFR, sfr::TH2, (next >> 8) as u8)?;
        if overflowed {
            memory.write(SFR, sfr::T2CON, t2con | T2CON_TF2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::count8;

    #[test]
    fn eight_bit_reload_arithmetic() {
        assert_eq!(count8(0xFE, 1, 0x80), (0xFF, 0));
        assert_eq!(count8(0xFF, 1, 0x80), (0x80, 1));
        // period 0x80: 0xFF + 0x101 = one wrap to 0x80, then 0x100 more
        assert_eq!(count8(0xFF, 0x101, 0x80), (0x80, 3));
        assert_eq!(count8(0xF0, 0x20, 0x00), (0x10, 1));
    }
}
