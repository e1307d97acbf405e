use std::time::{Duration, Instant};

use tracing::{info, trace};

use crate::{BlockDevice, FlashError};

/// A single status LED, or anything standing in for one.
pub trait StatusIndicator {
    fn is_on(&self) -> bool;
    fn set(&mut self, on: bool);

    fn toggle(&mut self) {
        let on = self.is_on();
        self.set(!on);
    }
}

/// Millisecond clock plus a hook for handing control to other cooperative tasks.
pub trait Clock {
    fn millis(&mut self) -> u64;
    fn yield_now(&mut self) {}
}

/// Wall clock. Yielding sleeps for a millisecond so busy-waits stay cheap.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&mut self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn yield_now(&mut self) {
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// An indicator with no hardware behind it; state changes go to the trace log.
#[derive(Debug, Default)]
pub struct LogIndicator {
    on: bool,
    toggles: u32,
}

impl LogIndicator {
    pub fn new(on: bool) -> Self {
        Self { on, toggles: 0 }
    }

    pub fn toggles(&self) -> u32 {
        self.toggles
    }
}

impl StatusIndicator for LogIndicator {
    fn is_on(&self) -> bool {
        self.on
    }

    fn set(&mut self, on: bool) {
        if on != self.on {
            self.toggles += 1;
            trace!(on, "status indicator");
        }
        self.on = on;
    }
}

/// Blink periods used while erasing and after the erase completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseTiming {
    pub busy_toggle_ms: u64,
    pub done_toggle_ms: u64,
    pub done_blink_ms: u64,
}

impl Default for EraseTiming {
    fn default() -> Self {
        Self {
            busy_toggle_ms: 500,
            done_toggle_ms: 100,
            done_blink_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseStats {
    pub polls: u64,
    pub elapsed_ms: u64,
}

/// Erases the whole chip and waits for it to finish.
///
/// While the chip is busy the indicator toggles every `busy_toggle_ms` and the
/// clock's yield hook runs on each poll. Once the chip reports ready the
/// indicator blinks fast for `done_blink_ms`, then returns to the state it had
/// on entry. There is no timeout: a chip that never becomes ready blocks
/// forever.
pub fn erase_and_wait<D, I, C>(
    device: &mut D,
    indicator: &mut I,
    clock: &mut C,
    timing: EraseTiming,
) -> Result<EraseStats, FlashError>
where
    D: BlockDevice + ?Sized,
    I: StatusIndicator + ?Sized,
    C: Clock + ?Sized,
{
    let entry_state = indicator.is_on();
    info!(capacity = device.capacity(), "erasing flash");
    device.erase_all()?;

    let start = clock.millis();
    let mut next_toggle = start + timing.busy_toggle_ms;
    let mut polls = 0u64;
    while !device.ready() {
        polls += 1;
        clock.yield_now();
        let now = clock.millis();
        if now >= next_toggle {
            indicator.toggle();
            next_toggle = now + timing.busy_toggle_ms;
        }
    }
    let elapsed_ms = clock.millis() - start;
    info!(elapsed_ms, polls, "flash erase complete");

    let blink_start = clock.millis();
    let mut next_toggle = blink_start + timing.done_toggle_ms;
    loop {
        clock.yield_now();
        let now = clock.millis();
        if now >= blink_start + timing.done_blink_ms {
            break;
        }
        if now >= next_toggle {
            indicator.toggle();
            next_toggle = now + timing.done_toggle_ms;
        }
    }

    indicator.set(entry_state);
    Ok(EraseStats { polls, elapsed_ms })
}
