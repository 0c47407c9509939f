//! IRQ dispatcher: translates the radio's single interrupt line into
//! `rf_mode` transitions. No register access happens here — all SPI I/O
//! consequent to the IRQ is performed by the driver task on its next tick.

use core::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ModeValue {
    Available = 0,
    Receive = 1,
    Received = 2,
    Transmit = 3,
    Transmitted = 4,
}

impl ModeValue {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Receive,
            2 => Self::Received,
            3 => Self::Transmit,
            4 => Self::Transmitted,
            _ => Self::Available,
        }
    }
}

/// The one field shared between the ISR and the driver task. Backed by an
/// atomic so no critical section is needed on either side, per the
/// concurrency model: the IRQ handler writes it, the task reads it at the
/// top of each iteration, and it must never tear.
pub struct Mode(AtomicU8);

impl Mode {
    /// `const` so applications can park one in a `static`, shared between
    /// the driver task and the platform ISR glue without either of them
    /// owning it — see [`crate::Receiver::init`].
    pub const fn new() -> Self {
        Self(AtomicU8::new(ModeValue::Available as u8))
    }

    pub fn get(&self) -> ModeValue {
        ModeValue::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, v: ModeValue) {
        self.0.store(v as u8, Ordering::Release);
    }

    /// Entry point for the platform ISR glue. The only legal transitions
    /// are `Transmit -> Transmitted` and `Receive -> Received`; anything
    /// else leaves the mode unchanged.
    pub fn on_irq(&self) {
        let _ = self.0.compare_exchange(
            ModeValue::Transmit as u8,
            ModeValue::Transmitted as u8,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
        let _ = self.0.compare_exchange(
            ModeValue::Receive as u8,
            ModeValue::Received as u8,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_to_received() {
        let m = Mode::new();
        m.set(ModeValue::Receive);
        m.on_irq();
        assert_eq!(m.get(), ModeValue::Received);
    }

    #[test]
    fn transmit_to_transmitted() {
        let m = Mode::new();
        m.set(ModeValue::Transmit);
        m.on_irq();
        assert_eq!(m.get(), ModeValue::Transmitted);
    }

    #[test]
    fn other_modes_unaffected() {
        let m = Mode::new();
        m.set(ModeValue::Received);
        m.on_irq();
        assert_eq!(m.get(), ModeValue::Received);

        m.set(ModeValue::Available);
        m.on_irq();
        assert_eq!(m.get(), ModeValue::Available);
    }
}
