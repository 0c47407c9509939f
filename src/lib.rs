//! Receiver-side link engine for OpenLRS on the RFM22B transceiver.
//!
//! This crate is the hop-synchronous FSK link core: bind/operational
//! state machine, hop-timing scheduler, packet framing, and the SPI/IRQ
//! protocol to the radio. Persistence, the PPM sink, the watchdog, the
//! clock, sleep, and the debug logger are all external collaborators —
//! see [`collaborators`] — so this crate has no board bring-up, task
//! spawning, or UI of its own.
//!
//! The radio's IRQ line is the one piece of state genuinely shared with
//! the platform: the application declares `static MODE: Mode =
//! Mode::new();` and passes `&MODE` into [`Receiver::init`]. The same
//! reference is wired to the interrupt handler (`MODE.on_irq()`), so it
//! stays live and correct even after [`Receiver::run_forever`] has taken
//! ownership of everything else and is driving the loop on its own task.

#![cfg_attr(not(test), no_std)]

pub mod bind;
pub mod codec;
pub mod collaborators;
mod configure;
pub mod data;
pub mod error;
pub mod irq;
pub mod link;
pub mod params;
pub mod regs;
pub mod spi_interface;
pub mod task;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

pub use collaborators::{BindStore, Clock, PpmSink, Sleep, Watchdog};
pub use data::{BindData, LinkState, BINDING_VERSION};
pub use error::LinkError;
pub use irq::Mode;
pub use link::{LinkPhase, Scheduler};

use regs::{Register, DEVICE_TYPE_EXPECTED, DEVICE_TYPE_MASK};
use spi_interface::Interface;

/// No-op sink for a receiver that hasn't had one registered yet.
struct NullSink;

impl PpmSink for NullSink {
    fn on_ppm(&mut self, _ppm: &[u16]) {}
}

/// The public handle: an initialized radio plus whatever bind data was
/// loaded (or the bind-mode placeholder if none was valid).
pub struct Receiver<SPI, CS, DELAY> {
    scheduler: Scheduler<SPI, CS, DELAY>,
    sink: Option<&'static mut dyn PpmSink>,
}

impl<SPI, CS, DELAY, E1, E2> Receiver<SPI, CS, DELAY>
where
    SPI: SpiBus<u8, Error = E1>,
    CS: OutputPin<Error = E2>,
    DELAY: DelayNs,
{
    /// Probes the device-type register, loads whatever `BindData` the
    /// store has (falling back to a zeroed placeholder that fails the
    /// version check and drives the engine into bind mode), and arms
    /// the radio. Does not start the driver loop — call
    /// [`Receiver::run_forever`] for that.
    ///
    /// `rf_mode` must be a `'static` reference the caller also keeps: the
    /// platform ISR glue calls `rf_mode.on_irq()` directly from the
    /// interrupt handler, independent of this `Receiver`, so the
    /// application declares it as `static MODE: Mode = Mode::new();` and
    /// passes `&MODE` in here. That way the ISR has a live handle to the
    /// exact same atomic the driver task (and, during bind, `bind::listen`)
    /// observes, even after [`Receiver::run_forever`] has consumed `self`.
    pub fn init(
        spi: SPI,
        cs: CS,
        delay: DELAY,
        store: &impl BindStore,
        rf_mode: &'static Mode,
    ) -> Result<Self, LinkError> {
        let mut interface = Interface::new(spi, cs, delay);
        let device_type = interface.read(Register::DeviceType)?;
        if device_type & DEVICE_TYPE_MASK != DEVICE_TYPE_EXPECTED {
            defmt::warn!("device type probe mismatch: {}", device_type);
            return Err(LinkError::DeviceAbsent);
        }

        let bind_data = store.get().unwrap_or(BindData {
            version: 0,
            serial_baudrate: 0,
            rf_frequency: 0,
            rf_magic: 0,
            rf_power: 0,
            rf_channel_spacing: 0,
            modem_params: 0,
            flags: 0,
            hopchannel: [0; data::MAXHOPS],
        });

        // An invalid/missing bind is finished configuring the radio by
        // `bind::listen` itself once `run_forever` starts; nothing further
        // to set up here in that case.
        if bind_data.version == BINDING_VERSION {
            interface.init_radio(false, &bind_data)?;
        }

        Ok(Self {
            scheduler: Scheduler::new(interface, bind_data, rf_mode),
            sink: None,
        })
    }

    /// Records the downstream recipient of decoded servo frames. `'static`
    /// because the receiver itself runs for the lifetime of the process
    /// (see the driver task's concurrency model) and the sink must
    /// outlive it.
    pub fn register_ppm_sink(&mut self, sink: &'static mut dyn PpmSink) {
        self.sink = Some(sink);
    }

    /// Entry point for the platform ISR glue: observes `rf_mode` and
    /// applies the one legal transition, per the IRQ dispatcher. Does no
    /// register access.
    ///
    /// Only usable before [`Receiver::run_forever`] is called, since that
    /// consumes `self`. An ISR that fires once the driver loop is running
    /// should instead call `on_irq` directly on the same `&'static Mode`
    /// passed into [`Receiver::init`] — it is the identical atomic this
    /// method forwards to.
    pub fn on_irq(&self) {
        self.scheduler.state.rf_mode.on_irq();
    }

    /// Runs the bind-or-resume decision and then the driver task loop
    /// for the lifetime of the process. `bind_timeout_ms == 0` waits for
    /// a bind request indefinitely.
    pub fn run_forever(
        self,
        clock: &impl Clock,
        sleep: &mut impl Sleep,
        watchdog: &mut impl Watchdog,
        store: &mut impl BindStore,
        bind_timeout_ms: u32,
    ) -> Result<core::convert::Infallible, LinkError> {
        let Receiver { scheduler, mut sink } = self;
        match sink.as_deref_mut() {
            Some(sink) => {
                task::run_forever(scheduler, clock, sleep, watchdog, store, sink, bind_timeout_ms)
            }
            None => task::run_forever(
                scheduler,
                clock,
                sleep,
                watchdog,
                store,
                &mut NullSink,
                bind_timeout_ms,
            ),
        }
    }
}
