//! Driver task: the cooperative loop that owns the scheduler.
//!
//! Maps onto whatever the host's native concurrency primitive is (OS
//! thread, RTOS task, async task) — only the `sleep(ms)` and
//! watchdog-kick interfaces are required of it, so `run_forever` is a
//! plain function rather than something that spawns anything itself.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::bind;
use crate::collaborators::{BindStore, Clock, PpmSink, Sleep, Watchdog};
use crate::error::LinkError;
use crate::link::{LinkPhase, Scheduler};

/// Inter-iteration sleep, per the scheduling model's ≈1 kHz tick.
const TICK_SLEEP_MS: u32 = 1;

/// Decides bind-vs-operational startup, then runs the scheduler loop for
/// the lifetime of the process. Returns only on an unrecoverable init
/// failure (device absent, or no bind and the caller's `bind_timeout_ms`
/// expired).
#[allow(clippy::too_many_arguments)]
pub fn run_forever<SPI, CS, DELAY, E1, E2>(
    mut scheduler: Scheduler<SPI, CS, DELAY>,
    clock: &impl Clock,
    sleep: &mut impl Sleep,
    watchdog: &mut impl Watchdog,
    store: &mut impl BindStore,
    sink: &mut dyn PpmSink,
    bind_timeout_ms: u32,
) -> Result<core::convert::Infallible, LinkError>
where
    SPI: SpiBus<u8, Error = E1>,
    CS: OutputPin<Error = E2>,
    DELAY: DelayNs,
{
    if scheduler.bind_data.version != crate::data::BINDING_VERSION {
        scheduler.phase = LinkPhase::BindListening;
        defmt::info!("no valid bind stored, entering bind mode");
        let bind_data = bind::listen(
            &mut scheduler.interface,
            scheduler.state.rf_mode,
            clock,
            sleep,
            watchdog,
            store,
            bind_timeout_ms,
        )?;
        scheduler.bind_data = bind_data;
        scheduler.phase = LinkPhase::Acquiring;
        scheduler.interface.init_radio(false, &scheduler.bind_data)?;
    }
    scheduler.enter_rx()?;

    loop {
        watchdog.kick();
        if let Err(e) = scheduler.tick(clock, sink) {
            defmt::warn!("scheduler tick error (recovering next tick): {}", e);
        }
        sleep.sleep_ms(TICK_SLEEP_MS);
    }
}
