//! The hop scheduler and link state machine: drives channel hopping,
//! waits for packets within a computed interval, detects loss, and tracks
//! RSSI/AFC/link-quality. Called once per driver-task iteration.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::codec::{self, SUBTYPE_SERVO};
use crate::collaborators::{Clock, PpmSink};
use crate::data::BindData;
use crate::error::LinkError;
use crate::irq::{Mode, ModeValue};
use crate::params::MODEM_TABLE;
use crate::regs::Register;
use crate::spi_interface::Interface;
use crate::LinkState;

#[derive(Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum LinkPhase {
    BindListening,
    Acquiring,
    Synchronized,
    Lost,
}

/// Microseconds of slack added to the nominal interval before declaring a
/// miss — see spec step 4.
const MISS_SLACK_US: u32 = 1_000;
/// RSSI sampling stops this many microseconds before the next expected
/// packet, to avoid contending with the receive drain.
const RSSI_SAMPLE_GUARD_US: u32 = 1_500;
const RSSI_SAMPLES_PER_AVERAGE: u8 = 8;

pub struct Scheduler<SPI, CS, DELAY> {
    pub interface: Interface<SPI, CS, DELAY>,
    pub bind_data: BindData,
    pub state: LinkState,
    pub phase: LinkPhase,
}

impl<SPI, CS, DELAY, E1, E2> Scheduler<SPI, CS, DELAY>
where
    SPI: SpiBus<u8, Error = E1>,
    CS: OutputPin<Error = E2>,
    DELAY: DelayNs,
{
    /// `rf_mode` is shared with the platform ISR glue (see
    /// [`crate::Receiver::init`]) — this does not own it, so the caller
    /// can keep a handle to it even once the driver task owns everything
    /// else here.
    pub fn new(
        interface: Interface<SPI, CS, DELAY>,
        bind_data: BindData,
        rf_mode: &'static Mode,
    ) -> Self {
        Self {
            interface,
            bind_data,
            state: LinkState::new(rf_mode),
            phase: LinkPhase::Acquiring,
        }
    }

    fn hop_count(&self) -> usize {
        self.bind_data.hop_count()
    }

    fn interval_us(&self) -> u32 {
        let bps = MODEM_TABLE[self.bind_data.modem_params as usize].bps;
        let diversity = self.bind_data.flags & crate::data::DIVERSITY_ENABLED != 0;
        codec::interval(self.bind_data.flags, bps, diversity)
    }

    fn packet_size(&self) -> usize {
        crate::params::packet_size(self.bind_data.flags) as usize
    }

    /// One driver-task iteration. Notifies `sink` when a servo frame was
    /// drained this tick.
    pub fn tick(
        &mut self,
        clock: &impl Clock,
        sink: &mut dyn PpmSink,
    ) -> Result<(), LinkError> {
        // 1. Lockup detection.
        if self.interface.read(Register::Gpio1Config)? == 0 {
            defmt::warn!("radio lockup detected, reinitializing");
            self.interface.init_radio(false, &self.bind_data)?;
            self.enter_rx()?;
            return Ok(());
        }

        let mut willhop = false;
        let now = clock.micros();
        let interval = self.interval_us();
        let hop_count = self.hop_count();

        // 2. Drain on received.
        if self.state.rf_mode.get() == ModeValue::Received {
            let pkt_size = self.packet_size();
            self.interface
                .burst_read(Register::FifoAccess, &mut self.state.rx_buf[..pkt_size])?;
            self.state.afc_last = {
                let hi = self.interface.read(Register::AfcCorrectionRead)? as i16;
                let lo = self.interface.read(Register::AfcCorrectionRead2)? as i16;
                (hi << 8) | lo
            };
            self.state.last_packet_time_us = clock.micros();

            self.state.lost_packets = 0;
            self.state.link_quality = (self.state.link_quality << 1) | 1;

            let header = self.state.rx_buf[0];
            if codec::header_subtype(header) == SUBTYPE_SERVO {
                let n = codec::unpack_ppm(
                    &self.state.rx_buf[1..pkt_size],
                    self.bind_data.flags,
                    &mut self.state.ppm,
                );
                sink.on_ppm(&self.state.ppm[..n]);
            }

            self.state.link_acquired = true;
            self.phase = LinkPhase::Synchronized;
            self.enter_rx()?;
            willhop = true;
        }

        // 3. RSSI sampling.
        let since_last = now.wrapping_sub(self.state.last_packet_time_us);
        if self.state.lost_packets < 2 && since_last < interval.saturating_sub(RSSI_SAMPLE_GUARD_US) {
            let rssi = self.interface.read(Register::Rssi)?;
            self.state.rssi_last = rssi;
            self.state.rssi_sum += rssi as u32;
            self.state.rssi_count += 1;
            if self.state.rssi_count >= RSSI_SAMPLES_PER_AVERAGE {
                let avg = (self.state.rssi_sum / self.state.rssi_count as u32) as u8;
                self.state.rssi_smooth =
                    ((3 * self.state.rssi_smooth as u32 + avg as u32) / 4) as u8;
                self.state.rssi_sum = 0;
                self.state.rssi_count = 0;
            }
        }

        // 4. Loss and slow-hop logic.
        if self.state.link_acquired {
            let elapsed = now.wrapping_sub(self.state.last_packet_time_us);
            if (self.state.lost_packets as usize) < hop_count && elapsed > interval + MISS_SLACK_US
            {
                self.state.link_quality <<= 1;
                self.state.lost_packets += 1;
                self.state.last_packet_time_us =
                    self.state.last_packet_time_us.wrapping_add(interval);
                self.phase = LinkPhase::Lost;
                if self.state.lost_packets == 1 {
                    self.state.link_loss_time_ms = clock.millis();
                }
                willhop = true;
            } else if self.state.lost_packets as usize == hop_count
                && elapsed > interval * hop_count as u32
            {
                defmt::warn!("link lost beyond hop count, entering search mode");
                self.state.link_quality = 0;
                self.state.rssi_smooth = 0;
                self.state.last_packet_time_us = now;
                willhop = true;
            }
        } else if now.wrapping_sub(self.state.last_packet_time_us) > interval * hop_count as u32 {
            // 5. Acquisition search.
            self.state.last_packet_time_us = now;
            willhop = true;
        }

        // 6. Hop.
        if willhop {
            self.state.rf_channel += 1;
            if self.state.rf_channel >= crate::data::MAXHOPS
                || self.bind_data.hopchannel[self.state.rf_channel] == 0
            {
                self.state.rf_channel = 0;
            }
            self.interface
                .set_channel(self.state.rf_channel as u8, &self.bind_data, false)?;
        }

        Ok(())
    }

    /// Arms the radio for reception and sets `rf_mode` to `Receive`.
    pub fn enter_rx(&mut self) -> Result<(), LinkError> {
        self.interface.enter_rx()?;
        self.state.rf_mode.set(ModeValue::Receive);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MAXHOPS;

    fn test_bind(hop_count: usize) -> BindData {
        let mut hopchannel = [0u8; MAXHOPS];
        for (i, c) in hopchannel.iter_mut().enumerate().take(hop_count) {
            *c = (i + 1) as u8;
        }
        BindData {
            version: crate::data::BINDING_VERSION,
            serial_baudrate: 115_200,
            rf_frequency: 435_000_000,
            rf_magic: 0x1234_5678,
            rf_power: 4,
            rf_channel_spacing: 10,
            modem_params: 1, // 9600 bps
            flags: 4,        // packet size group 4 -> 16 bytes, no telemetry
            hopchannel,
        }
    }

    #[test]
    fn hop_count_reads_back_terminator_position() {
        let bd = test_bind(5);
        assert_eq!(bd.hop_count(), 5);
    }

    #[test]
    fn interval_floor_holds_for_test_bind() {
        let bd = test_bind(5);
        let bps = MODEM_TABLE[bd.modem_params as usize].bps;
        let iv = codec::interval(bd.flags, bps, false);
        assert_eq!(iv % 1000, 0);
        assert!(iv >= codec::bytes_to_usec(16, bps, false) + 2_000);
    }
}
