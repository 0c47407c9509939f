//! Composes register sequences for the RFM22B: power-on reset, modem
//! parameter programming, carrier-frequency synthesis, sync-word/header
//! programming, TX power, GPIO routing, FIFO clear, and power-state
//! transitions.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::data::{BindData, BIND_MAGIC, BINDING_FREQUENCY, BINDING_POWER, DIVERSITY_ENABLED};
use crate::error::LinkError;
use crate::params::{BIND_MODEM_INDEX, MODEM_TABLE};
use crate::regs::{Register, MODEM_GROUP, SYNC_WORD};
use crate::spi_interface::Interface;

/// Op-and-func-ctrl1 value putting the radio in READY (xton) state.
const READY_MODE: u8 = 0x01;
/// 12.5 pF crystal load capacitance.
const XTAL_LOAD_CAP_12_5PF: u8 = 0x7F;
/// Enables the microcontroller clock output at 2 MHz.
const MC_CLK_OUT_ENABLE: u8 = 0x06;

/// GPIO function code: TX state indicator.
const GPIO_FUNC_TX_STATE: u8 = 0x12;
/// GPIO function code: RX state indicator.
const GPIO_FUNC_RX_STATE: u8 = 0x15;

/// `0x30` data-access-control: CRC enabled, MSB first, variable length.
const DATA_ACCESS_CTRL: u8 = 0x8C;
/// `0x32` header-control1: 4-byte header, header check enabled on all bytes.
const HEADER_CTRL1: u8 = 0x0F;
/// `0x33` header-control2: 2-byte sync word, variable packet length.
const HEADER_CTRL2: u8 = 0x42;
/// `0x35` preamble-detection-control.
const PREAMBLE_DETECT: u8 = 0x2A;

const PREAMBLE_NIBBLES_NORMAL: u8 = 10;
const PREAMBLE_NIBBLES_DIVERSITY: u8 = 20;

const HEADER_ENABLE_ALL: u8 = 0xFF;

/// Oscillator reference used by the carrier-frequency synthesis: 10 MHz
/// times `(1 + hbsel)`.
const BAND_STEP_HZ: u32 = 10_000_000;

impl<SPI, CS, DELAY, E1, E2> Interface<SPI, CS, DELAY>
where
    SPI: SpiBus<u8, Error = E1>,
    CS: OutputPin<Error = E2>,
    DELAY: DelayNs,
{
    /// Full radio bring-up. `bind_mode` selects the bind modem profile,
    /// `BINDING_FREQUENCY`, and `BINDING_POWER` over whatever is in
    /// `bind_data`.
    pub fn init_radio(&mut self, bind_mode: bool, bind_data: &BindData) -> Result<(), LinkError> {
        let mut bus = self.claim()?;

        // 1. Clear any latched IRQ.
        bus.read(Register::InterruptStatus1)?;
        bus.read(Register::InterruptStatus2)?;

        // 2. Disable all interrupt sources.
        bus.write(Register::InterruptEnable1, 0x00)?;
        bus.write(Register::InterruptEnable2, 0x00)?;

        // 3. READY power state, 12.5 pF crystal load, µC clock out.
        bus.write(Register::OpFuncControl1, READY_MODE)?;
        bus.write(Register::XtalLoadCap, XTAL_LOAD_CAP_12_5PF)?;
        bus.write(Register::McClkOut, MC_CLK_OUT_ENABLE)?;

        // 4. GPIO0/GPIO1 -> TX-state / RX-state.
        bus.write(Register::Gpio0Config, GPIO_FUNC_TX_STATE)?;
        bus.write(Register::Gpio1Config, GPIO_FUNC_RX_STATE)?;

        // 5. Modem registers.
        let modem = if bind_mode {
            &MODEM_TABLE[BIND_MODEM_INDEX]
        } else {
            &MODEM_TABLE[bind_data.modem_params as usize]
        };
        for (reg, val) in MODEM_GROUP.iter().zip(modem.regs.iter()) {
            bus.write(*reg, *val)?;
        }

        // 6. Packet handler: MSB first, CRC on, 4-byte header, 2-byte sync.
        bus.write(Register::DataAccessControl, DATA_ACCESS_CTRL)?;
        bus.write(Register::HeaderControl1, HEADER_CTRL1)?;
        bus.write(Register::HeaderControl2, HEADER_CTRL2)?;

        // 7. Preamble length.
        let diversity = !bind_mode && (bind_data.flags & DIVERSITY_ENABLED) != 0;
        let preamble = if diversity {
            PREAMBLE_NIBBLES_DIVERSITY
        } else {
            PREAMBLE_NIBBLES_NORMAL
        };
        bus.write(Register::PreambleLength, preamble)?;
        bus.write(Register::PreambleDetectionControl, PREAMBLE_DETECT)?;

        let sync = SYNC_WORD.to_be_bytes();
        bus.write(Register::SyncWord3, sync[0])?;
        bus.write(Register::SyncWord2, sync[1])?;
        bus.write(Register::SyncWord1, 0x00)?;
        bus.write(Register::SyncWord0, 0x00)?;

        // 8. TX header / check header from the magic, MSB first.
        let magic = if bind_mode {
            BIND_MAGIC
        } else {
            bind_data.rf_magic
        }
        .to_be_bytes();
        bus.write(Register::TransmitHeader3, magic[0])?;
        bus.write(Register::TransmitHeader2, magic[1])?;
        bus.write(Register::TransmitHeader1, magic[2])?;
        bus.write(Register::TransmitHeader0, magic[3])?;
        bus.write(Register::CheckHeader3, magic[0])?;
        bus.write(Register::CheckHeader2, magic[1])?;
        bus.write(Register::CheckHeader1, magic[2])?;
        bus.write(Register::CheckHeader0, magic[3])?;
        bus.write(Register::HeaderEnable3, HEADER_ENABLE_ALL)?;
        bus.write(Register::HeaderEnable2, HEADER_ENABLE_ALL)?;
        bus.write(Register::HeaderEnable1, HEADER_ENABLE_ALL)?;
        bus.write(Register::HeaderEnable0, HEADER_ENABLE_ALL)?;

        // 9. TX power.
        let power = if bind_mode {
            BINDING_POWER
        } else {
            bind_data.rf_power
        };
        bus.write(Register::TxPower, power)?;

        // 10. Hop step size, hop channel 0.
        bus.write(
            Register::FrequencyHoppingStepSize,
            bind_data.rf_channel_spacing,
        )?;
        drop(bus);
        self.set_channel(0, bind_data, bind_mode)?;

        // 11. Carrier frequency.
        let freq = if bind_mode {
            BINDING_FREQUENCY
        } else {
            bind_data.rf_frequency
        };
        self.set_carrier(freq)?;

        // Clear the FIFOs.
        self.clear_fifos()
    }

    /// Clears both TX and RX FIFOs: write `0x03` then `0x00` to
    /// `op-and-func-ctrl2`.
    pub fn clear_fifos(&mut self) -> Result<(), LinkError> {
        let mut bus = self.claim()?;
        bus.write(Register::OpFuncControl2, 0x03)?;
        bus.write(Register::OpFuncControl2, 0x00)
    }

    /// Arms the receiver: clears the FIFOs, enables RX and the
    /// valid-packet IRQ. Does not touch `rf_mode` — callers holding a
    /// `LinkState` set that themselves once this returns.
    pub fn enter_rx(&mut self) -> Result<(), LinkError> {
        self.clear_fifos()?;
        let mut bus = self.claim()?;
        bus.write(Register::OpFuncControl1, 0x05)?; // xton | rxon
        bus.write(Register::InterruptEnable1, 0x02) // ienpkvalid
    }

    /// Queues a transmit of `payload` (at most a few bytes — used for the
    /// bind ack) and enables TX and the packet-sent IRQ.
    pub fn start_tx(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let mut bus = self.claim()?;
        bus.write(Register::TransmitPacketLength, payload.len() as u8)?;
        bus.burst_write(Register::FifoAccess, payload)?;
        bus.write(Register::OpFuncControl1, 0x09)?; // xton | txon
        bus.write(Register::InterruptEnable1, 0x04) // ienpksent
    }

    /// Computes `hbsel`, the integer band, and the fractional part, and
    /// writes the three frequency registers.
    pub fn set_carrier(&mut self, hz: u32) -> Result<(), LinkError> {
        let hbsel: u32 = if hz < 480_000_000 { 0 } else { 1 };
        let step = BAND_STEP_HZ * (1 + hbsel);
        let fb = hz / step - 24;
        let fc = ((hz - (fb + 24) * step) as u64 * 4 / (1 + hbsel as u64) / 625) as u32;

        let band_select = 0x40 | ((hbsel as u8) << 5) | (fb as u8 & 0x1F);
        let fc_bytes = (fc as u16).to_be_bytes();

        let mut bus = self.claim()?;
        bus.write(Register::FrequencyBandSelect, band_select)?;
        bus.write(Register::NominalCarrier1, fc_bytes[0])?;
        bus.write(Register::NominalCarrier0, fc_bytes[1])
    }

    /// Selects a hop channel: writes the hop-channel-select register, and
    /// rotates the header identity by XORing the magic's low byte with
    /// `ch` into both header-3 registers. A transmitter out of phase on
    /// the hop sequence will fail the header check on every packet.
    pub fn set_channel(
        &mut self,
        ch: u8,
        bind_data: &BindData,
        bind_mode: bool,
    ) -> Result<(), LinkError> {
        let magic = if bind_mode {
            BIND_MAGIC
        } else {
            bind_data.rf_magic
        };
        let header3 = (magic & 0xFF) as u8 ^ ch;

        let mut bus = self.claim()?;
        bus.write(
            Register::HoppingChannelSelect,
            bind_data.hopchannel[ch as usize],
        )?;
        bus.write(Register::TransmitHeader3, header3)?;
        bus.write(Register::CheckHeader3, header3)
    }
}

#[cfg(test)]
mod tests {
    /// DS-style carrier synthesis check: 433.92 MHz yields hbsel=0, fb=19,
    /// fc=25088, and the three registers per spec's golden scenario 6.
    #[test]
    fn carrier_433_92_mhz() {
        let hz: u32 = 433_920_000;
        let hbsel: u32 = if hz < 480_000_000 { 0 } else { 1 };
        let step = 10_000_000u32 * (1 + hbsel);
        let fb = hz / step - 24;
        let fc = ((hz - (fb + 24) * step) as u64 * 4 / (1 + hbsel as u64) / 625) as u32;

        assert_eq!(hbsel, 0);
        assert_eq!(fb, 19);
        assert_eq!(fc, 25_088);

        let band_select = 0x40 | ((hbsel as u8) << 5) | (fb as u8 & 0x1F);
        let fc_bytes = (fc as u16).to_be_bytes();
        assert_eq!(band_select, 0x53);
        assert_eq!(fc_bytes, [0x62, 0x00]);
    }

    #[test]
    fn carrier_high_band() {
        let hz: u32 = 915_000_000;
        let hbsel: u32 = if hz < 480_000_000 { 0 } else { 1 };
        assert_eq!(hbsel, 1);
        let step = 10_000_000u32 * (1 + hbsel);
        let fb = hz / step - 24;
        let fc = ((hz - (fb + 24) * step) as u64 * 4 / (1 + hbsel as u64) / 625) as u32;
        // Round-trip: reconstructed frequency must match within 1250 Hz
        // (high-band step is double the low-band 625 Hz step).
        let reconstructed = (fb + 24) * step + (fc as u64 * 625 * (1 + hbsel as u64) / 4) as u32;
        assert!(reconstructed.abs_diff(hz) <= 1250);
    }
}
