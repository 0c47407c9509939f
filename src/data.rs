//! The two records the link engine operates on: the persisted [`BindData`]
//! and the in-memory [`LinkState`].

use crate::irq::Mode;

/// Maximum hop-table length.
pub const MAXHOPS: usize = 16;
/// Servo channels carried in a PPM frame. `flags&7` selects up to three
/// 4-channel groups (`flags&7 == 6`) or two groups plus a trailing
/// coarse channel (`flags&7 == 5`); both yield 12 channels, the largest
/// a single frame can carry.
pub const PPM_CHANNELS: usize = 12;
/// Largest data-packet payload (see [`crate::params::PACKET_SIZES`]).
pub const MAX_PACKET: usize = 21;

pub const BINDING_VERSION: u8 = 6;
pub const BINDING_FREQUENCY: u32 = 435_000_000;
pub const BINDING_POWER: u8 = 0;
pub const BIND_MAGIC: u32 = 0x5475_6e65;

/// Telemetry uplink payload size folded into the interval budget; the
/// core never decodes telemetry, but it must still account for the
/// airtime it consumes between servo frames.
pub const TELEMETRY_PACKETSIZE: u8 = 9;

pub const PACKET_SIZE_MASK: u8 = 0x07;
pub const TELEMETRY_MASK: u8 = 0x08;
pub const DIVERSITY_ENABLED: u8 = 0x10;
pub const LIMIT_50HZ: u8 = 0x20;

/// Persisted parameter block identifying a transmitter-receiver pair.
/// Exchanged over the air during bind; see [`crate::bind`].
#[derive(Clone, Copy, PartialEq, Debug, defmt::Format)]
pub struct BindData {
    pub version: u8,
    pub serial_baudrate: u32,
    pub rf_frequency: u32,
    pub rf_magic: u32,
    pub rf_power: u8,
    pub rf_channel_spacing: u8,
    pub modem_params: u8,
    pub flags: u8,
    pub hopchannel: [u8; MAXHOPS],
}

/// Wire size of `BindData`: 1 + 4 + 4 + 4 + 1 + 1 + 1 + 1 + MAXHOPS.
pub const BIND_DATA_WIRE_LEN: usize = 17 + MAXHOPS;

impl BindData {
    /// Number of hop channels in use: the index of the first zero entry
    /// in `hopchannel`, or `MAXHOPS` if the table is unterminated.
    pub fn hop_count(&self) -> usize {
        self.hopchannel
            .iter()
            .position(|&c| c == 0)
            .map(|i| if i == 0 { self.hopchannel.len() } else { i })
            .unwrap_or(self.hopchannel.len())
    }

    /// Serializes in the fixed wire layout used for the bind request.
    pub fn to_bytes(&self, out: &mut [u8; BIND_DATA_WIRE_LEN]) {
        out[0] = self.version;
        out[1..5].copy_from_slice(&self.serial_baudrate.to_le_bytes());
        out[5..9].copy_from_slice(&self.rf_frequency.to_le_bytes());
        out[9..13].copy_from_slice(&self.rf_magic.to_le_bytes());
        out[13] = self.rf_power;
        out[14] = self.rf_channel_spacing;
        out[15] = self.modem_params;
        out[16] = self.flags;
        out[17..17 + MAXHOPS].copy_from_slice(&self.hopchannel);
    }

    /// Deserializes from the fixed wire layout. There is no length check
    /// here beyond the array size — the caller (the bind listener) is
    /// responsible for having burst-read exactly `BIND_DATA_WIRE_LEN` bytes.
    pub fn from_bytes(buf: &[u8; BIND_DATA_WIRE_LEN]) -> Self {
        let mut hopchannel = [0u8; MAXHOPS];
        hopchannel.copy_from_slice(&buf[17..17 + MAXHOPS]);
        Self {
            version: buf[0],
            serial_baudrate: u32::from_le_bytes(buf[1..5].try_into().unwrap()),
            rf_frequency: u32::from_le_bytes(buf[5..9].try_into().unwrap()),
            rf_magic: u32::from_le_bytes(buf[9..13].try_into().unwrap()),
            rf_power: buf[13],
            rf_channel_spacing: buf[14],
            modem_params: buf[15],
            flags: buf[16],
            hopchannel,
        }
    }
}

/// Non-persistent link bookkeeping, created zeroed at init and alive for
/// the lifetime of the session.
pub struct LinkState {
    /// Shared with the platform ISR glue — see [`crate::Receiver::init`].
    /// Borrowed rather than owned so the ISR can keep a handle to it after
    /// the driver task has taken ownership of everything else here.
    pub rf_mode: &'static Mode,
    pub rf_channel: usize,
    pub link_acquired: bool,
    pub last_packet_time_us: u32,
    pub lost_packets: u32,
    /// 15-bit shift register; 1 = packet received, 0 = missed.
    pub link_quality: u16,
    pub rssi_smooth: u8,
    pub rssi_last: u8,
    pub rssi_sum: u32,
    pub rssi_count: u8,
    pub afc_last: i16,
    pub rx_buf: [u8; MAX_PACKET],
    pub ppm: [u16; PPM_CHANNELS],
    /// Wall-clock (ms) at which the current loss streak began; set on the
    /// first miss after a successful reception, per spec step 4.
    pub link_loss_time_ms: u32,
}

impl LinkState {
    pub fn new(rf_mode: &'static Mode) -> Self {
        Self {
            rf_mode,
            rf_channel: 0,
            link_acquired: false,
            last_packet_time_us: 0,
            lost_packets: 0,
            link_quality: 0,
            rssi_smooth: 0,
            rssi_last: 0,
            rssi_sum: 0,
            rssi_count: 0,
            afc_last: 0,
            rx_buf: [0; MAX_PACKET],
            ppm: [0; PPM_CHANNELS],
            link_loss_time_ms: 0,
        }
    }
}

