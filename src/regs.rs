//! RFM22B register address map.
//!
//! Addresses per the datasheet's register table. Write opcode is
//! `addr | 0x80`; read opcode is `addr & 0x7F` — see
//! [`crate::spi_interface::Interface`].

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format)]
#[allow(dead_code)]
pub enum Register {
    DeviceType = 0x00,
    InterruptStatus1 = 0x03,
    InterruptStatus2 = 0x04,
    InterruptEnable1 = 0x05,
    InterruptEnable2 = 0x06,
    OpFuncControl1 = 0x07,
    OpFuncControl2 = 0x08,
    XtalLoadCap = 0x09,
    McClkOut = 0x0A,
    Gpio0Config = 0x0B,
    Gpio1Config = 0x0C,
    Gpio2Config = 0x0D,
    IoPortConfig = 0x0E,
    IfFilterBandwidth = 0x1C,
    AfcLoopGearshiftOverride = 0x1D,
    AfcTimingControl = 0x1E,
    ClockRecoveryGearshiftOverride = 0x1F,
    ClockRecoveryOversamplingRatio = 0x20,
    ClockRecoveryOffset2 = 0x21,
    ClockRecoveryOffset1 = 0x22,
    ClockRecoveryOffset0 = 0x23,
    ClockRecoveryTimingLoopGain1 = 0x24,
    ClockRecoveryTimingLoopGain0 = 0x25,
    Rssi = 0x26,
    AfcLimiter = 0x2A,
    AfcCorrectionRead = 0x2B,
    AfcCorrectionRead2 = 0x2C,
    DataAccessControl = 0x30,
    HeaderControl1 = 0x32,
    HeaderControl2 = 0x33,
    PreambleLength = 0x34,
    PreambleDetectionControl = 0x35,
    SyncWord3 = 0x36,
    SyncWord2 = 0x37,
    SyncWord1 = 0x38,
    SyncWord0 = 0x39,
    TransmitHeader3 = 0x3A,
    TransmitHeader2 = 0x3B,
    TransmitHeader1 = 0x3C,
    TransmitHeader0 = 0x3D,
    TransmitPacketLength = 0x3E,
    CheckHeader3 = 0x3F,
    CheckHeader2 = 0x40,
    CheckHeader1 = 0x41,
    CheckHeader0 = 0x42,
    HeaderEnable3 = 0x43,
    HeaderEnable2 = 0x44,
    HeaderEnable1 = 0x45,
    HeaderEnable0 = 0x46,
    TxPower = 0x6D,
    ModemTest1 = 0x6E,
    ModemTest2 = 0x6F,
    ModemTest3 = 0x70,
    ChargePumpTest = 0x71,
    ChargePumpCurrentTrim = 0x72,
    FrequencyOffset1 = 0x73,
    FrequencyOffset2 = 0x74,
    FrequencyBandSelect = 0x75,
    NominalCarrier1 = 0x76,
    NominalCarrier0 = 0x77,
    HoppingChannelSelect = 0x79,
    FrequencyHoppingStepSize = 0x7A,
    FifoAccess = 0x7F,
}

/// Modem register group addresses, in the order the bps table (§6.3) lists
/// them: 1C 1D 1E 20 21 22 23 24 25 2A 6E 6F 70 71 72.
pub const MODEM_GROUP: [Register; 15] = [
    Register::IfFilterBandwidth,
    Register::AfcLoopGearshiftOverride,
    Register::AfcTimingControl,
    Register::ClockRecoveryOversamplingRatio,
    Register::ClockRecoveryOffset2,
    Register::ClockRecoveryOffset1,
    Register::ClockRecoveryOffset0,
    Register::ClockRecoveryTimingLoopGain1,
    Register::ClockRecoveryTimingLoopGain0,
    Register::AfcLimiter,
    Register::ModemTest1,
    Register::ModemTest2,
    Register::ModemTest3,
    Register::ChargePumpTest,
    Register::ChargePumpCurrentTrim,
];

pub const DEVICE_TYPE_MASK: u8 = 0x1F;
pub const DEVICE_TYPE_EXPECTED: u8 = 0x08;

pub const SYNC_WORD: u16 = 0x2DD4;
