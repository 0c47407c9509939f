//! Error taxonomy for the link engine.
//!
//! Per the error handling policy: the driver task never aborts. Most of
//! the variants here are returned from a single call site and either
//! logged-and-recovered there or bubbled up to `init`, which is the only
//! place a `LinkError` is allowed to actually stop anything.

/// Wraps whatever the `BindStore` collaborator reports. Kept generic so a
/// host, an EEPROM driver, or a flash page writer can each report their
/// own failure shape without this crate caring about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct PersistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum LinkError {
    /// Device-type probe (`DEVICE_TYPE & 0x1F`) did not read back `0x08`.
    DeviceAbsent,
    /// A bus transaction did not complete; reported by the `Interface`.
    BusTimeout,
    /// Synchronous `tx_packet` exceeded its 100 ms ceiling.
    TxTimeout,
    /// `BindData` was requested but none is persisted, or the stored
    /// version does not match `BINDING_VERSION`.
    NoValidBind,
    /// The persistence collaborator failed; the engine continues with
    /// the in-memory `BindData`.
    Persistence(PersistError),
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DeviceAbsent => write!(f, "device type probe mismatch"),
            Self::BusTimeout => write!(f, "SPI bus timeout"),
            Self::TxTimeout => write!(f, "transmit ceiling exceeded"),
            Self::NoValidBind => write!(f, "no valid bind data"),
            Self::Persistence(_) => write!(f, "bind data persistence failed"),
        }
    }
}
