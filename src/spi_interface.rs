//! Bit-exact SPI transactions to the RFM22B.
//!
//! The bus is shared with other devices on the board, so chip-select is
//! managed explicitly here rather than through `embedded-hal`'s
//! `SpiDevice` (which would assert/deassert per call and prevent
//! amortizing a multi-register sequence under one claim). `SPI` is
//! therefore bound to the lower-level `SpiBus`, and `CS` to `OutputPin`.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::error::LinkError;
use crate::regs::Register;

/// Settling delay between asserting chip-select and the first clock edge.
const CS_SETTLE_US: u32 = 1;

pub struct Interface<SPI, CS, DELAY> {
    pub spi: SPI,
    pub cs: CS,
    pub delay: DELAY,
}

/// A bracketed bus claim. Dropping it releases chip-select. Holding one
/// across several register accesses amortizes the settling delay and
/// keeps the sequence atomic against other bus users.
pub struct BusClaim<'a, SPI, CS, DELAY> {
    iface: &'a mut Interface<SPI, CS, DELAY>,
}

impl<'a, SPI, CS, DELAY, E1, E2> BusClaim<'a, SPI, CS, DELAY>
where
    SPI: SpiBus<u8, Error = E1>,
    CS: OutputPin<Error = E2>,
    DELAY: DelayNs,
{
    pub fn read(&mut self, addr: Register) -> Result<u8, LinkError> {
        self.iface.raw_read(addr)
    }

    pub fn write(&mut self, addr: Register, byte: u8) -> Result<(), LinkError> {
        self.iface.raw_write(addr, byte)
    }

    pub fn burst_read(&mut self, addr: Register, buf: &mut [u8]) -> Result<(), LinkError> {
        self.iface.raw_burst_read(addr, buf)
    }

    pub fn burst_write(&mut self, addr: Register, buf: &[u8]) -> Result<(), LinkError> {
        self.iface.raw_burst_write(addr, buf)
    }
}

impl<'a, SPI, CS, DELAY> Drop for BusClaim<'a, SPI, CS, DELAY>
where
    CS: OutputPin,
{
    fn drop(&mut self) {
        let _ = self.iface.cs.set_high();
    }
}

impl<SPI, CS, DELAY, E1, E2> Interface<SPI, CS, DELAY>
where
    SPI: SpiBus<u8, Error = E1>,
    CS: OutputPin<Error = E2>,
    DELAY: DelayNs,
{
    pub fn new(spi: SPI, cs: CS, delay: DELAY) -> Self {
        Self { spi, cs, delay }
    }

    /// Brackets a multi-register sequence under one chip-select assertion.
    pub fn claim(&mut self) -> Result<BusClaim<'_, SPI, CS, DELAY>, LinkError> {
        self.cs.set_low().map_err(|_| LinkError::BusTimeout)?;
        self.delay.delay_us(CS_SETTLE_US);
        Ok(BusClaim { iface: self })
    }

    /// A read is a 16-clock transaction: the address byte goes out first,
    /// and the data byte is only shifted out on MISO during the *second*
    /// byte. Clocking a single byte (address in, whatever MISO held
    /// beforehand out) returns garbage, not the register's contents — so
    /// this clocks the address, then the data, as two separate transfers
    /// under the same chip-select assertion, mirroring `raw_burst_read`.
    fn raw_read(&mut self, addr: Register) -> Result<u8, LinkError> {
        self.spi
            .write(&[addr as u8 & 0x7F])
            .map_err(|_| LinkError::BusTimeout)?;
        let mut buf = [0u8; 1];
        self.spi.transfer_in_place(&mut buf).map_err(|_| LinkError::BusTimeout)?;
        Ok(buf[0])
    }

    fn raw_write(&mut self, addr: Register, byte: u8) -> Result<(), LinkError> {
        self.spi
            .write(&[addr as u8 | 0x80, byte])
            .map_err(|_| LinkError::BusTimeout)
    }

    fn raw_burst_read(&mut self, addr: Register, buf: &mut [u8]) -> Result<(), LinkError> {
        self.spi
            .write(&[addr as u8 & 0x7F])
            .map_err(|_| LinkError::BusTimeout)?;
        self.spi.transfer_in_place(buf).map_err(|_| LinkError::BusTimeout)
    }

    fn raw_burst_write(&mut self, addr: Register, buf: &[u8]) -> Result<(), LinkError> {
        self.spi
            .write(&[addr as u8 | 0x80])
            .map_err(|_| LinkError::BusTimeout)?;
        self.spi.write(buf).map_err(|_| LinkError::BusTimeout)
    }

    /// Single-byte read under its own claim.
    pub fn read(&mut self, addr: Register) -> Result<u8, LinkError> {
        let mut claim = self.claim()?;
        claim.read(addr)
    }

    /// Single-byte write under its own claim.
    pub fn write(&mut self, addr: Register, byte: u8) -> Result<(), LinkError> {
        let mut claim = self.claim()?;
        claim.write(addr, byte)
    }

    /// Burst FIFO read under its own claim.
    pub fn burst_read(&mut self, addr: Register, buf: &mut [u8]) -> Result<(), LinkError> {
        let mut claim = self.claim()?;
        claim.burst_read(addr, buf)
    }

    /// Burst FIFO write under its own claim.
    pub fn burst_write(&mut self, addr: Register, buf: &[u8]) -> Result<(), LinkError> {
        let mut claim = self.claim()?;
        claim.burst_write(addr, buf)
    }
}
