//! Driver for the 7.5" HD B/W/Red e-paper panel (880×528).
//!
//! Talks to the panel controller over a write-only byte interface plus DC,
//! CS, RST and BUSY lines. The pin and bus traits keep the driver free of any
//! particular GPIO stack; the Linux adapters live in the binary.
//!
//! Buffers use the [`crate::frame::Plane`] layout: packed rows, MSB first,
//! 1 = blank. The controller's red RAM takes 1 = red, so the red plane is
//! inverted on the way out.

use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Display dimensions
pub const EPD_WIDTH: u32 = 880;
pub const EPD_HEIGHT: u32 = 528;

/// A full refresh takes around 20 seconds; give up well after that.
const BUSY_POLL_MS: u64 = 10;
const BUSY_MAX_POLLS: u32 = 6_000;

/// Last gate address of the controller's Y window (0x2AF), little endian.
const GATE_END: [u8; 2] = [0xAF, 0x02];

/// Errors from the panel or its interface.
#[derive(Error, Debug)]
#[error("EPD error: {0}")]
pub struct EpdError(pub String);

/// Byte-oriented bus to the controller
pub trait SoftwareSpi {
    fn write_byte(&mut self, data: u8) -> Result<(), EpdError>;

    /// Send a run of bytes. Adapters with a real SPI device override this
    /// to batch the transfer.
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), EpdError> {
        for &byte in data {
            self.write_byte(byte)?;
        }
        Ok(())
    }
}

/// Output line
pub trait GpioPin {
    fn set_high(&mut self) -> Result<(), EpdError>;
    fn set_low(&mut self) -> Result<(), EpdError>;
}

/// Input line
pub trait InputPin {
    fn is_high(&self) -> Result<bool, EpdError>;
}

/// 7.5" HD B/W/Red display driver
pub struct Epd7in5bHd<SPI, CS, DC, RST, BUSY> {
    spi: SPI,
    cs_pin: CS,
    dc_pin: DC,
    rst_pin: RST,
    busy_pin: BUSY,
    width: u32,
    height: u32,
}

impl<SPI, CS, DC, RST, BUSY> Epd7in5bHd<SPI, CS, DC, RST, BUSY>
where
    SPI: SoftwareSpi,
    CS: GpioPin,
    DC: GpioPin,
    RST: GpioPin,
    BUSY: InputPin,
{
    pub fn new(spi: SPI, cs_pin: CS, dc_pin: DC, rst_pin: RST, busy_pin: BUSY) -> Self {
        Self {
            spi,
            cs_pin,
            dc_pin,
            rst_pin,
            busy_pin,
            width: EPD_WIDTH,
            height: EPD_HEIGHT,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes in one plane
    fn plane_len(&self) -> usize {
        (self.width.div_ceil(8) * self.height) as usize
    }

    fn reset(&mut self) -> Result<(), EpdError> {
        tracing::debug!("panel hardware reset");

        self.rst_pin.set_high()?;
        thread::sleep(Duration::from_millis(200));
        self.rst_pin.set_low()?;
        thread::sleep(Duration::from_millis(4));
        self.rst_pin.set_high()?;
        thread::sleep(Duration::from_millis(200));
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> Result<(), EpdError> {
        self.dc_pin.set_low()?;
        self.cs_pin.set_low()?;
        self.spi.write_byte(command)?;
        self.cs_pin.set_high()?;
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), EpdError> {
        self.dc_pin.set_high()?;
        self.cs_pin.set_low()?;
        self.spi.write_bytes(data)?;
        self.cs_pin.set_high()?;
        Ok(())
    }

    fn command(&mut self, command: u8, data: &[u8]) -> Result<(), EpdError> {
        self.send_command(command)?;
        if !data.is_empty() {
            self.send_data(data)?;
        }
        Ok(())
    }

    /// Wait while BUSY is high.
    fn wait_idle(&mut self) -> Result<(), EpdError> {
        let mut polls = 0;
        while self.busy_pin.is_high()? {
            thread::sleep(Duration::from_millis(BUSY_POLL_MS));
            polls += 1;
            if polls > BUSY_MAX_POLLS {
                return Err(EpdError(format!(
                    "BUSY still high after {} ms",
                    u64::from(BUSY_MAX_POLLS) * BUSY_POLL_MS
                )));
            }
        }
        tracing::trace!("panel idle after {} polls", polls);
        Ok(())
    }

    /// Reset and configure the controller for a full-screen update.
    pub fn init(&mut self) -> Result<(), EpdError> {
        tracing::info!("initializing {}x{} panel", self.width, self.height);

        let x_end = (self.width - 1).to_le_bytes();

        self.reset()?;

        self.command(0x12, &[])?; // SWRESET
        self.wait_idle()?;

        self.command(0x46, &[0xF7])?; // Auto write red RAM
        self.wait_idle()?;
        self.command(0x47, &[0xF7])?; // Auto write black RAM
        self.wait_idle()?;

        self.command(0x0C, &[0xAE, 0xC7, 0xC3, 0xC0, 0x40])?; // Soft start
        self.command(0x01, &[GATE_END[0], GATE_END[1], 0x01])?; // Driver output control
        self.command(0x11, &[0x01])?; // Data entry: X increment, Y decrement
        self.command(0x44, &[0x00, 0x00, x_end[0], x_end[1]])?; // RAM X window
        self.command(0x45, &[GATE_END[0], GATE_END[1], 0x00, 0x00])?; // RAM Y window
        self.command(0x3C, &[0x01])?; // Border waveform
        self.command(0x18, &[0x80])?; // Internal temperature sensor
        self.command(0x22, &[0xB1])?; // Load temperature and waveform
        self.command(0x20, &[])?;
        self.wait_idle()?;

        self.command(0x4E, &[0x00, 0x00])?; // RAM X counter
        self.command(0x4F, &GATE_END)?; // RAM Y counter
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), EpdError> {
        self.command(0x22, &[0xC7])?;
        self.command(0x20, &[])?;
        thread::sleep(Duration::from_millis(200));
        self.wait_idle()
    }

    /// Write both planes and run a full refresh.
    pub fn display(&mut self, black: &[u8], red: &[u8]) -> Result<(), EpdError> {
        let expected = self.plane_len();
        if black.len() != expected || red.len() != expected {
            return Err(EpdError(format!(
                "plane sizes {}/{} bytes, panel needs {}",
                black.len(),
                red.len(),
                expected
            )));
        }

        let red: Vec<u8> = red.iter().map(|byte| !byte).collect();

        tracing::debug!("sending {} bytes per plane", expected);
        self.command(0x4F, &GATE_END)?;
        self.command(0x24, black)?;
        self.command(0x26, &red)?;
        self.refresh()?;

        tracing::info!("panel refreshed");
        Ok(())
    }

    /// Blank the whole panel.
    pub fn clear(&mut self) -> Result<(), EpdError> {
        tracing::info!("clearing panel");

        let len = self.plane_len();

        self.command(0x4F, &GATE_END)?;
        self.command(0x24, &vec![0xFF; len])?;
        self.command(0x26, &vec![0x00; len])?;
        self.refresh()
    }

    /// Deep sleep. The image stays on the panel; a reset wakes it.
    pub fn sleep(&mut self) -> Result<(), EpdError> {
        tracing::debug!("panel entering deep sleep");
        self.command(0x10, &[0x01])
    }
}
