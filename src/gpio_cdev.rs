//! GPIO character-device lines for the panel's DC, RST and BUSY pins.
//!
//! All three lines come from one chip and are requested together, each
//! under its own consumer label (`paper-agenda:dc` and so on) so
//! `gpioinfo` shows who holds what.

use linux_embedded_hal::gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use paper_agenda_lib::config::HardwareConfig;
use paper_agenda_lib::epd7in5b_hd::{EpdError, GpioPin, InputPin};

/// Panel control lines in their idle state: DC on command, RST released.
pub struct PanelLines {
    pub dc: OutputLine,
    pub rst: OutputLine,
    pub busy: BusyLine,
}

impl PanelLines {
    pub fn open(hw: &HardwareConfig) -> Result<Self, EpdError> {
        let mut chip = Chip::new(&hw.gpio_chip)
            .map_err(|e| EpdError(format!("opening {}: {}", hw.gpio_chip, e)))?;

        Ok(Self {
            dc: OutputLine(request(&mut chip, hw.dc_pin, "dc", LineRequestFlags::OUTPUT, 0)?),
            rst: OutputLine(request(&mut chip, hw.rst_pin, "rst", LineRequestFlags::OUTPUT, 1)?),
            busy: BusyLine(request(&mut chip, hw.busy_pin, "busy", LineRequestFlags::INPUT, 0)?),
        })
    }
}

fn request(
    chip: &mut Chip,
    offset: u32,
    role: &str,
    flags: LineRequestFlags,
    initial: u8,
) -> Result<LineHandle, EpdError> {
    let path = chip.path().display().to_string();
    let failed = |e: linux_embedded_hal::gpio_cdev::Error| {
        EpdError(format!("GPIO {} ({}) on {}: {}", offset, role, path, e))
    };
    let line = chip.get_line(offset).map_err(failed)?;
    line.request(flags, initial, &consumer(role)).map_err(failed)
}

fn consumer(role: &str) -> String {
    format!("paper-agenda:{}", role)
}

/// Driven line (DC or RST).
pub struct OutputLine(LineHandle);

impl GpioPin for OutputLine {
    fn set_high(&mut self) -> Result<(), EpdError> {
        self.0.set_value(1).map_err(|e| EpdError(format!("set {}: {}", self.0.line().offset(), e)))
    }
    fn set_low(&mut self) -> Result<(), EpdError> {
        self.0.set_value(0).map_err(|e| EpdError(format!("clear {}: {}", self.0.line().offset(), e)))
    }
}

/// BUSY, high while the controller is working.
pub struct BusyLine(LineHandle);

impl InputPin for BusyLine {
    fn is_high(&self) -> Result<bool, EpdError> {
        let value = self
            .0
            .get_value()
            .map_err(|e| EpdError(format!("read BUSY {}: {}", self.0.line().offset(), e)))?;
        Ok(value == 1)
    }
}

/// Chip select driven by the kernel SPI driver; the driver's CS toggles are no-ops.
pub struct KernelChipSelect;

impl GpioPin for KernelChipSelect {
    fn set_high(&mut self) -> Result<(), EpdError> {
        Ok(())
    }
    fn set_low(&mut self) -> Result<(), EpdError> {
        Ok(())
    }
}
