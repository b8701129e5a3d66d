//! Kernel spidev bus for the panel.

use linux_embedded_hal::spidev::{SpiModeFlags, Spidev, SpidevOptions};
use paper_agenda_lib::epd7in5b_hd::{EpdError, SoftwareSpi};
use std::io::Write;

/// Default spidev transfer limit (`bufsiz` module parameter)
const MAX_TRANSFER: usize = 4096;

pub struct SpidevHwSpi {
    dev: Spidev,
}

impl SpidevHwSpi {
    pub fn new(device: &str, speed_hz: u32) -> Result<Self, EpdError> {
        let mut dev = Spidev::open(device).map_err(|e| EpdError(format!("{}: {}", device, e)))?;

        let opts = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        dev.configure(&opts).map_err(|e| EpdError(e.to_string()))?;
        Ok(Self { dev })
    }
}

impl SoftwareSpi for SpidevHwSpi {
    fn write_byte(&mut self, data: u8) -> Result<(), EpdError> {
        self.write_bytes(&[data])
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), EpdError> {
        for chunk in data.chunks(MAX_TRANSFER) {
            self.dev
                .write_all(chunk)
                .map_err(|e| EpdError(e.to_string()))?;
        }
        Ok(())
    }
}
