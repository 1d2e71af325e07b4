//! Implement the [`DeviceSession`] for the **IT8951** controller.
//!
//! The controller drives the 10.3 inch 1872x1404 panel. Images are loaded
//! into controller memory at the address reported by the device, then shown
//! with one of the panel's waveforms.
//!
//! # Examples
//! ```no_run
//! # use update_display::{config::DeviceConfig, it8951::LinuxIt8951};
//! # use update_display::session::{DeviceSession, RefreshMode};
//! let mut epd = LinuxIt8951::open(&DeviceConfig::default(), 1480).unwrap();
//! epd.init().unwrap();
//! epd.clear_and_refresh(RefreshMode::Init).unwrap();
//!
//! // An initialized controller is put to sleep on drop, errors ignored.
//! ```

use std::{
    fmt::Debug,
    time::{Duration, Instant},
};

use anyhow::Context;
use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};
use it8951_core::{DelayStep, Error, SpiInterface, TimeOutError};
use tracing::{debug, info};

use crate::session::{Area, DeviceSession, PanelDescriptor, RefreshMode};

const CMD_SYS_RUN: u16 = 0x0001;
const CMD_SLEEP: u16 = 0x0003;
const CMD_REG_RD: u16 = 0x0010;
const CMD_REG_WR: u16 = 0x0011;
const CMD_LD_IMG_AREA: u16 = 0x0021;
const CMD_LD_IMG_END: u16 = 0x0022;
const CMD_DPY_AREA: u16 = 0x0034;
const CMD_DPY_BUF_AREA: u16 = 0x0037;
const CMD_VCOM: u16 = 0x0039;
const CMD_GET_DEV_INFO: u16 = 0x0302;

/// Host interface packed pixel control.
const REG_I80CPCR: u16 = 0x0004;
/// Load image start address, high half at +2.
const REG_LISAR: u16 = 0x0208;
/// LUT engine status, zero when idle.
const REG_LUTAFSR: u16 = 0x1224;

const ENDIAN_LITTLE: u16 = 0;
const ROTATE_0: u16 = 0;

const DEV_INFO_WORDS: usize = 20;
const BURST_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    Bpp4,
    Bpp8,
}

impl PixelFormat {
    fn code(self) -> u16 {
        match self {
            Self::Bpp4 => 2,
            Self::Bpp8 => 3,
        }
    }

    fn bits(self) -> usize {
        match self {
            Self::Bpp4 => 4,
            Self::Bpp8 => 8,
        }
    }

    fn white(self) -> u16 {
        match self {
            Self::Bpp4 => 0x0f,
            Self::Bpp8 => 0xff,
        }
    }

    /// Pixel `index` of consecutive pixels, low nibble first at 4 bpp.
    fn pixel(self, buffer: &[u8], index: usize) -> u16 {
        match self {
            Self::Bpp4 => match buffer.get(index / 2) {
                Some(byte) if index % 2 == 0 => u16::from(byte & 0x0f),
                Some(byte) => u16::from(byte >> 4),
                None => self.white(),
            },
            Self::Bpp8 => buffer.get(index).map_or(self.white(), |&b| u16::from(b)),
        }
    }
}

pub struct It8951<Spi, I, O, D>
where
    Spi: SpiDevice,
    I: InputPin,
    O: OutputPin,
    D: DelayNs,
    anyhow::Error: From<Spi::Error> + From<I::Error> + From<O::Error>,
{
    interface: SpiInterface<Spi, I, O, D, anyhow::Error>,
    /// Requested VCOM in millivolts.
    vcom: u16,
    ready_timeout: Duration,
    state: It8951State,
}

impl<Spi, I, O, D> Debug for It8951<Spi, I, O, D>
where
    Spi: SpiDevice,
    I: InputPin,
    O: OutputPin,
    D: DelayNs,
    anyhow::Error: From<Spi::Error> + From<I::Error> + From<O::Error>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("It8951")
            .field("vcom", &self.vcom)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<Spi, I, O, D> It8951<Spi, I, O, D>
where
    Spi: SpiDevice,
    I: InputPin,
    O: OutputPin,
    D: DelayNs,
    anyhow::Error: From<Spi::Error> + From<I::Error> + From<O::Error>,
{
    pub fn new(spi: Spi, rst_pin: O, cs_pin: Option<O>, hrdy_pin: I, delay: D, vcom: u16) -> Self {
        Self {
            interface: SpiInterface::new(spi, rst_pin, cs_pin, hrdy_pin, delay),
            vcom,
            ready_timeout: SpiInterface::<Spi, I, O, D, anyhow::Error>::DEFAULT_READY_TIMEOUT,
            state: It8951State {
                power_on: None,
                panel: None,
            },
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.interface.set_ready_timeout(timeout);
        self.ready_timeout = timeout;
        self
    }

    fn hw_reset(&mut self) -> Result<(), anyhow::Error> {
        self.interface.set_rst_pin(true)?;
        self.interface.delay(DelayStep::Ms(200));
        self.interface.set_rst_pin(false)?;
        self.interface.delay(DelayStep::Ms(10));
        self.interface.set_rst_pin(true)?;
        self.interface.delay(DelayStep::Ms(200));
        self.state.power_on = Some(Instant::now());
        Ok(())
    }

    fn write_reg(&mut self, addr: u16, value: u16) -> Result<(), anyhow::Error> {
        self.interface.command_args(CMD_REG_WR, &[addr, value])
    }

    fn read_reg(&mut self, addr: u16) -> Result<u16, anyhow::Error> {
        self.interface.command_args(CMD_REG_RD, &[addr])?;
        self.interface.read_data()
    }

    fn read_device_info(&mut self) -> Result<PanelDescriptor, anyhow::Error> {
        let mut words = [0u16; DEV_INFO_WORDS];
        self.interface.command(CMD_GET_DEV_INFO)?;
        self.interface.read_burst(&mut words)?;
        Ok(parse_device_info(&words))
    }

    fn read_vcom(&mut self) -> Result<u16, anyhow::Error> {
        self.interface.command_args(CMD_VCOM, &[0x0000])?;
        self.interface.read_data()
    }

    fn write_vcom(&mut self, vcom: u16) -> Result<(), anyhow::Error> {
        self.interface.command_args(CMD_VCOM, &[0x0001, vcom])
    }

    fn wait_display_ready(&mut self) -> Result<(), anyhow::Error> {
        let now = Instant::now();
        while self.read_reg(REG_LUTAFSR)? != 0 {
            if now.elapsed() >= self.ready_timeout {
                return Err(TimeOutError {
                    timeout: self.ready_timeout,
                    elapsed: now.elapsed(),
                }
                .into());
            }
            self.interface.delay(DelayStep::Ms(1));
        }
        Ok(())
    }

    fn set_target_addr(&mut self, target_addr: u32) -> Result<(), anyhow::Error> {
        let [lo, hi] = split_addr(target_addr);
        self.write_reg(REG_LISAR + 2, hi)?;
        self.write_reg(REG_LISAR, lo)?;
        Ok(())
    }

    fn panel(&self) -> Result<&PanelDescriptor, anyhow::Error> {
        let panel = self.state.panel.as_ref().ok_or(Error::NotInitialized)?;
        self.state.check_sleep()?;
        Ok(panel)
    }

    fn check_area(&self, area: Area) -> Result<(), anyhow::Error> {
        let panel = self.panel()?;
        if !area.fits(panel) {
            return Err(Error::AreaOutOfBounds {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height,
                panel_width: panel.width,
                panel_height: panel.height,
            }
            .into());
        }
        Ok(())
    }

    fn load_image(
        &mut self,
        buffer: &[u8],
        area: Area,
        format: PixelFormat,
        target_addr: u32,
        packed: bool,
    ) -> Result<(), anyhow::Error> {
        self.set_target_addr(target_addr)?;
        self.interface.command_args(CMD_LD_IMG_AREA, &load_image_args(area, format))?;

        let words = pixel_words(buffer, area, format);
        if packed {
            self.interface.data_burst(&words, BURST_CHUNK)?;
        } else {
            for word in words {
                self.interface.data(word)?;
            }
        }
        self.interface.command(CMD_LD_IMG_END)?;
        Ok(())
    }

    fn display_area(&mut self, area: Area, mode: RefreshMode) -> Result<(), anyhow::Error> {
        self.interface.command_args(
            CMD_DPY_AREA,
            &[area.x, area.y, area.width, area.height, mode.code()],
        )
    }

    fn display_buf_area(
        &mut self,
        area: Area,
        mode: RefreshMode,
        target_addr: u32,
    ) -> Result<(), anyhow::Error> {
        let [lo, hi] = split_addr(target_addr);
        self.interface.command_args(
            CMD_DPY_BUF_AREA,
            &[area.x, area.y, area.width, area.height, mode.code(), lo, hi],
        )
    }

    fn refresh(
        &mut self,
        buffer: &[u8],
        area: Area,
        hold: bool,
        target_addr: u32,
        format: PixelFormat,
        packed: bool,
    ) -> Result<(), anyhow::Error> {
        self.check_area(area)?;
        self.wait_display_ready().context("waiting for the LUT engine")?;
        self.load_image(buffer, area, format, target_addr, packed)
            .context("loading image into controller memory")?;
        if hold {
            self.display_area(area, RefreshMode::Gc16)?;
        } else {
            self.display_buf_area(area, RefreshMode::Gc16, target_addr)?;
        }
        debug!(?area, ?format, hold, packed, "refreshed");
        Ok(())
    }
}

impl<Spi, I, O, D> DeviceSession for It8951<Spi, I, O, D>
where
    Spi: SpiDevice,
    I: InputPin,
    O: OutputPin,
    D: DelayNs,
    anyhow::Error: From<Spi::Error> + From<I::Error> + From<O::Error>,
{
    fn init(&mut self) -> anyhow::Result<()> {
        self.hw_reset().context("resetting the controller")?;
        self.interface.command(CMD_SYS_RUN)?;
        let panel = self.read_device_info().context("reading device information")?;
        info!(%panel, "IT8951 controller found");

        // enable packed writes
        self.write_reg(REG_I80CPCR, 0x0001)?;

        let current = self.read_vcom()?;
        if current != self.vcom {
            debug!(current, requested = self.vcom, "changing VCOM");
            self.write_vcom(self.vcom)?;
        }
        self.state.panel = Some(panel);
        Ok(())
    }

    fn query_panel(&self) -> anyhow::Result<PanelDescriptor> {
        self.panel().cloned()
    }

    /// Loads an all-white frame over the whole panel and shows it with `mode`.
    fn clear_and_refresh(&mut self, mode: RefreshMode) -> anyhow::Result<()> {
        let panel = self.panel()?.clone();
        let area = panel.full_area();
        let row_bytes = (usize::from(panel.width) * PixelFormat::Bpp4.bits()).div_ceil(8);
        let white = vec![0xffu8; row_bytes * usize::from(panel.height)];

        self.wait_display_ready().context("waiting for the LUT engine")?;
        self.load_image(&white, area, PixelFormat::Bpp4, panel.target_addr, true)
            .context("loading blank frame")?;
        self.display_area(area, mode)?;
        debug!(?mode, "cleared");
        Ok(())
    }

    fn refresh_8bit(
        &mut self,
        buffer: &[u8],
        area: Area,
        hold: bool,
        target_addr: u32,
    ) -> anyhow::Result<()> {
        self.refresh(buffer, area, hold, target_addr, PixelFormat::Bpp8, false)
    }

    fn refresh_4bit_packed(
        &mut self,
        buffer: &[u8],
        area: Area,
        hold: bool,
        target_addr: u32,
        packed: bool,
    ) -> anyhow::Result<()> {
        self.refresh(buffer, area, hold, target_addr, PixelFormat::Bpp4, packed)
    }

    fn sleep(&mut self) -> anyhow::Result<()> {
        if let Some(since) = self.state.power_on {
            self.interface.command(CMD_SLEEP)?;
            self.state.power_on = None;
            debug!(awake = ?since.elapsed(), "controller asleep");
        }
        Ok(())
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        self.state.power_on = None;
        self.state.panel = None;
        self.interface.release()
    }
}

impl<Spi, I, O, D> Drop for It8951<Spi, I, O, D>
where
    Spi: SpiDevice,
    I: InputPin,
    O: OutputPin,
    D: DelayNs,
    anyhow::Error: From<Spi::Error> + From<I::Error> + From<O::Error>,
{
    fn drop(&mut self) {
        if self.state.panel.is_some() {
            let _ = self.sleep();
        }
    }
}

#[derive(Debug, Clone)]
struct It8951State {
    power_on: Option<Instant>,
    panel: Option<PanelDescriptor>,
}

impl It8951State {
    fn is_sleeping(&self) -> bool {
        self.power_on.is_none()
    }

    fn check_sleep(&self) -> Result<(), anyhow::Error> {
        if self.is_sleeping() {
            anyhow::bail!("controller is in sleep mode");
        }
        Ok(())
    }
}

/// Device information words: width, height, image buffer address low and
/// high, then firmware and LUT version strings of eight words each.
fn parse_device_info(words: &[u16; DEV_INFO_WORDS]) -> PanelDescriptor {
    PanelDescriptor {
        width: words[0],
        height: words[1],
        target_addr: u32::from(words[2]) | (u32::from(words[3]) << 16),
        firmware_version: word_string(&words[4..12]),
        lut_version: word_string(&words[12..20]),
    }
}

/// Strings arrive low byte first within each word, NUL terminated.
fn word_string(words: &[u16]) -> String {
    let bytes: Vec<u8> = words
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .take_while(|&b| b != 0)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn split_addr(addr: u32) -> [u16; 2] {
    [(addr & 0xffff) as u16, (addr >> 16) as u16]
}

fn load_image_args(area: Area, format: PixelFormat) -> [u16; 5] {
    [
        (ENDIAN_LITTLE << 8) | (format.code() << 4) | ROTATE_0,
        area.x,
        area.y,
        area.width,
        area.height,
    ]
}

/// Little endian words covering `area`.
///
/// Rows follow each other in `buffer` without padding, so a row may start
/// inside a byte. Each row on the wire ends on a word boundary, the gap is
/// filled with white, as are pixels missing at the end of `buffer`.
fn pixel_words(buffer: &[u8], area: Area, format: PixelFormat) -> Vec<u16> {
    let bits = format.bits();
    let per_word = 16 / bits;
    let width = usize::from(area.width);
    let words_per_row = width.div_ceil(per_word);

    let mut words = Vec::with_capacity(words_per_row * usize::from(area.height));
    for row in 0..usize::from(area.height) {
        let first = row * width;
        for column in (0..words_per_row).map(|w| w * per_word) {
            let word = (0..per_word).fold(0u16, |word, slot| {
                let x = column + slot;
                let value = if x < width {
                    format.pixel(buffer, first + x)
                } else {
                    format.white()
                };
                word | (value << (slot * bits))
            });
            words.push(word);
        }
    }
    words
}

#[cfg(feature = "linux")]
mod linux {
    use linux_embedded_hal::{
        gpio_cdev::{Chip, LineRequestFlags},
        spidev::{SpiModeFlags, SpidevOptions},
        CdevPin, Delay, SpidevDevice,
    };

    use super::It8951;
    use crate::config::DeviceConfig;

    pub type LinuxIt8951 = It8951<SpidevDevice, CdevPin, CdevPin, Delay>;

    impl LinuxIt8951 {
        /// Opens the SPI device and requests the GPIO lines named in `config`.
        pub fn open(config: &DeviceConfig, vcom: u16) -> Result<Self, anyhow::Error> {
            let mut spi = SpidevDevice::open(&config.spi_path)?;
            spi.0.configure(
                &SpidevOptions::new()
                    .max_speed_hz(config.spi_speed_hz)
                    .mode(SpiModeFlags::SPI_MODE_0)
                    .build(),
            )?;
            let mut chip = Chip::new(&config.gpio_path)?;
            let pins = &config.pins;
            let rst_pin = CdevPin::new(chip.get_line(pins.rst_pin)?.request(
                LineRequestFlags::OUTPUT,
                1,
                "it8951_rst_pin",
            )?)?;
            let hrdy_pin = CdevPin::new(chip.get_line(pins.busy_pin)?.request(
                LineRequestFlags::INPUT,
                0,
                "it8951_hrdy_pin",
            )?)?;
            let cs_pin = if let Some(cs_pin_n) = pins.cs_pin {
                Some(CdevPin::new(chip.get_line(cs_pin_n)?.request(
                    LineRequestFlags::OUTPUT | LineRequestFlags::ACTIVE_LOW,
                    0,
                    "it8951_cs_pin",
                )?)?)
            } else {
                None
            };
            Ok(Self::new(spi, rst_pin, cs_pin, hrdy_pin, Delay, vcom)
                .with_ready_timeout(config.ready_timeout))
        }
    }
}

#[cfg(feature = "linux")]
pub use linux::LinuxIt8951;
