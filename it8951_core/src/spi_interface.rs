//! The IT8951 host interface over SPI.
//!
//! Considering generality, this interface uses [embedded-hal](https://docs.rs/embedded-hal/latest/embedded_hal/).
//!
//! # Conventions:
//! - `hrdy_pin`: High level when the controller accepts the next transfer
//! - `cs_pin`: Only needed when chip select is not driven by the SPI device
//!   itself, requested as ACTIVE_LOW so `set_high` selects the controller
//! - Words go out most significant byte first

use std::{
    fmt::Debug,
    marker::PhantomData,
    time::{Duration, Instant},
};

use crate::error::TimeOutError;
use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::{Operation, SpiDevice},
};

pub const PREAMBLE_COMMAND: u16 = 0x6000;
pub const PREAMBLE_WRITE: u16 = 0x0000;
pub const PREAMBLE_READ: u16 = 0x1000;

/// IT8951 host interface uses [embedded-hal](https://docs.rs/embedded-hal/latest/embedded_hal/).
pub struct SpiInterface<Spi, I, O, D, E> {
    spi: Spi,
    rst_pin: O,
    cs_pin: Option<O>,
    hrdy_pin: I,

    delay: D,
    ready_timeout: Duration,

    marker: PhantomData<E>,
}

impl<Spi, I, O, D, E> Debug for SpiInterface<Spi, I, O, D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpiInterface")
            .field("ready_timeout", &self.ready_timeout)
            .finish_non_exhaustive()
    }
}

impl<Spi, I, O, D, E> SpiInterface<Spi, I, O, D, E>
where
    Spi: SpiDevice,
    I: InputPin,
    O: OutputPin,
    D: DelayNs,
    E: From<Spi::Error> + From<I::Error> + From<O::Error> + From<TimeOutError>,
{
    pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(spi: Spi, rst_pin: O, cs_pin: Option<O>, hrdy_pin: I, delay: D) -> Self {
        Self {
            spi,
            rst_pin,
            cs_pin,
            hrdy_pin,
            delay,
            ready_timeout: Self::DEFAULT_READY_TIMEOUT,
            marker: PhantomData,
        }
    }

    /// How long a single transfer may wait for HRDY.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.set_ready_timeout(timeout);
        self
    }

    pub fn set_ready_timeout(&mut self, timeout: Duration) {
        self.ready_timeout = timeout;
    }

    fn set_cs(&mut self, active: bool) -> Result<(), E> {
        if let Some(cs) = self.cs_pin.as_mut() {
            if active {
                cs.set_high()?;
            } else {
                cs.set_low()?;
            }
        }
        Ok(())
    }

    pub fn is_ready(&mut self) -> Result<bool, E> {
        Ok(self.hrdy_pin.is_high()?)
    }

    pub fn set_rst_pin(&mut self, active: bool) -> Result<(), E> {
        if active {
            self.rst_pin.set_high()?;
        } else {
            self.rst_pin.set_low()?;
        }
        Ok(())
    }

    pub fn delay(&mut self, delay: DelayStep) {
        match delay {
            DelayStep::Ms(ms) => self.delay.delay_ms(ms),
            DelayStep::Us(us) => self.delay.delay_us(us),
            DelayStep::Ns(ns) => self.delay.delay_ns(ns),
        }
    }

    pub fn wait_ready_timeout(
        &mut self,
        delay: DelayStep,
        timeout: Duration,
    ) -> Result<Duration, E> {
        let now = Instant::now();
        if self.is_ready()? {
            return Ok(now.elapsed());
        }

        let delay = delay.max_one();
        while now.elapsed() < timeout {
            self.delay(delay);
            if self.is_ready()? {
                return Ok(now.elapsed());
            }
        }

        Err(TimeOutError {
            timeout,
            elapsed: now.elapsed(),
        }
        .into())
    }

    pub fn wait_ready(&mut self) -> Result<Duration, E> {
        self.wait_ready_timeout(DelayStep::Us(10), self.ready_timeout)
    }

    fn transfer(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), E> {
        self.wait_ready()?;
        self.set_cs(true)?;
        let result = self.spi.transaction(operations);
        // deselect even when the transfer failed
        self.set_cs(false)?;
        result?;
        Ok(())
    }

    pub fn command(&mut self, cmd: u16) -> Result<(), E> {
        let frame = frame(PREAMBLE_COMMAND, cmd);
        self.transfer(&mut [Operation::Write(&frame)])
    }

    pub fn data(&mut self, word: u16) -> Result<(), E> {
        let frame = frame(PREAMBLE_WRITE, word);
        self.transfer(&mut [Operation::Write(&frame)])
    }

    /// Writes all `words` behind a single preamble, split into SPI writes of
    /// at most `chunk_size` bytes while the controller stays selected.
    pub fn data_burst(&mut self, words: &[u16], chunk_size: usize) -> Result<(), E> {
        if words.is_empty() {
            return Ok(());
        }
        let preamble = PREAMBLE_WRITE.to_be_bytes();
        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_be_bytes()).collect();
        let mut operations: Vec<Operation<'_, u8>> =
            std::iter::once(Operation::Write(&preamble[..]))
                .chain(bytes.chunks(chunk_size.max(1)).map(Operation::Write))
                .collect();
        self.transfer(&mut operations)
    }

    pub fn command_args(&mut self, cmd: u16, args: &[u16]) -> Result<(), E> {
        self.command(cmd)?;
        for &arg in args {
            self.data(arg)?;
        }
        Ok(())
    }

    pub fn read_data(&mut self) -> Result<u16, E> {
        let mut word = [0u16; 1];
        self.read_burst(&mut word)?;
        Ok(word[0])
    }

    /// Reads `words.len()` words. The controller answers the read preamble
    /// with one dummy word first, which is discarded.
    pub fn read_burst(&mut self, words: &mut [u16]) -> Result<(), E> {
        let preamble = PREAMBLE_READ.to_be_bytes();
        let mut dummy = [0u8; 2];
        let mut bytes = vec![0u8; words.len() * 2];
        self.transfer(&mut [
            Operation::Write(&preamble),
            Operation::Read(&mut dummy),
            Operation::Read(&mut bytes),
        ])?;
        for (word, pair) in words.iter_mut().zip(bytes.chunks_exact(2)) {
            *word = u16::from_be_bytes([pair[0], pair[1]]);
        }
        Ok(())
    }

    /// Deselects the controller and holds it in reset.
    pub fn release(&mut self) -> Result<(), E> {
        self.set_cs(false)?;
        self.set_rst_pin(false)?;
        Ok(())
    }
}

fn frame(preamble: u16, word: u16) -> [u8; 4] {
    let [p0, p1] = preamble.to_be_bytes();
    let [w0, w1] = word.to_be_bytes();
    [p0, p1, w0, w1]
}

/// GPIO lines of the IT8951 HAT.
#[derive(Debug)]
pub struct PinDefinition {
    pub rst_pin: u32,
    pub cs_pin: Option<u32>,
    pub busy_pin: u32,
}

impl PinDefinition {
    /// Default without `cs_pin`.
    pub const DEFAULT: PinDefinition = PinDefinition::new(17, None, 24);

    pub const fn new(rst_pin: u32, cs_pin: Option<u32>, busy_pin: u32) -> Self {
        Self {
            rst_pin,
            cs_pin,
            busy_pin,
        }
    }
}

impl Default for PinDefinition {
    /// Default without `cs_pin`.
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy)]
pub enum DelayStep {
    Ns(u32),
    Us(u32),
    Ms(u32),
}

impl DelayStep {
    fn max_one(self) -> Self {
        match self {
            Self::Ns(ns) => Self::Ns(ns.max(1)),
            Self::Us(us) => Self::Us(us.max(1)),
            Self::Ms(ms) => Self::Ms(ms.max(1)),
        }
    }
}
