//! The hardware session contract consumed by the orchestrator.

use std::fmt;

/// Geometry and identity reported by the connected controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelDescriptor {
    pub width: u16,
    pub height: u16,
    /// Controller-side memory address the pixel data is loaded into.
    pub target_addr: u32,
    pub firmware_version: String,
    /// Waveform table identity, names the panel model.
    pub lut_version: String,
}

impl PanelDescriptor {
    pub fn full_area(&self) -> Area {
        Area::new(0, 0, self.width, self.height)
    }

    /// Pixel count of the whole panel, one byte per pixel at 8 bpp.
    pub fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

impl fmt::Display for PanelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} panel, firmware {:?}, LUT {:?}, image buffer at {:#x}",
            self.width, self.height, self.firmware_version, self.lut_version, self.target_addr
        )
    }
}

/// Waveform used for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Full flashing clear to white.
    Init,
    /// 16 gray levels, flashing.
    Gc16,
}

impl RefreshMode {
    pub fn code(self) -> u16 {
        match self {
            Self::Init => 0,
            Self::Gc16 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Area {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn fits(&self, panel: &PanelDescriptor) -> bool {
        u32::from(self.x) + u32::from(self.width) <= u32::from(panel.width)
            && u32::from(self.y) + u32::from(self.height) <= u32::from(panel.height)
    }
}

/// A connected display controller.
///
/// `init` must succeed before any other call. Buffers are borrowed for the
/// duration of one call only.
pub trait DeviceSession {
    fn init(&mut self) -> anyhow::Result<()>;

    fn query_panel(&self) -> anyhow::Result<PanelDescriptor>;

    fn clear_and_refresh(&mut self, mode: RefreshMode) -> anyhow::Result<()>;

    fn refresh_8bit(
        &mut self,
        buffer: &[u8],
        area: Area,
        hold: bool,
        target_addr: u32,
    ) -> anyhow::Result<()>;

    fn refresh_4bit_packed(
        &mut self,
        buffer: &[u8],
        area: Area,
        hold: bool,
        target_addr: u32,
        packed: bool,
    ) -> anyhow::Result<()>;

    fn sleep(&mut self) -> anyhow::Result<()>;

    fn teardown(&mut self) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> PanelDescriptor {
        PanelDescriptor {
            width: 1872,
            height: 1404,
            target_addr: 0x0012_36e0,
            firmware_version: "SWv_0.1.1.".into(),
            lut_version: "M841_TFA5210".into(),
        }
    }

    #[test]
    fn area_fit_is_inclusive_of_panel_edge() {
        let panel = panel();
        assert!(panel.full_area().fits(&panel));
        assert!(Area::new(1871, 1403, 1, 1).fits(&panel));
        assert!(!Area::new(1, 0, 1872, 1404).fits(&panel));
        assert!(!Area::new(0, u16::MAX, 1, 1).fits(&panel));
    }

    #[test]
    fn mode_codes_match_waveforms() {
        assert_eq!(RefreshMode::Init.code(), 0);
        assert_eq!(RefreshMode::Gc16.code(), 2);
    }
}
