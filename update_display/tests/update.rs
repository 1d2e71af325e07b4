use std::{io::Write, path::Path};

use tempfile::NamedTempFile;
use update_display::{
    config::{Profile, LUT_VERSION_10IN3, UPDATE_DISPLAY, UPDATE_SCREEN},
    display::{update, ExitStatus},
    format::ImageSource,
    packed4bpp::Packed4bppImage,
    session::{Area, DeviceSession, PanelDescriptor, RefreshMode},
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Init,
    Clear(RefreshMode),
    Refresh8 {
        len: usize,
        area: Area,
        hold: bool,
        addr: u32,
    },
    Refresh4 {
        len: usize,
        area: Area,
        hold: bool,
        addr: u32,
        packed: bool,
    },
    Sleep,
    Teardown,
}

/// Records every call and fails the ones it is told to.
struct FakeSession {
    panel: PanelDescriptor,
    calls: Vec<Call>,
    fail_init: bool,
    fail_refresh: bool,
}

impl FakeSession {
    fn new(width: u16, height: u16) -> Self {
        Self {
            panel: PanelDescriptor {
                width,
                height,
                target_addr: 0x0012_36e0,
                firmware_version: "SWv_0.1.1.".into(),
                lut_version: LUT_VERSION_10IN3.into(),
            },
            calls: Vec::new(),
            fail_init: false,
            fail_refresh: false,
        }
    }

    fn clears(&self) -> Vec<RefreshMode> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Clear(mode) => Some(*mode),
                _ => None,
            })
            .collect()
    }

    fn draws(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Refresh8 { .. } | Call::Refresh4 { .. }))
            .count()
    }

    fn released(&self) -> bool {
        self.calls.ends_with(&[Call::Sleep, Call::Teardown])
    }
}

impl DeviceSession for FakeSession {
    fn init(&mut self) -> anyhow::Result<()> {
        self.calls.push(Call::Init);
        if self.fail_init {
            anyhow::bail!("no controller");
        }
        Ok(())
    }

    fn query_panel(&self) -> anyhow::Result<PanelDescriptor> {
        Ok(self.panel.clone())
    }

    fn clear_and_refresh(&mut self, mode: RefreshMode) -> anyhow::Result<()> {
        self.calls.push(Call::Clear(mode));
        Ok(())
    }

    fn refresh_8bit(
        &mut self,
        buffer: &[u8],
        area: Area,
        hold: bool,
        target_addr: u32,
    ) -> anyhow::Result<()> {
        self.calls.push(Call::Refresh8 {
            len: buffer.len(),
            area,
            hold,
            addr: target_addr,
        });
        if self.fail_refresh {
            anyhow::bail!("HRDY timeout");
        }
        Ok(())
    }

    fn refresh_4bit_packed(
        &mut self,
        buffer: &[u8],
        area: Area,
        hold: bool,
        target_addr: u32,
        packed: bool,
    ) -> anyhow::Result<()> {
        self.calls.push(Call::Refresh4 {
            len: buffer.len(),
            area,
            hold,
            addr: target_addr,
            packed,
        });
        if self.fail_refresh {
            anyhow::bail!("HRDY timeout");
        }
        Ok(())
    }

    fn sleep(&mut self) -> anyhow::Result<()> {
        self.calls.push(Call::Sleep);
        Ok(())
    }

    fn teardown(&mut self) -> anyhow::Result<()> {
        self.calls.push(Call::Teardown);
        Ok(())
    }
}

fn file_with(suffix: &str, bytes: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn source(path: &Path) -> ImageSource {
    ImageSource::new(Some(path.to_path_buf()))
}

fn run(session: &mut FakeSession, profile: &Profile, path: Option<&Path>) -> ExitStatus {
    let source = path.map_or_else(|| ImageSource::new(None), source);
    update(session, profile, &source)
}

/// A 2x2 24 bit BMP, bottom-up rows padded to four bytes.
fn tiny_bmp() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&70u32.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&54u32.to_le_bytes());
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&2i32.to_le_bytes());
    out.extend_from_slice(&2i32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&24u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&[0; 16]);
    for _ in 0..2 {
        out.extend_from_slice(&[0, 0, 0, 0xff, 0xff, 0xff, 0, 0]);
    }
    out
}

#[test]
fn scenario_a_full_panel_4bpp() {
    let image = Packed4bppImage::from_parts(1872, 1404, vec![0x5a; 1872 * 1404 / 2]).unwrap();
    let file = file_with(".4bpp", &image.to_bytes());
    let mut session = FakeSession::new(1872, 1404);

    let status = run(&mut session, &UPDATE_DISPLAY, Some(file.path()));

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(session.clears(), vec![RefreshMode::Gc16]);
    assert_eq!(
        session.calls,
        vec![
            Call::Init,
            Call::Clear(RefreshMode::Gc16),
            Call::Refresh4 {
                len: 1872 * 1404 / 2,
                area: Area::new(0, 0, 1872, 1404),
                hold: true,
                addr: 0x0012_36e0,
                packed: false,
            },
            Call::Sleep,
            Call::Teardown,
        ]
    );
}

#[test]
fn smaller_4bpp_uses_its_own_area() {
    let image = Packed4bppImage::from_parts(4, 2, vec![0x00, 0x11, 0x22, 0x33]).unwrap();
    let file = file_with(".4bpp", &image.to_bytes());
    let mut session = FakeSession::new(1872, 1404);

    assert_eq!(run(&mut session, &UPDATE_DISPLAY, Some(file.path())), ExitStatus::Success);
    assert!(session.calls.contains(&Call::Refresh4 {
        len: 4,
        area: Area::new(0, 0, 4, 2),
        hold: true,
        addr: 0x0012_36e0,
        packed: false,
    }));
}

#[test]
fn empty_4bpp_clears_once_and_draws_nothing() {
    let file = file_with(".4bpp", &[0x50, 0x07, 0x7c, 0x05]);
    let mut session = FakeSession::new(1872, 1404);

    let status = run(&mut session, &UPDATE_DISPLAY, Some(file.path()));

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(session.clears(), vec![RefreshMode::Init]);
    assert_eq!(session.draws(), 0);
    assert!(session.released());
}

#[test]
fn broken_4bpp_falls_back_to_clear() {
    // 3x3 has an odd pixel count
    let file = file_with(".4bpp", &[3, 0, 3, 0, 0, 0, 0, 0, 0]);
    let mut session = FakeSession::new(1872, 1404);

    let status = run(&mut session, &UPDATE_DISPLAY, Some(file.path()));

    assert_eq!(status, ExitStatus::DrawFailed);
    assert_eq!(session.clears(), vec![RefreshMode::Init]);
    assert_eq!(session.draws(), 0);
    assert!(session.released());
}

#[test]
fn bitmap_is_drawn_over_the_whole_panel() {
    let file = file_with(".bmp", &tiny_bmp());
    let mut session = FakeSession::new(16, 8);

    let status = run(&mut session, &UPDATE_SCREEN, Some(file.path()));

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(
        session.calls[1..3],
        [
            Call::Clear(RefreshMode::Gc16),
            Call::Refresh8 {
                len: 16 * 8,
                area: Area::new(0, 0, 16, 8),
                hold: true,
                addr: 0x0012_36e0,
            },
        ]
    );
    assert!(session.released());
}

#[test]
fn undecodable_bitmap_is_a_draw_failure() {
    let file = file_with(".bmp", b"definitely not a bitmap");
    let mut session = FakeSession::new(16, 8);

    assert_eq!(run(&mut session, &UPDATE_DISPLAY, Some(file.path())), ExitStatus::DrawFailed);
    assert_eq!(session.clears(), vec![RefreshMode::Init]);
    assert_eq!(session.draws(), 0);
}

#[test]
fn hardware_failure_while_drawing() {
    let file = file_with(".bmp", &tiny_bmp());
    let mut session = FakeSession::new(16, 8);
    session.fail_refresh = true;

    assert_eq!(run(&mut session, &UPDATE_DISPLAY, Some(file.path())), ExitStatus::DrawFailed);
    assert_eq!(session.clears(), vec![RefreshMode::Gc16, RefreshMode::Init]);
    assert!(session.released());
}

#[test]
fn scenario_f_unsupported_extension() {
    let file = file_with(".gif", b"GIF89a");
    let mut session = FakeSession::new(1872, 1404);

    let status = run(&mut session, &UPDATE_DISPLAY, Some(file.path()));

    assert_eq!(status, ExitStatus::UnsupportedFormat);
    assert_eq!(status.code(), 5);
    assert_eq!(session.calls, vec![Call::Init, Call::Sleep, Call::Teardown]);
}

#[test]
fn update_screen_rejects_4bpp() {
    let file = file_with(".4bpp", &[0, 0, 0, 0]);
    let mut session = FakeSession::new(1872, 1404);

    assert_eq!(
        run(&mut session, &UPDATE_SCREEN, Some(file.path())),
        ExitStatus::UnsupportedFormat
    );
    assert!(session.clears().is_empty());
}

#[test]
fn no_file_clears_with_init_waveform() {
    let mut session = FakeSession::new(1872, 1404);

    assert_eq!(run(&mut session, &UPDATE_DISPLAY, None), ExitStatus::Success);
    assert_eq!(
        session.calls,
        vec![
            Call::Init,
            Call::Clear(RefreshMode::Init),
            Call::Sleep,
            Call::Teardown,
        ]
    );
}

#[test]
fn failed_init_skips_everything_else() {
    let mut session = FakeSession::new(1872, 1404);
    session.fail_init = true;

    assert_eq!(run(&mut session, &UPDATE_DISPLAY, None), ExitStatus::InitFailed);
    assert_eq!(session.calls, vec![Call::Init]);
}

#[test]
fn wrong_device_still_draws() {
    let file = file_with(".bmp", &tiny_bmp());
    let mut session = FakeSession::new(16, 8);
    session.panel.lut_version = "M641".into();

    let status = run(&mut session, &UPDATE_DISPLAY, Some(file.path()));

    assert_eq!(status, ExitStatus::WrongDevice);
    assert_eq!(session.draws(), 1);
    assert!(session.released());
}

#[test]
fn later_failure_overrides_wrong_device() {
    let file = file_with(".gif", b"GIF89a");
    let mut session = FakeSession::new(1872, 1404);
    session.panel.lut_version = String::new();

    assert_eq!(
        run(&mut session, &UPDATE_DISPLAY, Some(file.path())),
        ExitStatus::UnsupportedFormat
    );
}
