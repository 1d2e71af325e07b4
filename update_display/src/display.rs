//! Drives one run: check the device, put the requested image on the panel,
//! then release the hardware.

use std::{path::Path, process::ExitCode};

use anyhow::Context;
use tracing::{debug, error, info, warn};

use crate::{
    bitmap,
    config::Profile,
    format::{ImageFormat, ImageSource},
    packed4bpp::{self, Decoded4bpp},
    session::{DeviceSession, PanelDescriptor, RefreshMode},
};

/// Process outcome. The numeric values are a stable interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    ArgumentError,
    InitFailed,
    WrongDevice,
    DrawFailed,
    UnsupportedFormat,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::ArgumentError => 1,
            Self::InitFailed => 2,
            Self::WrongDevice => 3,
            Self::DrawFailed => 4,
            Self::UnsupportedFormat => 5,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Puts the session to sleep and tears it down when dropped.
struct Release<'a, S: DeviceSession + ?Sized> {
    inner: &'a mut S,
}

impl<'a, S: DeviceSession + ?Sized> std::ops::Deref for Release<'a, S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        self.inner
    }
}

impl<'a, S: DeviceSession + ?Sized> std::ops::DerefMut for Release<'a, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner
    }
}

impl<'a, S: DeviceSession + ?Sized> Drop for Release<'a, S> {
    fn drop(&mut self) {
        if let Err(e) = self.inner.sleep() {
            warn!("failed to put the e-paper controller to sleep: {e:#}");
        }
        if let Err(e) = self.inner.teardown() {
            warn!("failed to release the e-paper device: {e:#}");
        }
        debug!("session released");
    }
}

/// Initializes `session`, shows `source` on it and releases it again.
///
/// A failed `init` returns [`ExitStatus::InitFailed`] without touching the
/// session further. Past that point the session is always put to sleep and
/// torn down, whatever happens in between.
///
/// A panel that does not report `profile.expected_lut_version` yields
/// [`ExitStatus::WrongDevice`], but the requested image is still drawn. A
/// later draw failure or unsupported format replaces that status.
pub fn update<S>(session: &mut S, profile: &Profile, source: &ImageSource) -> ExitStatus
where
    S: DeviceSession + ?Sized,
{
    if let Err(e) = session.init() {
        error!("failed to initialize the e-paper controller: {e:#}");
        return ExitStatus::InitFailed;
    }
    let mut session = Release { inner: session };

    let panel = match session.query_panel() {
        Ok(panel) => panel,
        Err(e) => {
            error!("failed to query the e-paper controller: {e:#}");
            return ExitStatus::InitFailed;
        }
    };
    info!(%panel, "connected");

    let mut status = ExitStatus::Success;
    if panel.lut_version != profile.expected_lut_version {
        error!(
            found = %panel.lut_version,
            expected = profile.expected_lut_version,
            "connected device is not a 10.3 inch e-paper device"
        );
        status = ExitStatus::WrongDevice;
    }

    match show(&mut *session, &panel, profile, source) {
        Ok(()) => status,
        Err(failure) => failure,
    }
}

fn show<S>(
    session: &mut S,
    panel: &PanelDescriptor,
    profile: &Profile,
    source: &ImageSource,
) -> Result<(), ExitStatus>
where
    S: DeviceSession + ?Sized,
{
    let Some(path) = source.path.as_deref() else {
        return session.clear_and_refresh(RefreshMode::Init).map_err(|e| {
            error!("error during clearing the display: {e:#}");
            ExitStatus::DrawFailed
        });
    };

    let drawn = match source.format {
        ImageFormat::StandardBitmap if profile.accepts(source.format) => {
            draw_bitmap(session, panel, path)
        }
        ImageFormat::Packed4bpp if profile.accepts(source.format) => {
            draw_packed4bpp(session, panel, path)
        }
        _ => {
            error!(path = %path.display(), "unsupported image file format");
            return Err(ExitStatus::UnsupportedFormat);
        }
    };

    drawn.map_err(|e| {
        error!(
            path = %path.display(),
            "error during drawing image onto display: {e:#}"
        );
        if let Err(e) = session.clear_and_refresh(RefreshMode::Init) {
            warn!("fallback clear failed: {e:#}");
        }
        ExitStatus::DrawFailed
    })
}

fn draw_bitmap<S>(session: &mut S, panel: &PanelDescriptor, path: &Path) -> anyhow::Result<()>
where
    S: DeviceSession + ?Sized,
{
    let canvas = bitmap::decode_bmp(panel, path)?;
    session
        .clear_and_refresh(RefreshMode::Gc16)
        .context("clearing before draw")?;
    session
        .refresh_8bit(canvas.buffer(), panel.full_area(), true, panel.target_addr)
        .context("8 bpp refresh")
}

fn draw_packed4bpp<S>(session: &mut S, panel: &PanelDescriptor, path: &Path) -> anyhow::Result<()>
where
    S: DeviceSession + ?Sized,
{
    let image = match packed4bpp::decode_4bpp(path)? {
        Decoded4bpp::Image(image) => image,
        Decoded4bpp::Empty => {
            warn!(
                path = %path.display(),
                "no image data in file, not drawing anything to display"
            );
            return session
                .clear_and_refresh(RefreshMode::Init)
                .context("clearing for an empty image");
        }
    };

    session
        .clear_and_refresh(RefreshMode::Gc16)
        .context("clearing before draw")?;
    session
        .refresh_4bit_packed(image.data(), image.area(), true, panel.target_addr, false)
        .context("4 bpp refresh")
}
