use std::{path::PathBuf, time::Duration};

use it8951_core::PinDefinition;

use crate::format::ImageFormat;

/// LUT identity reported by the 10.3 inch 1872x1404 panel.
pub const LUT_VERSION_10IN3: &str = "M841_TFA5210";

/// Where and how the IT8951 HAT is wired.
#[derive(Debug)]
pub struct DeviceConfig {
    pub spi_path: PathBuf,
    pub gpio_path: PathBuf,
    pub pins: PinDefinition,
    pub spi_speed_hz: u32,
    /// Upper bound for one wait on the HRDY line or the LUT engine.
    pub ready_timeout: Duration,
}

impl Default for DeviceConfig {
    /// Raspberry Pi wiring: `/dev/spidev0.0`, `/dev/gpiochip0`, default
    /// [`PinDefinition`].
    fn default() -> Self {
        Self {
            spi_path: "/dev/spidev0.0".into(),
            gpio_path: "/dev/gpiochip0".into(),
            pins: PinDefinition::DEFAULT,
            spi_speed_hz: 12_000_000,
            ready_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-executable behavior. Both programs share the whole pipeline and only
/// differ in what they accept and how they describe themselves.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub program: &'static str,
    /// What the program does, one line per entry.
    pub about: &'static [&'static str],
    pub file_label: &'static str,
    pub file_help: &'static [&'static str],
    pub formats: &'static [ImageFormat],
    pub expected_lut_version: &'static str,
    pub examples: &'static [&'static str],
}

pub const UPDATE_DISPLAY: Profile = Profile {
    program: "update-display",
    about: &[
        "Update the display of the connected 10.3 inch e-paper device either",
        "by clearing it or drawing a 8bit per channel RGB BMP or a custom",
        "4bits per pixel image on it.",
    ],
    file_label: "IMAGE_FILE",
    file_help: &[
        "draw the specified image on the display of the",
        "connected e-paper device",
    ],
    formats: &[ImageFormat::StandardBitmap, ImageFormat::Packed4bpp],
    expected_lut_version: LUT_VERSION_10IN3,
    examples: &[
        "-h",
        "-v -2.51",
        "-v -1.50 -f /path/to/image.bmp",
        "-v -1.48 -f /path/to/image.4bpp",
    ],
};

pub const UPDATE_SCREEN: Profile = Profile {
    program: "update-screen",
    about: &[
        "Update the screen of the connected 10.3 inch e-paper device either",
        "by clearing it or drawing a 8bit/channel RGB BMP image on it.",
    ],
    file_label: "BMP_FILE",
    file_help: &[
        "draw the 8bit/channel RGB BMP_FILE on the screen of",
        "the connected e-paper device",
    ],
    formats: &[ImageFormat::StandardBitmap],
    expected_lut_version: LUT_VERSION_10IN3,
    examples: &["-h", "-v -2.51", "-v -1.50 -f /path/to/image.bmp"],
};

impl Profile {
    pub fn accepts(&self, format: ImageFormat) -> bool {
        self.formats.contains(&format)
    }

    pub fn usage(&self) -> String {
        let file_option = format!("  -f {}", self.file_label);
        let indent = " ".repeat(file_option.len() + 2);
        let mut text = format!(
            "Usage: {} -v VOLTAGE [-f <{}> | -h]\n",
            self.program, self.file_label
        );
        for line in self.about {
            text.push_str(line);
            text.push('\n');
        }

        text.push_str("\nMandatory option:\n");
        text.push_str("  -v VOLTAGE  use the VOLTAGE for the connected e-paper device\n");
        text.push_str("              (Read and use the exact voltage from the flexible\n");
        text.push_str("              printed circuit cable of the connected device.)\n");

        text.push_str("\nOptional options:\n");
        for (i, line) in self.file_help.iter().enumerate() {
            if i == 0 {
                text.push_str(&format!("{file_option}  {line}\n"));
            } else {
                text.push_str(&format!("{indent}{line}\n"));
            }
        }
        let help_option = format!("{:width$}", "  -h", width = file_option.len());
        text.push_str(&format!("{help_option}  display this help and exit\n"));

        text.push_str("\nExit status:\n");
        text.push_str("  0  success\n");
        text.push_str("  1  wrong command-line arguments or command-line parsing error\n");
        text.push_str("  2  failed to initialize the e-paper controller\n");
        text.push_str("  3  the connected device is not a 10.3 inch e-paper device\n");
        text.push_str("  4  error during drawing the image onto the panel\n");
        text.push_str("  5  unsupported image file format\n");

        text.push_str("\nExamples:\n");
        for example in self.examples {
            text.push_str(&format!("  ./{} {example}\n", self.program));
        }
        text
    }
}
