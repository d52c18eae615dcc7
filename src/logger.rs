//! Host-attributed logging.
//!
//! Every line a host produces (our own progress messages as well as remote stdout and
//! stderr) goes through a `HostLogger`, which tags it with the host's identity and a
//! display color so output from many hosts can be told apart.

use std::fmt;

use colored::Colorize;
use colourado::{ColorPalette, PaletteType};

use crate::host::Host;

/// Palette size, after which colors are reused round-robin.
pub const PALETTE_SIZE: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl fmt::Display for HostColor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// Hands out host colors round-robin from a fixed palette.
///
/// Owned by whoever creates connections (the dispatcher), so separate dispatches do
/// not share an index.
#[derive(Debug)]
pub struct ColorAllocator {
    colors: Vec<HostColor>,
    next: usize,
}

impl ColorAllocator {
    pub fn new(size: usize) -> Self {
        let colors = ColorPalette::new(size.max(1) as u32, PaletteType::Pastel, false)
            .colors
            .into_iter()
            .map(|color| HostColor {
                red: (color.red * 255.0) as u8,
                green: (color.green * 255.0) as u8,
                blue: (color.blue * 255.0) as u8,
            })
            .collect();
        Self { colors, next: 0 }
    }

    pub fn next_color(&mut self) -> HostColor {
        let color = self.colors[self.next];
        self.next = (self.next + 1) % self.colors.len();
        color
    }
}

impl Default for ColorAllocator {
    fn default() -> Self {
        Self::new(PALETTE_SIZE)
    }
}

/// Logging sink bound to one host.
#[derive(Debug, Clone)]
pub struct HostLogger {
    address: String,
    username: String,
    color: HostColor,
    /// Pre-rendered colored `[user@address]` prefix.
    tag: String,
}

impl HostLogger {
    pub fn new(host: &Host, color: HostColor) -> Self {
        let tag = host
            .to_string()
            .truecolor(color.red, color.green, color.blue)
            .to_string();
        Self {
            address: host.address.clone(),
            username: host.username.clone(),
            color,
            tag,
        }
    }

    pub fn debug(&self, component: &str, message: impl fmt::Display) {
        tracing::debug!(
            host = %self.address,
            username = %self.username,
            component,
            color = %self.color,
            "{} {}",
            self.tag,
            message
        );
    }

    pub fn info(&self, component: &str, message: impl fmt::Display) {
        tracing::info!(
            host = %self.address,
            username = %self.username,
            component,
            color = %self.color,
            "{} {}",
            self.tag,
            message
        );
    }

    pub fn warn(&self, component: &str, message: impl fmt::Display) {
        tracing::warn!(
            host = %self.address,
            username = %self.username,
            component,
            color = %self.color,
            "{} {}",
            self.tag,
            message
        );
    }

    pub fn error(&self, component: &str, message: impl fmt::Display) {
        tracing::error!(
            host = %self.address,
            username = %self.username,
            component,
            color = %self.color,
            "{} {}",
            self.tag,
            message
        );
    }

    /// Progress of one instruction on this host.
    pub fn instruction(&self, kind: &str, description: &str, message: impl fmt::Display) {
        tracing::info!(
            host = %self.address,
            username = %self.username,
            component = "instructions",
            color = %self.color,
            instruction = kind,
            description,
            "{} {}",
            self.tag,
            message
        );
    }

    /// Failure of one instruction on this host.
    pub fn instruction_error(&self, kind: &str, description: &str, message: impl fmt::Display) {
        tracing::error!(
            host = %self.address,
            username = %self.username,
            component = "instructions",
            color = %self.color,
            instruction = kind,
            description,
            "{} {}",
            self.tag,
            message
        );
    }
}
