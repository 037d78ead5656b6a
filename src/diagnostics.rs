//! # Diagnostics endpoint
//!
//! The platform runs a small HTTP server with a read only status page and an authenticated firmware
//! upload path. The upload is handled by the platform, the gateway just provides the update
//! credentials and renders the status page.
use core::fmt::Debug;
use fugit::TimerInstantU32;
use heapless::Vec;
use numtoa::NumToA;

/// Max. size of the status page body
pub const STATUS_PAGE_SIZE: usize = 2048;

/// HTTP server of the platform
pub trait DiagnosticsServer {
    type Error: Debug;

    /// Starts the server on the given port. Firmware upload is protected by the given credentials.
    fn begin(&mut self, port: u16, update: &UpdateCredentials) -> Result<(), Self::Error>;

    /// Returns a pending request which needs to be answered by the gateway
    fn poll(&mut self) -> Option<DiagnosticsRequest>;

    /// Answers the pending request
    fn respond(&mut self, status: u16, content_type: &str, body: &[u8]) -> Result<(), Self::Error>;
}

/// Request answered by the gateway
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticsRequest {
    /// `GET /`
    Status,
}

/// Path and credentials of the firmware upload
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpdateCredentials {
    pub path: &'static str,
    pub user: &'static str,
    pub password: &'static str,
}

impl Default for UpdateCredentials {
    fn default() -> Self {
        Self {
            path: "/firmware",
            user: "admin",
            password: "esp8266",
        }
    }
}

/// Cause of the last reset, reported by the platform at boot
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ResetCause {
    #[default]
    PowerOn,
    HardwareWatchdog,
    Exception,
    SoftwareWatchdog,
    Software,
    DeepSleepWake,
    External,
}

impl ResetCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetCause::PowerOn => "Power on",
            ResetCause::HardwareWatchdog => "Hardware Watchdog",
            ResetCause::Exception => "Exception",
            ResetCause::SoftwareWatchdog => "Software Watchdog",
            ResetCause::Software => "Software/System restart",
            ResetCause::DeepSleepWake => "Deep-Sleep Wake",
            ResetCause::External => "External System",
        }
    }
}

/// 64 bit uptime based on 32 bit timer ticks. Needs to be updated at least once per timer overflow.
#[derive(Default)]
pub struct Uptime<const TIMER_HZ: u32> {
    low: u32,
    high: u32,
}

impl<const TIMER_HZ: u32> Uptime<TIMER_HZ> {
    pub fn update(&mut self, now: TimerInstantU32<TIMER_HZ>) {
        let ticks = now.ticks();
        if ticks < self.low {
            self.high = self.high.wrapping_add(1);
        }

        self.low = ticks;
    }

    /// Uptime in whole seconds
    pub fn seconds(&self) -> u64 {
        (((self.high as u64) << 32) | self.low as u64) / TIMER_HZ as u64
    }
}

/// Values shown on the status page
pub(crate) struct Status<'a, I: Iterator<Item = &'a [u8]>> {
    pub device_name: &'a str,
    pub history: I,
    pub connections: usize,
    pub listening_port: Option<u16>,
    pub rssi: i32,
    pub uptime: u64,
    pub reset_cause: ResetCause,
}

impl<'a, I: Iterator<Item = &'a [u8]>> Status<'a, I> {
    /// Renders the plain text page. Output gets truncated if exceeding [STATUS_PAGE_SIZE].
    pub fn render(self) -> Vec<u8, STATUS_PAGE_SIZE> {
        let mut page = Page::default();

        page.text(self.device_name);
        page.text("\n\nAT history:\n");
        for line in self.history {
            page.text("> ");
            page.bytes(line);
            page.text("\n");
        }

        page.text("\nconnections: ");
        page.number(self.connections as i64);
        page.text(", listening port: ");
        match self.listening_port {
            Some(port) => page.number(port as i64),
            None => page.text("none"),
        }

        page.text("\nRSSI: ");
        page.number(self.rssi as i64);
        page.text(", uptime: ");
        page.number(self.uptime.min(i64::MAX as u64) as i64);
        page.text(" sec, reset reason: ");
        page.text(self.reset_cause.as_str());
        page.text("\n");

        page.content
    }
}

#[derive(Default)]
struct Page {
    content: Vec<u8, STATUS_PAGE_SIZE>,
}

impl Page {
    fn bytes(&mut self, data: &[u8]) {
        for byte in data {
            if self.content.push(*byte).is_err() {
                return;
            }
        }
    }

    fn text(&mut self, text: &str) {
        self.bytes(text.as_bytes());
    }

    fn number(&mut self, value: i64) {
        let mut buffer = [0x0; 20];
        self.bytes(value.numtoa(10, &mut buffer));
    }
}
