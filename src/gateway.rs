//! # Serial to TCP gateway
//!
//! Single threaded driver of the bridge. Call [Gateway::boot] once and [Gateway::poll] in the main
//! loop. Each poll iteration services, in this order:
//!
//! 1. serial input: one chunk of bytes, either collected as `AT+CIPSEND` payload or assembled to
//!    command lines
//! 2. the diagnostics server
//! 3. one pending TCP connection
//! 4. every connection slot in ascending link_id order
//!
//! Only joining a WIFI network blocks, bounded by [Config::join_timeout_ms].
use crate::diagnostics::{DiagnosticsRequest, DiagnosticsServer, ResetCause, Status, UpdateCredentials, Uptime};
use crate::history::History;
use crate::responses::{data_header, LinkEvent, Response, DATA_TRAILER, READY};
use crate::send::SendMode;
use crate::stack::{ConnectionTable, ServerStack, SlotEvent, CAPACITY};
use crate::storage::{Credentials, DurableStorage, ScratchStorage};
use crate::wifi::WifiStation;
use embedded_io::{Error as _, ErrorKind, Read, ReadReady, Write};
use fugit_timer::Timer;
use heapless::Vec;
use log::{debug, info, warn};

/// Size of the command line buffer. Longer lines get discarded.
pub const LINE_BUFFER_SIZE: usize = 2048;

/// Max. payload length of a single `AT+CIPSEND`
pub const SEND_BUFFER_SIZE: usize = 2048;

/// Max. bytes read from a connection per poll iteration
pub const READ_BUFFER_SIZE: usize = 2048;

/// Max. serial bytes processed per poll iteration
pub const SERIAL_CHUNK_SIZE: usize = 64;

/// Number of command lines kept for the diagnostics page
pub const HISTORY_DEPTH: usize = 8;

/// Max. stored length of a single history line
pub const HISTORY_WIDTH: usize = 127;

/// Runtime configuration
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Port of the diagnostics server, not available for `AT+CIPSERVER`
    pub diagnostics_port: u16,

    /// Max. time to wait for the result of `AT+CWJAP`
    pub join_timeout_ms: u32,

    /// Echo every received serial byte
    pub echo: bool,

    /// Title of the status page
    pub device_name: &'static str,

    /// Protection of the firmware upload
    pub update: UpdateCredentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            diagnostics_port: 8080,
            join_timeout_ms: 15_000,
            echo: true,
            device_name: "ESP-AT serial bridge",
            update: UpdateCredentials::default(),
        }
    }
}

impl Config {
    pub fn with_diagnostics_port(mut self, port: u16) -> Self {
        self.diagnostics_port = port;
        self
    }

    pub fn with_join_timeout_ms(mut self, timeout: u32) -> Self {
        self.join_timeout_ms = timeout;
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_device_name(mut self, name: &'static str) -> Self {
        self.device_name = name;
        self
    }

    pub fn with_update_credentials(mut self, update: UpdateCredentials) -> Self {
        self.update = update;
        self
    }
}

/// Serial transport errors. Command errors never abort the loop, these do.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Reading from the serial port failed
    SerialRead(ErrorKind),

    /// Writing to the serial port failed
    SerialWrite(ErrorKind),
}

/// Platform collaborators of the gateway
pub struct Peripherals<S, N, W, T, C, E, R, D> {
    /// Serial port of the host
    pub serial: S,

    /// TCP stack
    pub stack: N,

    /// WIFI join service
    pub wifi: W,

    /// Countdown timer of the join timeout
    pub timer: T,

    /// Free running clock of the uptime. Only `now()` is used, which needs to be monotonic.
    /// Must not share its counter with `timer`, as starting a countdown may reset it.
    pub clock: C,

    /// Durable storage of the WIFI credentials
    pub durable: E,

    /// Warm reset scratch storage of the listener port
    pub scratch: R,

    /// HTTP diagnostics server
    pub diagnostics: D,
}

/// AT command driven bridge between a serial port and up to [CAPACITY] TCP connections
pub struct Gateway<
    S: Read + Write + ReadReady,
    N: ServerStack,
    W: WifiStation,
    T: Timer<TIMER_HZ>,
    C: Timer<TIMER_HZ>,
    E: DurableStorage,
    R: ScratchStorage,
    D: DiagnosticsServer,
    const TIMER_HZ: u32,
> {
    pub(crate) serial: S,

    /// Connection slots and listener
    pub(crate) table: ConnectionTable<N, R>,

    pub(crate) wifi: W,

    pub(crate) timer: T,

    pub(crate) clock: C,

    /// Storage of the credentials
    pub(crate) durable: E,

    pub(crate) diagnostics: D,

    pub(crate) config: Config,

    /// Credentials of the current/last join
    pub(crate) credentials: Credentials,

    /// Partial command line
    pub(crate) line: Vec<u8, LINE_BUFFER_SIZE>,

    /// Payload collection of `AT+CIPSEND`
    pub(crate) send_mode: SendMode<SEND_BUFFER_SIZE>,

    /// Recent command lines
    pub(crate) history: History<HISTORY_DEPTH, HISTORY_WIDTH>,

    /// Receive buffer shared by all connections
    read_buffer: [u8; READ_BUFFER_SIZE],

    uptime: Uptime<TIMER_HZ>,

    reset_cause: ResetCause,
}

impl<S, N, W, T, C, E, R, D, const TIMER_HZ: u32> Gateway<S, N, W, T, C, E, R, D, TIMER_HZ>
where
    S: Read + Write + ReadReady,
    N: ServerStack,
    W: WifiStation,
    T: Timer<TIMER_HZ>,
    C: Timer<TIMER_HZ>,
    E: DurableStorage,
    R: ScratchStorage,
    D: DiagnosticsServer,
{
    pub fn new(peripherals: Peripherals<S, N, W, T, C, E, R, D>, config: Config) -> Self {
        Self {
            serial: peripherals.serial,
            table: ConnectionTable::new(peripherals.stack, peripherals.scratch),
            wifi: peripherals.wifi,
            timer: peripherals.timer,
            clock: peripherals.clock,
            durable: peripherals.durable,
            diagnostics: peripherals.diagnostics,
            config,
            credentials: Credentials::default(),
            line: Vec::new(),
            send_mode: SendMode::new(),
            history: History::new(),
            read_buffer: [0x0; READ_BUFFER_SIZE],
            uptime: Uptime::default(),
            reset_cause: ResetCause::default(),
        }
    }

    /// Loads persisted state, starts joining the stored network, starts the diagnostics server,
    /// restores the listener of a previous session and reports readiness to the host.
    pub fn boot(&mut self, reset_cause: ResetCause) -> Result<(), Error> {
        self.reset_cause = reset_cause;
        info!("Booting after reset: {}", reset_cause.as_str());

        self.credentials = Credentials::load(&mut self.durable);
        if !self.credentials.is_empty() {
            if let Err(error) = self.wifi.begin(&self.credentials.ssid, &self.credentials.password) {
                warn!("Joining stored network failed: {:?}", error);
            }
        }

        if let Err(error) = self.diagnostics.begin(self.config.diagnostics_port, &self.config.update) {
            warn!("Starting diagnostics server failed: {:?}", error);
        }

        if let Some(port) = self.table.restore_listener() {
            info!("Restored listener on port {}", port);
        }

        self.write(READY)
    }

    /// Runs a single loop iteration
    pub fn poll(&mut self) -> Result<(), Error> {
        self.uptime.update(self.clock.now());

        self.poll_serial()?;
        self.poll_diagnostics();
        self.poll_accept()?;
        self.poll_connections()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Uptime in whole seconds, as of the last poll
    pub fn uptime(&self) -> u64 {
        self.uptime.seconds()
    }

    /// Processes one chunk of serial input
    fn poll_serial(&mut self) -> Result<(), Error> {
        if !self.serial.read_ready().map_err(|e| Error::SerialRead(e.kind()))? {
            return Ok(());
        }

        let mut chunk = [0x0; SERIAL_CHUNK_SIZE];
        let length = self.serial.read(&mut chunk).map_err(|e| Error::SerialRead(e.kind()))?;

        for byte in &chunk[..length] {
            if self.config.echo {
                self.write(&[*byte])?;
            }

            if self.send_mode.is_active() {
                self.collect(*byte)?;
            } else {
                self.assemble_line(*byte)?;
            }
        }

        Ok(())
    }

    /// Adds a byte to the current command line and processes the line once complete
    fn assemble_line(&mut self, byte: u8) -> Result<(), Error> {
        // Can not fail, buffer is cleared once full
        let _ = self.line.push(byte);

        if byte == b'\n' {
            let line = core::mem::take(&mut self.line);

            let mut end = line.len() - 1;
            if end > 0 && line[end - 1] == b'\r' {
                end -= 1;
            }

            return self.process_line(&line[..end]);
        }

        if self.line.is_full() {
            debug!("Discarding command line exceeding {} bytes", LINE_BUFFER_SIZE);
            self.line.clear();
        }

        Ok(())
    }

    /// Adds a byte to the send payload and transmits it once complete
    fn collect(&mut self, byte: u8) -> Result<(), Error> {
        let Some(link_id) = self.send_mode.push(byte) else {
            return Ok(());
        };

        let response = match self.table.send(link_id, self.send_mode.payload()) {
            Ok(_) => Response::SendOk,
            Err(_) => Response::SendFail,
        };

        self.send_mode.reset();
        self.respond(response)
    }

    /// Answers a single pending status page request
    fn poll_diagnostics(&mut self) {
        let Some(DiagnosticsRequest::Status) = self.diagnostics.poll() else {
            return;
        };

        let rssi = self.wifi.rssi();
        let page = Status {
            device_name: self.config.device_name,
            history: self.history.iter(),
            connections: self.table.active_count(),
            listening_port: self.table.listening_port(),
            rssi,
            uptime: self.uptime.seconds(),
            reset_cause: self.reset_cause,
        }
        .render();

        if let Err(error) = self.diagnostics.respond(200, "text/plain", &page) {
            warn!("Answering status request failed: {:?}", error);
        }
    }

    /// Accepts a single pending connection
    fn poll_accept(&mut self) -> Result<(), Error> {
        match self.table.accept() {
            Some(link_id) => self.write(&LinkEvent::Connected(link_id).encode()),
            None => Ok(()),
        }
    }

    /// Forwards received data and close events of all connections
    fn poll_connections(&mut self) -> Result<(), Error> {
        for link_id in 0..CAPACITY {
            match self.table.drain(link_id, &mut self.read_buffer) {
                SlotEvent::Idle => {}
                SlotEvent::Closed => self.link_closed(link_id)?,
                SlotEvent::Data(length) => {
                    self.write(&data_header(link_id, length))?;
                    write_serial(&mut self.serial, &self.read_buffer[..length])?;
                    self.write(DATA_TRAILER)?;
                }
            }
        }

        Ok(())
    }

    /// Notifies the host and cancels a pending transmission to the link
    pub(crate) fn link_closed(&mut self, link_id: usize) -> Result<(), Error> {
        if self.send_mode.abort_for(link_id) {
            debug!("Aborted transmission to closed link {}", link_id);
        }

        self.write(&LinkEvent::Closed(link_id).encode())
    }

    /// Sends the terminal response of a command
    pub(crate) fn respond(&mut self, response: Response) -> Result<(), Error> {
        self.write(response.as_bytes())
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        write_serial(&mut self.serial, data)
    }
}

fn write_serial<S: Write>(serial: &mut S, data: &[u8]) -> Result<(), Error> {
    serial.write_all(data).map_err(|e| Error::SerialWrite(e.kind()))
}
