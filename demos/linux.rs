//! Runs the bridge on Linux: AT commands are read from a serial port (e.g. a USB adapter or a pty),
//! the host TCP stack serves the connections and a minimal HTTP server provides the status page.
use std::{
    convert::Infallible,
    env, fs,
    io::{self, Read as _, Write as _},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use esp_at_bridge::{
    diagnostics::{DiagnosticsRequest, DiagnosticsServer, ResetCause, UpdateCredentials},
    gateway::{Config, Gateway, Peripherals},
    stack::ServerStack,
    storage::{DurableStorage, ScratchStorage},
    wifi::{JoinState, WifiStation},
};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

// Timer frequency in Hz
const TIMER_HZ: u32 = 1000;

fn main() {
    env_logger::init();

    // Parse args
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        println!("Usage: {} <path-to-serial> <baudrate> [state-directory]", args[0]);
        println!("Example: {} /dev/ttyUSB0 115200 /tmp/bridge", args[0]);
        println!("\nNote: To run the example with debug logging, run it like this:");
        println!("\n  RUST_LOG=debug cargo run --example linux -- /dev/ttyUSB0 115200");
        std::process::exit(1);
    }
    let dev = &args[1];
    let baud_rate: u32 = args[2].parse().expect("Invalid baud rate");
    let state_dir = PathBuf::from(args.get(3).map(String::as_str).unwrap_or("."));

    println!("Starting (dev={}, baud={:?}, state={:?})...", dev, baud_rate, state_dir);

    // Open serial port
    let port = serialport::new(dev, baud_rate)
        .data_bits(DataBits::Eight)
        .flow_control(FlowControl::None)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(Duration::from_millis(10))
        .open()
        .expect("Could not open serial port");

    let peripherals = Peripherals {
        serial: Serial(port),
        stack: HostStack,
        wifi: HostWifi,
        timer: timer::SysTimer::new(),
        clock: timer::SysTimer::new(),
        durable: FileStorage::new(state_dir.join("credentials.bin")),
        scratch: FileStorage::new(state_dir.join("listener.bin")),
        diagnostics: HttpDiagnostics::default(),
    };

    let mut gateway: Gateway<_, _, _, _, _, _, _, _, TIMER_HZ> = Gateway::new(peripherals, Config::default());
    gateway.boot(ResetCause::PowerOn).expect("Serial port failed");

    loop {
        gateway.poll().expect("Serial port failed");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Serial port adapter
struct Serial(Box<dyn SerialPort>);

impl embedded_io::ErrorType for Serial {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io::Read for Serial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.0.read(buf) {
            Ok(length) => Ok(length),
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(serial_error(e)),
        }
    }
}

impl embedded_io::ReadReady for Serial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        let available = self.0.bytes_to_read().map_err(|_| embedded_io::ErrorKind::Other)?;
        Ok(available > 0)
    }
}

impl embedded_io::Write for Serial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.write(buf).map_err(serial_error)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush().map_err(serial_error)
    }
}

fn serial_error(error: io::Error) -> embedded_io::ErrorKind {
    log::warn!("Serial port error: {}", error);
    match error.kind() {
        io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
        io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
        _ => embedded_io::ErrorKind::Other,
    }
}

/// Non-blocking server based on the TCP stack of the host
struct HostStack;

impl ServerStack for HostStack {
    type Listener = TcpListener;
    type Connection = TcpStream;
    type Error = io::Error;

    fn listen(&mut self, port: u16) -> Result<TcpListener, io::Error> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        Ok(listener)
    }

    fn accept(&mut self, listener: &mut TcpListener) -> nb::Result<(TcpStream, SocketAddr), io::Error> {
        let (stream, remote) = listener.accept().map_err(would_block)?;
        stream.set_nonblocking(true)?;
        Ok((stream, remote))
    }

    fn is_connected(&mut self, connection: &TcpStream) -> bool {
        match connection.peek(&mut [0x0; 1]) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) => e.kind() == io::ErrorKind::WouldBlock,
        }
    }

    fn receive(&mut self, connection: &mut TcpStream, buffer: &mut [u8]) -> nb::Result<usize, io::Error> {
        connection.read(buffer).map_err(would_block)
    }

    fn send(&mut self, connection: &mut TcpStream, data: &[u8]) -> Result<usize, io::Error> {
        connection.set_nonblocking(false)?;
        let result = connection.write_all(data);
        connection.set_nonblocking(true)?;

        result.map(|_| data.len())
    }

    fn close(&mut self, connection: TcpStream) {
        let _ = connection.shutdown(Shutdown::Both);
    }

    fn unlisten(&mut self, _listener: TcpListener) {}
}

fn would_block(error: io::Error) -> nb::Error<io::Error> {
    match error.kind() {
        io::ErrorKind::WouldBlock => nb::Error::WouldBlock,
        _ => nb::Error::Other(error),
    }
}

/// The host is always connected to its network
struct HostWifi;

impl WifiStation for HostWifi {
    type Error = Infallible;

    fn begin(&mut self, ssid: &[u8], _password: &[u8]) -> Result<(), Infallible> {
        log::info!("Joining \"{}\"", String::from_utf8_lossy(ssid));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn status(&mut self) -> JoinState {
        JoinState::Connected
    }

    fn rssi(&mut self) -> i32 {
        0
    }
}

/// File backed storage, used for both credentials and listener port
struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(path: &Path, buffer: &mut [u8]) -> Result<(), io::Error> {
        let data = fs::read(path)?;
        if data.len() < buffer.len() {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        buffer.copy_from_slice(&data[..buffer.len()]);
        Ok(())
    }
}

impl DurableStorage for FileStorage {
    type Error = io::Error;

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), io::Error> {
        Self::load(&self.path, buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), io::Error> {
        fs::write(&self.path, data)
    }

    fn commit(&mut self) -> Result<(), io::Error> {
        fs::File::open(&self.path)?.sync_all()
    }
}

impl ScratchStorage for FileStorage {
    type Error = io::Error;

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), io::Error> {
        Self::load(&self.path, buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), io::Error> {
        fs::write(&self.path, data)
    }
}

/// Minimal HTTP/1.1 server, one request per connection
#[derive(Default)]
struct HttpDiagnostics {
    listener: Option<TcpListener>,

    /// Connection waiting for the status page
    pending: Option<TcpStream>,

    update_path: &'static str,
}

impl HttpDiagnostics {
    /// Reads the request line, e.g. `GET / HTTP/1.1`
    fn request_line(stream: &mut TcpStream) -> Result<String, io::Error> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(Duration::from_millis(500)))?;

        let mut buffer = [0x0; 512];
        let length = stream.read(&mut buffer)?;
        let request = String::from_utf8_lossy(&buffer[..length]);
        Ok(request.lines().next().unwrap_or_default().to_string())
    }

    fn write_response(stream: &mut TcpStream, status: u16, content_type: &str, body: &[u8]) -> Result<(), io::Error> {
        let reason = match status {
            200 => "OK",
            404 => "Not Found",
            _ => "Not Implemented",
        };

        write!(
            stream,
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            reason,
            content_type,
            body.len()
        )?;
        stream.write_all(body)?;
        stream.shutdown(Shutdown::Both)
    }
}

impl DiagnosticsServer for HttpDiagnostics {
    type Error = io::Error;

    fn begin(&mut self, port: u16, update: &UpdateCredentials) -> Result<(), io::Error> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;

        self.listener = Some(listener);
        self.update_path = update.path;
        println!("Status page: http://localhost:{}/", port);
        Ok(())
    }

    fn poll(&mut self) -> Option<DiagnosticsRequest> {
        let (mut stream, _) = self.listener.as_ref()?.accept().ok()?;

        let line = match Self::request_line(&mut stream) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Reading HTTP request failed: {}", e);
                return None;
            }
        };

        let path = line.split(' ').nth(1).unwrap_or_default();
        let result = match path {
            "/" => {
                self.pending = Some(stream);
                return Some(DiagnosticsRequest::Status);
            }
            path if path == self.update_path => {
                Self::write_response(&mut stream, 501, "text/plain", b"Firmware update not available on host")
            }
            _ => Self::write_response(&mut stream, 404, "text/plain", b"Not found"),
        };

        if let Err(e) = result {
            log::warn!("Writing HTTP response failed: {}", e);
        }
        None
    }

    fn respond(&mut self, status: u16, content_type: &str, body: &[u8]) -> Result<(), io::Error> {
        match self.pending.take() {
            Some(mut stream) => Self::write_response(&mut stream, status, content_type, body),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

mod timer {
    use std::time::Instant as StdInstant;

    use fugit::{TimerDurationU32, TimerInstantU32};
    use fugit_timer::Timer;

    /// A timer with millisecond precision. The clock wraps after ~49 days.
    pub struct SysTimer {
        origin: StdInstant,
        start: StdInstant,
        duration_ms: u32,
        started: bool,
    }

    impl SysTimer {
        pub fn new() -> SysTimer {
            SysTimer {
                origin: StdInstant::now(),
                start: StdInstant::now(),
                duration_ms: 0,
                started: false,
            }
        }
    }

    impl Timer<1000> for SysTimer {
        type Error = &'static str;

        fn now(&mut self) -> TimerInstantU32<1000> {
            let milliseconds = self.origin.elapsed().as_millis();
            TimerInstantU32::from_ticks(milliseconds as u32)
        }

        fn start(&mut self, duration: TimerDurationU32<1000>) -> Result<(), Self::Error> {
            self.start = StdInstant::now();
            self.duration_ms = duration.ticks();
            self.started = true;
            Ok(())
        }

        fn cancel(&mut self) -> Result<(), Self::Error> {
            if !self.started {
                return Err("cannot cancel stopped timer");
            }

            self.started = false;
            Ok(())
        }

        fn wait(&mut self) -> nb::Result<(), Self::Error> {
            if self.start.elapsed().as_millis() > self.duration_ms.into() {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        }
    }
}
