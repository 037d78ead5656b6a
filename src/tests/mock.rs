use crate::diagnostics::{DiagnosticsRequest, DiagnosticsServer, UpdateCredentials};
use crate::gateway::{Config, Gateway, Peripherals};
use crate::stack::ServerStack;
use crate::storage::{DurableStorage, ScratchStorage};
use crate::wifi::{JoinState, WifiStation};
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;
use embedded_io::{ErrorType, Read, ReadReady, Write};
use core::net::SocketAddr;
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer as FugitTimer;
use mockall::mock;

pub type GatewayType = Gateway<
    MockSerial,
    MockStack,
    MockWifi,
    MockTimer,
    MockTimer,
    MemoryStorage,
    MemoryStorage,
    MockDiagnostics,
    1_000_000,
>;

/// Creates a gateway with echo disabled and fresh (empty) storage
pub fn gateway(wifi: MockWifi, timer: MockTimer) -> GatewayType {
    gateway_with(wifi, timer, MemoryStorage::default(), MemoryStorage::default(), Config::default().with_echo(false))
}

/// Creates a gateway with the given storage content and config. The uptime clock stands still at zero.
pub fn gateway_with(
    wifi: MockWifi,
    timer: MockTimer,
    durable: MemoryStorage,
    scratch: MemoryStorage,
    config: Config,
) -> GatewayType {
    let peripherals = Peripherals {
        serial: MockSerial::default(),
        stack: MockStack::default(),
        wifi,
        timer,
        clock: MockTimer::idle(),
        durable,
        scratch,
        diagnostics: MockDiagnostics::default(),
    };

    Gateway::new(peripherals, config)
}

/// Feeds the input, polls until it is consumed and returns the serial output
pub fn exchange(gateway: &mut GatewayType, input: &[u8]) -> String {
    gateway.serial.feed(input);
    while gateway.serial.pending_input() > 0 {
        gateway.poll().unwrap();
    }

    gateway.serial.take_output()
}

/// Wifi expecting a single join of the given network
pub fn joining_wifi(ssid: &'static [u8], password: &'static [u8], result: JoinState) -> MockWifi {
    let mut wifi = MockWifi::new();
    wifi.expect_disconnect().times(1).returning(|| Ok(()));
    wifi.expect_begin()
        .times(1)
        .withf(move |actual_ssid, actual_password| ssid == &actual_ssid[..] && password == &actual_password[..])
        .returning(|_, _| Ok(()));
    wifi.expect_status().return_const(result);
    wifi
}

/// Idle timer accepting any number of join timeouts
pub fn join_timer() -> MockTimer {
    let mut timer = MockTimer::idle();
    timer.expect_start().returning(|_| Ok(()));
    timer.expect_wait().returning(|| nb::Result::Ok(()));
    timer
}

/// Serial port mock, input is consumed by read(), written data is collected
#[derive(Default)]
pub struct MockSerial {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl MockSerial {
    /// Queues the data for reading
    pub fn feed(&mut self, data: &[u8]) {
        self.input.extend(data);
    }

    /// Returns and clears the written data
    pub fn take_output(&mut self) -> String {
        String::from_utf8(core::mem::take(&mut self.output)).unwrap()
    }

    /// Number of queued input bytes
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }
}

impl ErrorType for MockSerial {
    type Error = Infallible;
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let length = buf.len().min(self.input.len());
        for (target, byte) in buf.iter_mut().zip(self.input.drain(..length)) {
            *target = byte;
        }

        Ok(length)
    }
}

impl ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.input.is_empty())
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// State of a single mocked connection
#[derive(Default)]
pub struct MockConnection {
    /// Data sent by the remote peer
    pub inbound: VecDeque<u8>,

    /// Data written by the gateway, one entry per send() call
    pub writes: Vec<Vec<u8>>,

    /// False if the remote peer closed the connection
    pub connected: bool,

    /// True if the gateway closed the connection
    pub closed: bool,
}

/// TCP stack mock. Connection handles are indexes of `connections`.
#[derive(Default)]
pub struct MockStack {
    /// Port of the open listener
    pub listening: Option<u16>,

    /// Ports of all listen() calls
    pub listen_calls: Vec<u16>,

    /// Simulates an error of listen()
    pub listen_error: bool,

    /// Simulates an error of send()
    pub send_error: bool,

    /// Connections waiting to be accepted
    pub pending: VecDeque<usize>,

    pub connections: Vec<MockConnection>,
}

impl MockStack {
    /// Simulates a new remote peer and returns its connection handle
    pub fn connect_peer(&mut self) -> usize {
        self.connections.push(MockConnection {
            connected: true,
            ..MockConnection::default()
        });

        let handle = self.connections.len() - 1;
        self.pending.push_back(handle);
        handle
    }

    /// Simulates data sent by the remote peer
    pub fn peer_sends(&mut self, handle: usize, data: &[u8]) {
        self.connections[handle].inbound.extend(data);
    }

    /// Simulates the remote peer closing the connection
    pub fn peer_closes(&mut self, handle: usize) {
        self.connections[handle].connected = false;
    }
}

impl ServerStack for MockStack {
    type Listener = u16;
    type Connection = usize;
    type Error = u32;

    fn listen(&mut self, port: u16) -> Result<u16, u32> {
        self.listen_calls.push(port);

        if self.listen_error {
            return Err(98);
        }

        self.listening = Some(port);
        Ok(port)
    }

    fn accept(&mut self, _listener: &mut u16) -> nb::Result<(usize, SocketAddr), u32> {
        let Some(handle) = self.pending.pop_front() else {
            return Err(nb::Error::WouldBlock);
        };

        Ok((handle, SocketAddr::from(([10, 0, 0, 2], 50_000 + handle as u16))))
    }

    fn is_connected(&mut self, connection: &usize) -> bool {
        self.connections[*connection].connected
    }

    fn receive(&mut self, connection: &mut usize, buffer: &mut [u8]) -> nb::Result<usize, u32> {
        let inbound = &mut self.connections[*connection].inbound;
        if inbound.is_empty() {
            return Err(nb::Error::WouldBlock);
        }

        let length = buffer.len().min(inbound.len());
        for (target, byte) in buffer.iter_mut().zip(inbound.drain(..length)) {
            *target = byte;
        }

        Ok(length)
    }

    fn send(&mut self, connection: &mut usize, data: &[u8]) -> Result<usize, u32> {
        if self.send_error {
            return Err(104);
        }

        self.connections[*connection].writes.push(data.to_vec());
        Ok(data.len())
    }

    fn close(&mut self, connection: usize) {
        let connection = &mut self.connections[connection];
        connection.connected = false;
        connection.closed = true;
    }

    fn unlisten(&mut self, _listener: u16) {
        self.listening = None;
    }
}

/// In-memory storage, used as both durable and scratch storage
pub struct MemoryStorage {
    pub data: Vec<u8>,

    /// Number of commit() calls
    pub commits: usize,

    /// Number of write() calls
    pub writes: usize,

    /// Simulates read errors
    pub read_error: bool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::with_content(&[])
    }
}

impl MemoryStorage {
    /// Creates a storage of 512 bytes starting with the given content, rest filled with 0xFF
    pub fn with_content(content: &[u8]) -> Self {
        let mut data = vec![0xFF; 512];
        data[..content.len()].copy_from_slice(content);

        Self {
            data,
            commits: 0,
            writes: 0,
            read_error: false,
        }
    }

    fn read_into(&mut self, buffer: &mut [u8]) -> Result<(), u32> {
        if self.read_error {
            return Err(5);
        }

        buffer.copy_from_slice(&self.data[..buffer.len()]);
        Ok(())
    }

    fn write_from(&mut self, data: &[u8]) -> Result<(), u32> {
        self.data[..data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}

impl DurableStorage for MemoryStorage {
    type Error = u32;

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), u32> {
        self.read_into(buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), u32> {
        self.write_from(data)
    }

    fn commit(&mut self) -> Result<(), u32> {
        self.commits += 1;
        Ok(())
    }
}

impl ScratchStorage for MemoryStorage {
    type Error = u32;

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), u32> {
        self.read_into(buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), u32> {
        self.write_from(data)
    }
}

/// Diagnostics server mock
#[derive(Default)]
pub struct MockDiagnostics {
    /// Port and credentials passed to begin()
    pub started: Option<(u16, UpdateCredentials)>,

    /// Requests returned by poll()
    pub requests: VecDeque<DiagnosticsRequest>,

    /// Status, content type and body of all responses
    pub responses: Vec<(u16, String, String)>,
}

impl DiagnosticsServer for MockDiagnostics {
    type Error = u32;

    fn begin(&mut self, port: u16, update: &UpdateCredentials) -> Result<(), u32> {
        self.started = Some((port, *update));
        Ok(())
    }

    fn poll(&mut self) -> Option<DiagnosticsRequest> {
        self.requests.pop_front()
    }

    fn respond(&mut self, status: u16, content_type: &str, body: &[u8]) -> Result<(), u32> {
        self.responses
            .push((status, String::from(content_type), String::from_utf8(body.to_vec()).unwrap()));
        Ok(())
    }
}

mock! {
    pub Wifi {}

    impl WifiStation for Wifi {
        type Error = u32;

        fn begin(&mut self, ssid: &[u8], password: &[u8]) -> Result<(), u32>;
        fn disconnect(&mut self) -> Result<(), u32>;
        fn status(&mut self) -> JoinState;
        fn rssi(&mut self) -> i32;
    }
}

mock! {
    pub Timer{}

    impl FugitTimer<1_000_000> for Timer {
        type Error = u32;

        fn now(&mut self) -> TimerInstantU32<1000000>;
        fn start(&mut self, duration: TimerDurationU32<1000000>) -> Result<(), u32>;
        fn cancel(&mut self) -> Result<(), u32>;
        fn wait(&mut self) -> nb::Result<(), u32>;
    }
}

impl MockTimer {
    /// Timer whose clock stands still at zero
    pub fn idle() -> Self {
        Self::at_ticks(0)
    }

    /// Timer whose clock stands still at the given ticks
    pub fn at_ticks(ticks: u32) -> Self {
        let mut timer = Self::new();
        timer.expect_now().returning(move || TimerInstantU32::from_ticks(ticks));
        timer
    }

    /// Short hand helper for returning a milliseconds duration
    pub fn duration_ms(duration: u32) -> TimerDurationU32<1_000_000> {
        TimerDurationU32::millis(duration)
    }
}
