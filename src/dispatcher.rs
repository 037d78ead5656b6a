//! Execution of AT command lines
use crate::commands::{Command, JoinRequest, JOIN_PREFIX};
use crate::diagnostics::DiagnosticsServer;
use crate::gateway::{Error, Gateway};
use crate::responses::{access_point_info, Response};
use crate::stack::ServerStack;
use crate::storage::{Credentials, DurableStorage, ScratchStorage};
use crate::wifi::{wait_for_connect_result, JoinState, WifiStation};
use embedded_io::{Read, ReadReady, Write};
use fugit::TimerDurationU32;
use fugit_timer::Timer;
use log::{debug, info, warn};

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
    /// Records the line in the history, executes it and sends the response.
    /// Empty lines are ignored.
    pub(crate) fn process_line(&mut self, line: &[u8]) -> Result<(), Error> {
        if line.is_empty() {
            return Ok(());
        }

        self.history.push(line);
        if line.starts_with(JOIN_PREFIX) {
            self.history.redact_latest(JoinRequest::password_offset(line));
        }

        let response = match Command::parse(line) {
            Ok(command) => self.execute(command)?,
            Err(error) => {
                debug!("Rejected command line: {:?}", error);
                Response::Error
            }
        };

        self.respond(response)
    }

    fn execute(&mut self, command: Command) -> Result<Response, Error> {
        let response = match command {
            Command::Test | Command::StationMode | Command::MultipleConnections | Command::StationAddress => {
                Response::Ok
            }
            Command::Restart => {
                self.table.stop_listener();
                self.send_mode.reset();
                Response::Restarted
            }
            Command::QueryAccessPoint => {
                if self.wifi.status() != JoinState::Connected {
                    return Ok(Response::NoAccessPoint);
                }

                self.write(&access_point_info(&self.credentials.ssid))?;
                Response::Ok
            }
            Command::JoinAccessPoint(request) => self.join(request),
            Command::StopServer => {
                self.table.stop_listener();
                Response::Ok
            }
            Command::StartServer(port) => self.start_server(port),
            Command::Close(link_id) => {
                if self.table.close(link_id).is_err() {
                    return Ok(Response::LinkNotActive);
                }

                self.link_closed(link_id)?;
                Response::Ok
            }
            Command::Send { link_id, length } => self.start_send(link_id, length),
        };

        Ok(response)
    }

    /// Stores changed credentials, (re)starts joining and waits for the result
    fn join(&mut self, request: JoinRequest) -> Response {
        if self.credentials.ssid != request.ssid || self.credentials.password != request.password {
            self.credentials = Credentials::new(request.ssid, request.password);

            if let Err(error) = self.credentials.store(&mut self.durable) {
                warn!("Storing credentials failed: {:?}", error);
            }

            if let Err(error) = self.wifi.disconnect() {
                debug!("Leaving network failed: {:?}", error);
            }

            if let Err(error) = self.wifi.begin(&self.credentials.ssid, &self.credentials.password) {
                warn!("Starting join failed: {:?}", error);
            }
        }

        let timeout = TimerDurationU32::<TIMER_HZ>::millis(self.config.join_timeout_ms);
        match wait_for_connect_result(&mut self.wifi, &mut self.timer, timeout) {
            JoinState::Connected => {
                info!("Joined network");
                Response::Ok
            }
            state => {
                info!("Joining network failed: {:?}", state);
                Response::JoinFailed
            }
        }
    }

    fn start_server(&mut self, port: u16) -> Response {
        if port == self.config.diagnostics_port {
            debug!("Port {} is reserved for diagnostics", port);
            return Response::Error;
        }

        match self.table.start_listener(port) {
            Ok(_) => Response::Ok,
            Err(error) => {
                debug!("Starting server failed: {:?}", error);
                Response::Error
            }
        }
    }

    fn start_send(&mut self, link_id: usize, length: usize) -> Response {
        if !self.table.is_connected(link_id) {
            return Response::SendLinkNotActive;
        }

        match self.send_mode.arm(link_id, length) {
            Ok(_) => Response::Prompt,
            Err(_) => Response::TooLong,
        }
    }
}
