//! Wire format of responses and notifications sent to the host
use heapless::Vec;
use numtoa::NumToA;

/// Sent once after boot
pub(crate) const READY: &[u8] = b"\r\nready\r\n";

/// Terminal response of a command line
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Command succeeded
    Ok,

    /// Command failed or is not supported
    Error,

    /// Connections were closed and listener stopped by `AT+RST`
    Restarted,

    /// `AT+CIPCLOSE` on a link which is not connected
    LinkNotActive,

    /// `AT+CIPSEND` to a link which is not connected. No final result line follows.
    SendLinkNotActive,

    /// Requested payload length exceeds the send buffer. No final result line follows.
    TooLong,

    /// `AT+CWJAP?` while not joined
    NoAccessPoint,

    /// Joining the access point failed or timed out
    JoinFailed,

    /// Ready to receive the payload of `AT+CIPSEND`
    Prompt,

    /// Payload was written to the link
    SendOk,

    /// Writing the payload to the link failed
    SendFail,
}

impl Response {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Response::Ok => b"\r\nOK\r\n",
            Response::Error => b"\r\nERROR\r\n",
            Response::Restarted => b"\r\nOK\r\n\r\nready\r\n",
            Response::LinkNotActive => b"link is not\r\n\r\nERROR\r\n",
            Response::SendLinkNotActive => b"link is not\r\n",
            Response::TooLong => b"too long\r\n",
            Response::NoAccessPoint => b"No AP\r\n\r\nERROR\r\n",
            Response::JoinFailed => b"+CWJAP:1\r\n\r\nFAIL\r\n",
            Response::Prompt => b"> ",
            Response::SendOk => b"\r\nSEND OK\r\n",
            Response::SendFail => b"\r\nSEND FAIL\r\n",
        }
    }
}

/// Notification of a link state change
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// `<link_id>,CONNECT`
    Connected(usize),

    /// `<link_id>,CLOSED`
    Closed(usize),
}

impl LinkEvent {
    pub fn encode(&self) -> Vec<u8, 32> {
        let (link_id, suffix): (usize, &[u8]) = match self {
            LinkEvent::Connected(link_id) => (*link_id, b",CONNECT\r\n"),
            LinkEvent::Closed(link_id) => (*link_id, b",CLOSED\r\n"),
        };

        let mut frame = Vec::new();
        push(&mut frame, number(link_id, &mut [0x0; 20]));
        push(&mut frame, suffix);
        frame
    }
}

/// Header of received socket data: `+IPD,<link_id>,<length>:`
/// The raw data follows, terminated by `\r\nOK\r\n` ([DATA_TRAILER]).
pub(crate) fn data_header(link_id: usize, length: usize) -> Vec<u8, 48> {
    let mut frame = Vec::new();
    push(&mut frame, b"+IPD,");
    push(&mut frame, number(link_id, &mut [0x0; 20]));
    push(&mut frame, b",");
    push(&mut frame, number(length, &mut [0x0; 20]));
    push(&mut frame, b":");
    frame
}

/// Follows the raw data of `+IPD`
pub(crate) const DATA_TRAILER: &[u8] = b"\r\nOK\r\n";

/// Response line of `AT+CWJAP?`: `+CWJAP:"<escaped ssid>"`
pub(crate) fn access_point_info(ssid: &[u8]) -> Vec<u8, 80> {
    let mut frame = Vec::new();
    push(&mut frame, b"+CWJAP:\"");
    for byte in crate::commands::escape(ssid) {
        push(&mut frame, &[byte]);
    }
    push(&mut frame, b"\"\r\n");
    frame
}

fn number(value: usize, buffer: &mut [u8; 20]) -> &[u8] {
    value.numtoa(10, buffer)
}

/// Appends the data, frames are sized for their max. content
fn push<const N: usize>(frame: &mut Vec<u8, N>, data: &[u8]) {
    let _ = frame.extend_from_slice(data);
}
