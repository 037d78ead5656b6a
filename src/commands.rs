//! # Supported AT commands
//!
//! Only the subset of the ESP-AT dialect which is needed for bridging TCP connections in server mode
//! is supported. Any other line is answered by `ERROR`.
//!
//! Integer arguments are parsed like C `scanf("%d,%d")`: leading whitespace and a sign are accepted
//! and any text following the last integer is ignored.
use crate::stack::CAPACITY;
use crate::storage::{MAX_PASSWORD_LENGTH, MAX_SSID_LENGTH};
use heapless::Vec;

/// Prefix of the access point join command
pub const JOIN_PREFIX: &[u8] = b"AT+CWJAP=";

/// Parsed AT command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `AT`
    Test,

    /// `AT+RST`
    Restart,

    /// `AT+CWMODE=1`
    StationMode,

    /// `AT+CIPMUX=1`
    MultipleConnections,

    /// `AT+CWJAP?`
    QueryAccessPoint,

    /// `AT+CWJAP="<ssid>","<password>"`
    JoinAccessPoint(JoinRequest),

    /// `AT+CIPSTA=...`. Static addresses are not supported, so the arguments are ignored.
    StationAddress,

    /// `AT+CIPSERVER=0`
    StopServer,

    /// `AT+CIPSERVER=1,<port>`
    StartServer(u16),

    /// `AT+CIPCLOSE=<link_id>`
    Close(usize),

    /// `AT+CIPSEND=<link_id>,<length>`
    Send {
        /// Target link
        link_id: usize,

        /// Number of payload bytes following the prompt
        length: usize,
    },
}

/// Reasons for rejecting a command line
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// Command is not supported
    Unknown,

    /// Arguments are missing or have invalid syntax
    Malformed,

    /// Numeric argument exceeds the valid range
    OutOfRange,
}

impl Command {
    /// Parses a single command line (without line terminator)
    pub fn parse(line: &[u8]) -> Result<Self, CommandError> {
        if line.contains(&0x0) {
            return Err(CommandError::Malformed);
        }

        match line {
            b"AT" => return Ok(Self::Test),
            b"AT+RST" => return Ok(Self::Restart),
            b"AT+CWMODE=1" => return Ok(Self::StationMode),
            b"AT+CIPMUX=1" => return Ok(Self::MultipleConnections),
            b"AT+CWJAP?" => return Ok(Self::QueryAccessPoint),
            _ => {}
        }

        if let Some(arguments) = arguments(line, JOIN_PREFIX) {
            return JoinRequest::parse(arguments).map(Self::JoinAccessPoint);
        }

        if arguments(line, b"AT+CIPSTA=").is_some() {
            return Ok(Self::StationAddress);
        }

        if let Some(arguments) = arguments(line, b"AT+CIPSERVER=") {
            return Self::parse_server(arguments);
        }

        if let Some(arguments) = arguments(line, b"AT+CIPCLOSE=") {
            let values = scan_integers::<1>(arguments);
            let link_id = *values.first().ok_or(CommandError::Malformed)?;
            return Ok(Self::Close(link_id_in_range(link_id)?));
        }

        if let Some(arguments) = arguments(line, b"AT+CIPSEND=") {
            let values = scan_integers::<2>(arguments);
            let [link_id, length] = values.as_slice() else {
                return Err(CommandError::Malformed);
            };

            return Ok(Self::Send {
                link_id: link_id_in_range(*link_id)?,
                length: match usize::try_from(*length) {
                    Ok(0) | Err(_) => return Err(CommandError::OutOfRange),
                    Ok(length) => length,
                },
            });
        }

        Err(CommandError::Unknown)
    }

    fn parse_server(arguments: &[u8]) -> Result<Self, CommandError> {
        match scan_integers::<2>(arguments).as_slice() {
            [0, ..] => Ok(Self::StopServer),
            [1, port] => match u16::try_from(*port) {
                Ok(0) | Err(_) => Err(CommandError::OutOfRange),
                Ok(port) => Ok(Self::StartServer(port)),
            },
            _ => Err(CommandError::Malformed),
        }
    }
}

/// Arguments of the `AT+CWJAP=` command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinRequest {
    /// Unescaped network name
    pub ssid: Vec<u8, MAX_SSID_LENGTH>,

    /// Unescaped password
    pub password: Vec<u8, MAX_PASSWORD_LENGTH>,
}

impl JoinRequest {
    /// Parses `"<ssid>","<password>"`. Text after the closing quote is ignored.
    pub fn parse(arguments: &[u8]) -> Result<Self, CommandError> {
        let (ssid, password_start) = Self::split_ssid(arguments).ok_or(CommandError::Malformed)?;
        let (password, _) = unquote(&arguments[password_start..]).ok_or(CommandError::Malformed)?;

        Ok(Self { ssid, password })
    }

    /// Returns the offset of the password within a full join command line.
    /// If the network name part is malformed, the offset right after the command prefix is returned.
    pub fn password_offset(line: &[u8]) -> usize {
        let arguments = &line[JOIN_PREFIX.len().min(line.len())..];

        match Self::split_ssid(arguments) {
            Some((_, start)) => JOIN_PREFIX.len() + start,
            None => JOIN_PREFIX.len(),
        }
    }

    /// Parses the quoted network name and returns it together with the start index of the password
    fn split_ssid(arguments: &[u8]) -> Option<(Vec<u8, MAX_SSID_LENGTH>, usize)> {
        let quoted = arguments.strip_prefix(b"\"")?;
        let (ssid, rest) = unquote(quoted)?;
        let password = rest.strip_prefix(b",\"")?;

        Some((ssid, arguments.len() - password.len()))
    }
}

/// Reads a backslash escaped string up to the closing quote.
/// Input starts after the opening quote. Returns the value and the remaining input after the closing quote.
fn unquote<const N: usize>(input: &[u8]) -> Option<(Vec<u8, N>, &[u8])> {
    let mut value = Vec::new();
    let mut index = 0;

    while index < input.len() && input[index] != b'"' && !value.is_full() {
        if input[index] == b'\\' {
            index += 1;
        }

        value.push(*input.get(index)?).ok()?;
        index += 1;
    }

    if input.get(index) != Some(&b'"') {
        return None;
    }

    Some((value, &input[index + 1..]))
}

/// Escapes `"`, `,` and `\` by a preceding backslash
pub fn escape(value: &[u8]) -> impl Iterator<Item = u8> + '_ {
    value.iter().flat_map(|byte| {
        let prefix = matches!(*byte, b'"' | b',' | b'\\').then_some(b'\\');
        prefix.into_iter().chain(core::iter::once(*byte))
    })
}

/// Returns the arguments following the given prefix. None if prefix does not match or no arguments are given.
fn arguments<'a>(line: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    line.strip_prefix(prefix).filter(|arguments| !arguments.is_empty())
}

fn link_id_in_range(link_id: i64) -> Result<usize, CommandError> {
    match usize::try_from(link_id) {
        Ok(link_id) if link_id < CAPACITY => Ok(link_id),
        _ => Err(CommandError::OutOfRange),
    }
}

/// Scans up to N comma separated integers. Stops at the first mismatch.
pub(crate) fn scan_integers<const N: usize>(input: &[u8]) -> Vec<i64, N> {
    let mut values = Vec::new();
    let mut rest = input;

    while !values.is_full() {
        if !values.is_empty() {
            match rest.strip_prefix(b",") {
                Some(next) => rest = next,
                None => break,
            }
        }

        match scan_integer(rest) {
            Some((value, next)) => {
                // Can not fail, as loop ends when full
                let _ = values.push(value);
                rest = next;
            }
            None => break,
        }
    }

    values
}

/// Parses a single decimal integer with optional leading whitespace and sign
fn scan_integer(input: &[u8]) -> Option<(i64, &[u8])> {
    let start = input.iter().position(|byte| !byte.is_ascii_whitespace())?;
    let mut rest = &input[start..];

    let negative = match rest.first() {
        Some(b'-') => true,
        Some(b'+') => false,
        _ => {
            return scan_digits(rest);
        }
    };

    rest = &rest[1..];
    let (value, rest) = scan_digits(rest)?;
    Some((if negative { -value } else { value }, rest))
}

fn scan_digits(input: &[u8]) -> Option<(i64, &[u8])> {
    let count = input.iter().take_while(|byte| byte.is_ascii_digit()).count();
    if count == 0 {
        return None;
    }

    let mut value: i64 = 0;
    for digit in &input[..count] {
        value = value.checked_mul(10)?.checked_add((digit - b'0') as i64)?;
    }

    Some((value, &input[count..]))
}
