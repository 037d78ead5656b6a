//! # Reset durable state
//!
//! Two independent records with different durability:
//!
//! * [Credentials]: WIFI network name and password, kept in durable storage (EEPROM/flash). Survives
//!   power loss.
//! * [ListenerPort]: port of the active TCP listener, kept in scratch memory (e.g. RTC user memory).
//!   Survives a warm reset, but not power loss.
//!
//! Both records are self describing by checksum (and magic), so garbage left in memory is detected
//! and treated as absent data.
use core::fmt::Debug;
use heapless::Vec;
use log::warn;

/// Max. length of a WIFI network name in bytes
pub const MAX_SSID_LENGTH: usize = 32;

/// Max. length of a WIFI password in bytes
pub const MAX_PASSWORD_LENGTH: usize = 63;

/// Magic added to the credentials checksum
const CREDENTIALS_MAGIC: u16 = 14337;

/// Size of the NUL padded password field
const PASSWORD_FIELD: usize = MAX_PASSWORD_LENGTH + 1;

/// Size of the NUL padded network name field
const SSID_FIELD: usize = MAX_SSID_LENGTH + 1;

/// Storage surviving power loss, e.g. emulated EEPROM
pub trait DurableStorage {
    type Error: Debug;

    /// Reads `buffer.len()` bytes from the start of the storage
    fn read(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes the data to the start of the storage
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Persists all previous writes
    fn commit(&mut self) -> Result<(), Self::Error>;
}

/// Storage surviving a warm reset only, e.g. RTC user memory
pub trait ScratchStorage {
    type Error: Debug;

    /// Reads `buffer.len()` bytes from the start of the storage
    fn read(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes the data to the start of the storage
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}

/// WIFI join credentials
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Network name
    pub ssid: Vec<u8, MAX_SSID_LENGTH>,

    /// Password/key
    pub password: Vec<u8, MAX_PASSWORD_LENGTH>,
}

impl Credentials {
    /// Encoded record size: checksum (2) + password field (64) + network name field (33)
    pub const SIZE: usize = 2 + PASSWORD_FIELD + SSID_FIELD;

    pub fn new(ssid: Vec<u8, MAX_SSID_LENGTH>, password: Vec<u8, MAX_PASSWORD_LENGTH>) -> Self {
        Self { ssid, password }
    }

    /// Returns true if no network name is configured
    pub fn is_empty(&self) -> bool {
        self.ssid.is_empty()
    }

    /// Encodes the record including checksum
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut record = [0x0; Self::SIZE];
        record[2..2 + self.password.len()].copy_from_slice(&self.password);

        let ssid_start = 2 + PASSWORD_FIELD;
        record[ssid_start..ssid_start + self.ssid.len()].copy_from_slice(&self.ssid);

        let checksum = Self::checksum(&record[2..]);
        record[..2].copy_from_slice(&checksum.to_le_bytes());
        record
    }

    /// Decodes a record. Returns None if checksum does not match or a field is not terminated.
    pub fn decode(record: &[u8; Self::SIZE]) -> Option<Self> {
        let stored = u16::from_le_bytes([record[0], record[1]]);
        if stored != Self::checksum(&record[2..]) {
            return None;
        }

        let (password, ssid) = record[2..].split_at(PASSWORD_FIELD);

        Some(Self {
            ssid: Vec::from_slice(terminated(ssid)?).ok()?,
            password: Vec::from_slice(terminated(password)?).ok()?,
        })
    }

    /// Loads the credentials. Missing or corrupted data results in empty credentials.
    pub fn load<S: DurableStorage>(storage: &mut S) -> Self {
        let mut record = [0x0; Self::SIZE];

        if let Err(error) = storage.read(&mut record) {
            warn!("Reading credentials failed: {:?}", error);
            return Self::default();
        }

        Self::decode(&record).unwrap_or_default()
    }

    /// Writes and commits the credentials
    pub fn store<S: DurableStorage>(&self, storage: &mut S) -> Result<(), S::Error> {
        storage.write(&self.encode())?;
        storage.commit()
    }

    /// Sum of all field bytes + magic
    fn checksum(fields: &[u8]) -> u16 {
        fields
            .iter()
            .fold(CREDENTIALS_MAGIC, |sum, byte| sum.wrapping_add(*byte as u16))
    }
}

/// Returns the field content up to the first NUL byte. None if not terminated.
fn terminated(field: &[u8]) -> Option<&[u8]> {
    let end = field.iter().position(|byte| *byte == 0x0)?;
    Some(&field[..end])
}

/// Port of the active TCP listener, restored after a warm reset
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerPort {
    /// Raw value, zero means that no listener is active
    value: i32,
}

impl ListenerPort {
    /// Encoded record size: magic (3) + checksum (1) + value (4)
    pub const SIZE: usize = 8;

    /// Record magic
    const MAGIC: [u8; 3] = *b"RUM";

    /// Creates a record for an active listener
    pub fn new(port: u16) -> Self {
        Self { value: port as i32 }
    }

    /// Creates a record signaling that no listener is active
    pub fn none() -> Self {
        Self { value: 0 }
    }

    /// Returns the listener port if the value is a valid, non-zero port
    pub fn port(&self) -> Option<u16> {
        match u16::try_from(self.value) {
            Ok(0) | Err(_) => None,
            Ok(port) => Some(port),
        }
    }

    /// Encodes the record including magic and checksum
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let value = self.value.to_le_bytes();

        let mut record = [0x0; Self::SIZE];
        record[..3].copy_from_slice(&Self::MAGIC);
        record[3] = Self::checksum(&value);
        record[4..].copy_from_slice(&value);
        record
    }

    /// Decodes a record. Returns None if magic or checksum does not match.
    pub fn decode(record: &[u8; Self::SIZE]) -> Option<Self> {
        if record[..3] != Self::MAGIC {
            return None;
        }

        let value = [record[4], record[5], record[6], record[7]];
        if record[3] != Self::checksum(&value) {
            return None;
        }

        Some(Self {
            value: i32::from_le_bytes(value),
        })
    }

    /// Loads the record. Returns None in case of missing or corrupted data.
    pub fn load<S: ScratchStorage>(storage: &mut S) -> Option<Self> {
        let mut record = [0x0; Self::SIZE];

        if let Err(error) = storage.read(&mut record) {
            warn!("Reading listener port failed: {:?}", error);
            return None;
        }

        Self::decode(&record)
    }

    /// Writes the record
    pub fn store<S: ScratchStorage>(&self, storage: &mut S) -> Result<(), S::Error> {
        storage.write(&self.encode())
    }

    fn checksum(value: &[u8; 4]) -> u8 {
        value.iter().fold(0, |sum, byte| sum.wrapping_add(*byte))
    }
}
