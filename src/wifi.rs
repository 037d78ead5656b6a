//! # WIFI station
//!
//! The radio and the join procedure are provided by the platform. The gateway just starts a join and
//! waits (bounded) for the result.
use core::fmt::Debug;
use fugit::TimerDurationU32;
use fugit_timer::Timer;
use log::warn;

/// Network join service of the platform
pub trait WifiStation {
    type Error: Debug;

    /// Starts joining the given network. Returns immediately, the result is reported by [WifiStation::status].
    fn begin(&mut self, ssid: &[u8], password: &[u8]) -> Result<(), Self::Error>;

    /// Leaves the current network
    fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Returns the current join state
    fn status(&mut self) -> JoinState;

    /// Signal strength of the current network in dBm
    fn rssi(&mut self) -> i32;
}

/// Current WIFI connection state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JoinState {
    /// Joined and an IP was assigned
    Connected,

    /// Not joined (yet), join may still be in progress
    Disconnected,

    /// Join failed, e.g. network not found or wrong password
    Failed,
}

/// Waits until the join service reports a final state or the timeout expires.
/// Returns the last observed state.
pub(crate) fn wait_for_connect_result<W: WifiStation, T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(
    wifi: &mut W,
    timer: &mut T,
    timeout: TimerDurationU32<TIMER_HZ>,
) -> JoinState {
    if let Err(error) = timer.start(timeout) {
        warn!("Starting join timer failed: {:?}", error);
        return wifi.status();
    }

    loop {
        let state = wifi.status();
        if state != JoinState::Disconnected {
            return state;
        }

        match timer.wait() {
            Ok(_) => return state,
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(error)) => {
                warn!("Join timer failed: {:?}", error);
                return state;
            }
        }
    }
}
