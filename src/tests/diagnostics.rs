use crate::diagnostics::{ResetCause, Status, Uptime, STATUS_PAGE_SIZE};
use crate::responses::{access_point_info, data_header, LinkEvent, Response};
use fugit::TimerInstantU32;

#[test]
fn test_uptime_overflow() {
    let mut uptime: Uptime<1_000> = Uptime::default();

    uptime.update(TimerInstantU32::from_ticks(u32::MAX - 999));
    assert_eq!(4_294_966, uptime.seconds());

    uptime.update(TimerInstantU32::from_ticks(1_000));
    assert_eq!(4_294_968, uptime.seconds());

    uptime.update(TimerInstantU32::from_ticks(2_000));
    assert_eq!(4_294_969, uptime.seconds());
}

#[test]
fn test_reset_cause_names() {
    assert_eq!("Power on", ResetCause::default().as_str());
    assert_eq!("Hardware Watchdog", ResetCause::HardwareWatchdog.as_str());
    assert_eq!("Software/System restart", ResetCause::Software.as_str());
    assert_eq!("Deep-Sleep Wake", ResetCause::DeepSleepWake.as_str());
}

#[test]
fn test_status_page_truncated() {
    let line = [b'x'; 127];
    let lines = [&line[..]; 32];

    let page = Status {
        device_name: "bridge",
        history: lines.iter().copied(),
        connections: 0,
        listening_port: None,
        rssi: 0,
        uptime: 0,
        reset_cause: ResetCause::PowerOn,
    }
    .render();

    assert_eq!(STATUS_PAGE_SIZE, page.len());
    assert!(page.starts_with(b"bridge\n\nAT history:\n> xxx"));
}

#[test]
fn test_link_events() {
    assert_eq!(b"0,CONNECT\r\n", LinkEvent::Connected(0).encode().as_slice());
    assert_eq!(b"15,CLOSED\r\n", LinkEvent::Closed(15).encode().as_slice());
}

#[test]
fn test_data_header() {
    assert_eq!(b"+IPD,3,2048:", data_header(3, 2048).as_slice());
}

#[test]
fn test_access_point_info() {
    assert_eq!(b"+CWJAP:\"my\\,net\"\r\n", access_point_info(b"my,net").as_slice());

    // Escaping doubles the length of a max. length name
    let info = access_point_info(&[b'"'; 32]);
    assert_eq!(8 + 64 + 3, info.len());
}

#[test]
fn test_response_frames() {
    assert_eq!(b"\r\nOK\r\n", Response::Ok.as_bytes());
    assert_eq!(b"> ", Response::Prompt.as_bytes());
    assert_eq!(b"\r\nSEND OK\r\n", Response::SendOk.as_bytes());
    assert_eq!(b"\r\nOK\r\n\r\nready\r\n", Response::Restarted.as_bytes());
    assert_eq!(b"link is not\r\n\r\nERROR\r\n", Response::LinkNotActive.as_bytes());
    assert_eq!(b"link is not\r\n", Response::SendLinkNotActive.as_bytes());
    assert_eq!(b"too long\r\n", Response::TooLong.as_bytes());
}
