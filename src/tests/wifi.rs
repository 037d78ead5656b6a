use crate::tests::mock::{MockTimer, MockWifi};
use crate::wifi::{wait_for_connect_result, JoinState};

#[test]
fn test_wait_connected_immediately() {
    let mut wifi = MockWifi::new();
    wifi.expect_status().times(1).return_const(JoinState::Connected);

    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|duration| {
        assert_eq!(duration, MockTimer::duration_ms(15_000));
        Ok(())
    });

    let state = wait_for_connect_result(&mut wifi, &mut timer, MockTimer::duration_ms(15_000));
    assert_eq!(JoinState::Connected, state);
}

#[test]
fn test_wait_connected_after_polling() {
    let mut wifi = MockWifi::new();
    wifi.expect_status().times(2).return_const(JoinState::Disconnected);
    wifi.expect_status().times(1).return_const(JoinState::Connected);

    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|_| Ok(()));
    timer
        .expect_wait()
        .times(2)
        .returning(|| nb::Result::Err(nb::Error::WouldBlock));

    let state = wait_for_connect_result(&mut wifi, &mut timer, MockTimer::duration_ms(1_000));
    assert_eq!(JoinState::Connected, state);
}

#[test]
fn test_wait_failed() {
    let mut wifi = MockWifi::new();
    wifi.expect_status().times(1).return_const(JoinState::Disconnected);
    wifi.expect_status().times(1).return_const(JoinState::Failed);

    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|_| Ok(()));
    timer
        .expect_wait()
        .times(1)
        .returning(|| nb::Result::Err(nb::Error::WouldBlock));

    let state = wait_for_connect_result(&mut wifi, &mut timer, MockTimer::duration_ms(1_000));
    assert_eq!(JoinState::Failed, state);
}

#[test]
fn test_wait_timeout() {
    let mut wifi = MockWifi::new();
    wifi.expect_status().times(2).return_const(JoinState::Disconnected);

    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|_| Ok(()));
    timer
        .expect_wait()
        .times(1)
        .returning(|| nb::Result::Err(nb::Error::WouldBlock));
    timer.expect_wait().times(1).returning(|| nb::Result::Ok(()));

    let state = wait_for_connect_result(&mut wifi, &mut timer, MockTimer::duration_ms(1_000));
    assert_eq!(JoinState::Disconnected, state);
}

#[test]
fn test_wait_timer_start_error() {
    let mut wifi = MockWifi::new();
    wifi.expect_status().times(1).return_const(JoinState::Disconnected);

    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|_| Err(31));

    let state = wait_for_connect_result(&mut wifi, &mut timer, MockTimer::duration_ms(1_000));
    assert_eq!(JoinState::Disconnected, state);
}

#[test]
fn test_wait_timer_wait_error() {
    let mut wifi = MockWifi::new();
    wifi.expect_status().times(1).return_const(JoinState::Disconnected);

    let mut timer = MockTimer::new();
    timer.expect_start().times(1).returning(|_| Ok(()));
    timer
        .expect_wait()
        .times(1)
        .returning(|| nb::Result::Err(nb::Error::Other(1)));

    let state = wait_for_connect_result(&mut wifi, &mut timer, MockTimer::duration_ms(1_000));
    assert_eq!(JoinState::Disconnected, state);
}
