use core::cell::RefCell;
use core::convert::Infallible;
use std::{
    future::Future,
    pin::pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use ddr_core::utils::{
    connection::server::SessionManager,
    controllers::{
        command, dispatch, driver::DriverError, DriveCommand, HBridge, MotorDriver, SystemCommand,
        SystemController, Tb6612, Wheel, DRIVE_CHANNEL,
    },
    math::kinematics::{Direction, VelocityCommand, WheelCommand, DUTY_MAX},
    ddm, Duration, Instant,
};
use ddr_core::utils::controllers::DriveConfig;
use embedded_hal::{
    digital::{ErrorKind, ErrorType, OutputPin, StatefulOutputPin},
    pwm::SetDutyCycle,
};
use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction as PinTrans};

/// Poll a future to completion with a no-op waker.
fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let mut cx = Context::from_waker(Waker::noop());
    loop {
        if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
            return out;
        }
    }
}

/// PWM channel that records every duty written to it.
struct RecordingPwm(Rc<RefCell<Vec<u16>>>);

impl embedded_hal::pwm::ErrorType for RecordingPwm {
    type Error = Infallible;
}

impl SetDutyCycle for RecordingPwm {
    fn max_duty_cycle(&self) -> u16 {
        DUTY_MAX
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        self.0.borrow_mut().push(duty);
        Ok(())
    }
}

/// Board LED stand-in.
#[derive(Default)]
struct Led(bool);

impl ErrorType for Led {
    type Error = Infallible;
}

impl OutputPin for Led {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0 = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0 = true;
        Ok(())
    }
}

impl StatefulOutputPin for Led {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0)
    }
}

/// Output pin whose every write fails.
struct BrokenPin;

impl ErrorType for BrokenPin {
    type Error = ErrorKind;
}

impl OutputPin for BrokenPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Err(ErrorKind::Other)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Err(ErrorKind::Other)
    }
}

/// Motor driver that records what the controller asked for.
#[derive(Default)]
struct FakeDriver {
    enabled: bool,
    fail: bool,
    fail_disable: bool,
    applied: Vec<(Wheel, WheelCommand)>,
}

#[derive(Debug)]
struct FakeFault;

impl MotorDriver for FakeDriver {
    type Error = FakeFault;

    fn enable(&mut self) -> Result<(), Self::Error> {
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Self::Error> {
        if self.fail_disable {
            return Err(FakeFault);
        }
        self.enabled = false;
        Ok(())
    }

    fn apply(
        &mut self,
        wheel: Wheel,
        command: WheelCommand,
    ) -> Result<(), Self::Error> {
        if self.fail {
            return Err(FakeFault);
        }
        self.applied.push((wheel, command));
        Ok(())
    }
}

fn controller(config: Option<DriveConfig>) -> SystemController<FakeDriver, Led> {
    let mut ctrl = SystemController::new(FakeDriver::default(), Led::default(), config);
    ctrl.init().unwrap();
    ctrl
}

fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

const FULL_FORWARD: WheelCommand = WheelCommand {
    direction: Direction::Forward,
    duty: DUTY_MAX,
};
const FULL_BACKWARD: WheelCommand = WheelCommand {
    direction: Direction::Backward,
    duty: DUTY_MAX,
};

#[test]
fn test_tb6612_pin_sequence() {
    let l_in1 = PinMock::new(&[PinTrans::set(PinState::High), PinTrans::set(PinState::Low)]);
    let l_in2 = PinMock::new(&[PinTrans::set(PinState::Low), PinTrans::set(PinState::Low)]);
    let r_in1 = PinMock::new(&[PinTrans::set(PinState::Low), PinTrans::set(PinState::Low)]);
    let r_in2 = PinMock::new(&[PinTrans::set(PinState::High), PinTrans::set(PinState::Low)]);
    let stby = PinMock::new(&[PinTrans::set(PinState::High), PinTrans::set(PinState::Low)]);
    let left_duty = Rc::new(RefCell::new(Vec::new()));
    let right_duty = Rc::new(RefCell::new(Vec::new()));

    let mut tb = Tb6612::new(
        HBridge::new(RecordingPwm(left_duty.clone()), l_in1.clone(), l_in2.clone()),
        HBridge::new(RecordingPwm(right_duty.clone()), r_in1.clone(), r_in2.clone()),
        stby.clone(),
    );

    tb.enable().unwrap();
    tb.apply(Wheel::Left, FULL_FORWARD).unwrap();
    tb.apply(
        Wheel::Right,
        WheelCommand {
            direction: Direction::Backward,
            duty: 1000,
        },
    )
    .unwrap();
    tb.disable().unwrap();

    assert_eq!(*left_duty.borrow(), [DUTY_MAX, 0]);
    assert_eq!(*right_duty.borrow(), [1000, 0]);

    for mut pin in [l_in1, l_in2, r_in1, r_in2, stby] {
        pin.done();
    }
}

#[test]
fn test_tb6612_propagates_pin_errors() {
    let duty = Rc::new(RefCell::new(Vec::new()));
    let mut tb = Tb6612::new(
        HBridge::new(RecordingPwm(duty.clone()), BrokenPin, BrokenPin),
        HBridge::new(RecordingPwm(duty.clone()), BrokenPin, BrokenPin),
        BrokenPin,
    );

    assert!(matches!(tb.enable(), Err(DriverError::Pin(ErrorKind::Other))));
    assert!(matches!(
        tb.apply(Wheel::Left, FULL_FORWARD),
        Err(DriverError::Pin(ErrorKind::Other))
    ));
    // the duty is never written when the direction pins fail
    assert!(duty.borrow().is_empty());
}

#[test]
fn test_scenarios_through_controller() {
    let mut ctrl = controller(None);
    assert!(ctrl.is_enabled());

    ctrl.update_velocity(VelocityCommand::new(1.0, 0.0), at(0));
    assert_eq!(ctrl.tick(at(100)).unwrap(), (FULL_FORWARD, FULL_FORWARD));

    ctrl.update_velocity(VelocityCommand::new(0.0, 1.0), at(150));
    assert_eq!(ctrl.tick(at(200)).unwrap(), (FULL_BACKWARD, FULL_FORWARD));

    ctrl.update_velocity(VelocityCommand::ZERO, at(250));
    assert_eq!(
        ctrl.tick(at(300)).unwrap(),
        (WheelCommand::STOP, WheelCommand::STOP)
    );

    let applied = &ctrl.driver().applied;
    // init writes STOP to both wheels first, then each tick writes left then right
    assert_eq!(applied.len(), 8);
    assert_eq!(applied[2], (Wheel::Left, FULL_FORWARD));
    assert_eq!(applied[5], (Wheel::Right, FULL_FORWARD));
    assert_eq!(applied[4], (Wheel::Left, FULL_BACKWARD));
}

#[test]
fn test_tick_matches_mixer() {
    let mixer = ddm::new(None);
    let mut ctrl = controller(None);
    let samples = [(0.3, 0.1), (-0.7, 0.2), (0.02, -0.01), (1.0, -1.0), (-0.5, -0.5)];
    for (i, &(linear, angular)) in samples.iter().enumerate() {
        let now = at(i as u64 * 100);
        ctrl.update_velocity(VelocityCommand::new(linear, angular), now);
        assert_eq!(
            ctrl.tick(now).unwrap(),
            mixer.compute_wheel_commands(linear, angular)
        );
    }
}

#[test]
fn test_heartbeat_toggles_every_tick() {
    let mut ctrl = controller(None);
    for i in 0..3 {
        ctrl.tick(at(i * 100)).unwrap();
    }
    assert_eq!(ctrl.heartbeat().beats(), 3);
}

#[test]
fn test_disable_zeroes_output_and_skips_driver() {
    let mut ctrl = controller(None);
    ctrl.update_velocity(VelocityCommand::new(0.8, 0.0), at(0));
    ctrl.handle(DriveCommand::Disable).unwrap();
    assert!(!ctrl.is_enabled());
    assert!(!ctrl.driver().enabled);

    let writes = ctrl.driver().applied.len();
    assert_eq!(
        ctrl.tick(at(100)).unwrap(),
        (WheelCommand::STOP, WheelCommand::STOP)
    );
    assert_eq!(ctrl.driver().applied.len(), writes);

    // the stored velocity was cleared, so re-enabling does not lurch
    ctrl.handle(DriveCommand::Enable).unwrap();
    assert_eq!(
        ctrl.tick(at(200)).unwrap(),
        (WheelCommand::STOP, WheelCommand::STOP)
    );
}

#[test]
fn test_stop_command_clears_velocity() {
    let mut ctrl = controller(None);
    ctrl.update_velocity(VelocityCommand::new(0.5, 0.5), at(0));
    ctrl.handle(DriveCommand::Stop).unwrap();
    assert!(ctrl.is_enabled());
    assert_eq!(
        ctrl.tick(at(100)).unwrap(),
        (WheelCommand::STOP, WheelCommand::STOP)
    );
}

#[test]
fn test_last_command_held_without_timeout() {
    let mut ctrl = controller(None);
    ctrl.update_velocity(VelocityCommand::new(1.0, 0.0), at(0));
    assert_eq!(ctrl.tick(at(600_000)).unwrap(), (FULL_FORWARD, FULL_FORWARD));
}

#[test]
fn test_command_timeout_stops_robot() {
    let mut ctrl = controller(Some(DriveConfig {
        command_timeout: Some(Duration::from_millis(500)),
        ..Default::default()
    }));
    ctrl.update_velocity(VelocityCommand::new(1.0, 0.0), at(1_000));
    assert_eq!(ctrl.tick(at(1_400)).unwrap(), (FULL_FORWARD, FULL_FORWARD));
    assert_eq!(
        ctrl.tick(at(1_600)).unwrap(),
        (WheelCommand::STOP, WheelCommand::STOP)
    );

    ctrl.update_velocity(VelocityCommand::new(1.0, 0.0), at(1_700));
    assert_eq!(ctrl.tick(at(1_800)).unwrap(), (FULL_FORWARD, FULL_FORWARD));
}

#[test]
fn test_driver_fault_is_reported_but_heartbeat_runs() {
    let mut failing = SystemController::new(
        FakeDriver {
            fail: true,
            ..Default::default()
        },
        Led::default(),
        None,
    );
    assert!(failing.init().is_err());
    assert!(failing.tick(at(0)).is_ok(), "disabled controller does not touch the driver");
    failing.handle(DriveCommand::Enable).unwrap();
    assert!(failing.tick(at(100)).is_err());
    assert_eq!(failing.heartbeat().beats(), 2);
}

#[test]
fn test_failed_standby_keeps_driving_stop() {
    let mut ctrl = SystemController::new(
        FakeDriver {
            fail_disable: true,
            ..Default::default()
        },
        Led::default(),
        None,
    );
    ctrl.init().unwrap();
    ctrl.update_velocity(VelocityCommand::new(1.0, 0.0), at(0));
    assert_eq!(ctrl.tick(at(0)).unwrap(), (FULL_FORWARD, FULL_FORWARD));

    assert!(ctrl.handle(DriveCommand::Disable).is_err());
    assert!(ctrl.is_enabled());

    let writes = ctrl.driver().applied.len();
    assert_eq!(
        ctrl.tick(at(100)).unwrap(),
        (WheelCommand::STOP, WheelCommand::STOP)
    );
    assert_eq!(ctrl.driver().applied.len(), writes + 2);
    assert_eq!(
        ctrl.driver().applied.last(),
        Some(&(Wheel::Right, WheelCommand::STOP))
    );
}

/// Everything that goes through the global signal and channel lives in one
/// test so parallel tests cannot steal each other's commands.
#[test]
fn test_command_handoff() {
    // last write wins
    command::update(VelocityCommand::new(0.1, 0.0));
    command::update(VelocityCommand::new(0.2, 0.0));
    command::update(VelocityCommand::new(0.3, -0.1));
    assert_eq!(command::take(), Some(VelocityCommand::new(0.3, -0.1)));
    assert_eq!(command::take(), None);

    // dispatch routes velocities to the signal and management commands to the channel
    block_on(dispatch(SystemCommand::V(VelocityCommand::new(0.0, 1.0))));
    block_on(dispatch(SystemCommand::D(DriveCommand::Disable)));

    let mut ctrl = controller(None);
    ctrl.poll(at(0));
    assert!(!ctrl.is_enabled());
    assert_eq!(
        ctrl.tick(at(0)).unwrap(),
        (WheelCommand::STOP, WheelCommand::STOP)
    );

    // a velocity sent before Disable does not come back on Enable
    block_on(dispatch(SystemCommand::D(DriveCommand::Enable)));
    ctrl.poll(at(50));
    assert!(ctrl.is_enabled());
    assert_eq!(
        ctrl.tick(at(100)).unwrap(),
        (WheelCommand::STOP, WheelCommand::STOP)
    );

    block_on(dispatch(SystemCommand::V(VelocityCommand::new(0.0, 1.0))));
    ctrl.poll(at(110));
    assert_eq!(ctrl.tick(at(120)).unwrap(), (FULL_BACKWARD, FULL_FORWARD));

    // Stop is a zero velocity and overrides whatever was pending
    block_on(dispatch(SystemCommand::V(VelocityCommand::new(1.0, 0.0))));
    block_on(dispatch(SystemCommand::D(DriveCommand::Stop)));
    ctrl.poll(at(150));
    assert_eq!(
        ctrl.tick(at(200)).unwrap(),
        (WheelCommand::STOP, WheelCommand::STOP)
    );
    assert!(DRIVE_CHANNEL.is_empty());
}

#[test]
fn test_session_manager() {
    block_on(async {
        SessionManager::create_session("alpha".into(), 10).await;
        SessionManager::create_session("beta".into(), 20).await;

        assert!(SessionManager::record_command("alpha", 400).await);
        assert!(!SessionManager::record_command("missing", 400).await);

        let alpha = SessionManager::get_session("alpha").await.unwrap();
        assert_eq!(alpha.last_seen, 400);
        assert_eq!(alpha.commands, 1);

        SessionManager::purge_stale_sessions(100).await;
        let sessions = SessionManager::list_sessions().await;
        assert!(sessions.contains(&"alpha".to_string()));
        assert!(!sessions.contains(&"beta".to_string()));

        assert!(SessionManager::remove_session("alpha").await);
        assert!(!SessionManager::remove_session("alpha").await);
    });
}
