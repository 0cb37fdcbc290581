mod sim;

use clap::Parser;
use ddr_core::utils::{
    controllers::{DriveConfig, HBridge, SystemController, Tb6612},
    math::kinematics::{MixerConfig, DEADBAND, DUTY_MAX, DUTY_MIN},
    wss, Duration,
};
use embassy_executor::{Executor, Spawner};
use embassy_net::{Config, Ipv4Address, Ipv4Cidr, Runner, StackResources};
use embassy_net_tuntap::TunTapDevice;
use heapless::Vec;
use rand_core::{OsRng, TryRngCore};
use sim::{LogPin, LogPwm};
use static_cell::StaticCell;
use tracing::{error, info};

type Driver = Tb6612<LogPwm, LogPin>;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// TAP device name
    #[clap(long, default_value = "tap0")]
    tap: String,
    /// use a static IP instead of DHCP
    #[clap(long)]
    static_ip: bool,
    /// WebSocket/HTTP port
    #[clap(long, default_value_t = 8000)]
    port: u16,
    /// control tick period in milliseconds
    #[clap(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    frame_ms: u64,
    /// inbound command poll period in milliseconds
    #[clap(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    poll_ms: u64,
    /// stop the wheels when no velocity arrives for this long
    #[clap(long)]
    timeout_ms: Option<u64>,
    /// wheel speeds below this magnitude are zeroed
    #[clap(long, default_value_t = DEADBAND)]
    deadband: f32,
    /// lowest duty that still turns the motor
    #[clap(long, default_value_t = DUTY_MIN)]
    duty_min: u16,
    /// full-scale duty
    #[clap(long, default_value_t = DUTY_MAX)]
    duty_max: u16,
}

impl Opts {
    fn drive_config(&self) -> DriveConfig {
        DriveConfig {
            frame: Duration::from_millis(self.frame_ms),
            poll: Duration::from_millis(self.poll_ms),
            command_timeout: self.timeout_ms.map(Duration::from_millis),
            mixer: MixerConfig {
                deadband: self.deadband,
                duty_min: self.duty_min,
                duty_max: self.duty_max,
            },
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, TunTapDevice>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn control_task(mut ctrl: SystemController<Driver, LogPin>) -> ! {
    ctrl.run().await
}

#[embassy_executor::task]
async fn main_task(spawner: Spawner, opts: Opts) {
    // TB6612 wired to logging pins
    let driver = Tb6612::new(
        HBridge::new(LogPwm::new("ENA"), LogPin::new("IN1"), LogPin::new("IN2")),
        HBridge::new(LogPwm::new("ENB"), LogPin::new("IN3"), LogPin::new("IN4")),
        LogPin::new("STBY"),
    );
    let mut ctrl = SystemController::new(driver, LogPin::quiet("LED"), Some(opts.drive_config()));
    if let Err(e) = ctrl.init() {
        error!("motor driver init failed: {:?}. Aborting.", e);
        return;
    }
    spawner.spawn(control_task(ctrl)).unwrap();

    // Initialize network
    let device = TunTapDevice::new(&opts.tap).unwrap();
    let config = if opts.static_ip {
        Config::ipv4_static(embassy_net::StaticConfigV4 {
            address: Ipv4Cidr::new(Ipv4Address::new(192, 168, 69, 2), 24),
            dns_servers: Vec::new(),
            gateway: Some(Ipv4Address::new(192, 168, 69, 1)),
        })
    } else {
        Config::dhcpv4(Default::default())
    };
    let mut seed_buf = [0; 8];
    OsRng.try_fill_bytes(&mut seed_buf).unwrap();
    let seed = u64::from_le_bytes(seed_buf);

    static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        device,
        config,
        RESOURCES.init(StackResources::<3>::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).unwrap();

    info!("Waiting for network link...");
    stack.wait_config_up().await;

    info!("Starting WebSocket server on port {}", opts.port);
    wss(0, opts.port, stack, None).await;
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opts: Opts = Opts::parse();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner, opts)).unwrap();
    });
}
