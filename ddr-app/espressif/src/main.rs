#![no_std]
#![no_main]
extern crate alloc;

// ESP-specific imports
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{
    clock::CpuClock,
    gpio::{Level, Output},
    ledc::{
        channel::{self, ChannelIFace},
        timer::{self, TimerIFace},
        LSGlobalClkSource, Ledc, LowSpeed,
    },
    rng::Rng,
    time::RateExtU32,
    timer::timg::TimerGroup,
};
use esp_wifi::{
    init,
    wifi::{WifiController, WifiDevice, WifiStaDevice},
    EspWifiController,
};
use log::LevelFilter;

// Internal Modules
use ddr_core::{
    mk_static,
    utils::{
        self,
        controllers::{HBridge, SystemController, Tb6612},
    },
};

// Constants for Wi-Fi credentials
const SSID: &str = env!("SSID");
const PASSWORD: &str = env!("PASSWORD");

/// PWM frequency for ENA/ENB; the TB6612 is fine up to 100 kHz.
const PWM_FREQUENCY_KHZ: u32 = 5;

type Pwm = channel::Channel<'static, LowSpeed>;
type Driver = Tb6612<Pwm, Output<'static>>;

#[esp_hal_embassy::main]
async fn main(spawner: embassy_executor::Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    tracing::info!("Logger initialized");

    let esp_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(esp_config);

    esp_alloc::heap_allocator!(72 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut rng = Rng::new(peripherals.RNG);

    // Motor PWM: 12-bit LEDC on ENA (GPIO19) and ENB (GPIO23)
    let ledc = mk_static!(Ledc<'static>, Ledc::new(peripherals.LEDC));
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);
    let pwm_timer = mk_static!(
        timer::Timer<'static, LowSpeed>,
        ledc.timer::<LowSpeed>(timer::Number::Timer0)
    );
    pwm_timer
        .configure(timer::config::Config {
            duty: timer::config::Duty::Duty12Bit,
            clock_source: timer::LSClockSource::APBClk,
            frequency: PWM_FREQUENCY_KHZ.kHz(),
        })
        .unwrap();

    let mut ena = ledc.channel(channel::Number::Channel0, peripherals.GPIO19);
    let mut enb = ledc.channel(channel::Number::Channel1, peripherals.GPIO23);
    for ch in [&mut ena, &mut enb] {
        ch.configure(channel::config::Config {
            timer: &*pwm_timer,
            duty_pct: 0,
            pin_config: channel::config::PinConfig::PushPull,
        })
        .unwrap();
    }

    // Direction pins IN1..IN4 and standby; STBY must be high for the bridges to drive
    let driver: Driver = Tb6612::new(
        HBridge::new(
            ena,
            Output::new(peripherals.GPIO18, Level::Low),
            Output::new(peripherals.GPIO5, Level::Low),
        ),
        HBridge::new(
            enb,
            Output::new(peripherals.GPIO21, Level::Low),
            Output::new(peripherals.GPIO22, Level::Low),
        ),
        Output::new(peripherals.GPIO4, Level::Low),
    );
    let led = Output::new(peripherals.GPIO2, Level::Low);

    let mut ctrl = SystemController::new(driver, led, None);
    if let Err(e) = ctrl.init() {
        panic!("motor driver init failed: {:?}", e);
    }

    // Wi-Fi Configuration Block
    // *******************************************************************
    let esp_wifi_ctrl = &*mk_static!(
        EspWifiController<'static>,
        init(timg0.timer0, rng.clone(), peripherals.RADIO_CLK).unwrap()
    );

    let (wifi_sta_device, controller) =
        esp_wifi::wifi::new_with_mode(esp_wifi_ctrl, peripherals.WIFI, WifiStaDevice).unwrap();

    cfg_if::cfg_if! {
        if #[cfg(feature = "esp32")] {
            let timg1 = TimerGroup::new(peripherals.TIMG1);
            esp_hal_embassy::init(timg1.timer0);
        } else {
            use esp_hal::timer::systimer::SystemTimer;
            let systimer = SystemTimer::new(peripherals.SYSTIMER);
            esp_hal_embassy::init(systimer.alarm0);
        }
    }

    let sta_config = embassy_net::Config::dhcpv4(Default::default());
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let (sta_stack, sta_runner) = embassy_net::new(
        wifi_sta_device,
        sta_config,
        mk_static!(embassy_net::StackResources<3>, embassy_net::StackResources::<3>::new()),
        seed,
    );
    // End of Wi-Fi Configuration Block
    // ************************************************************

    spawner.spawn(control_task(ctrl)).ok();
    spawner.spawn(connection(controller)).ok();
    spawner.spawn(net_task(sta_runner)).ok();

    wait_for_network(&sta_stack).await;

    utils::wss(0, 80, sta_stack, None).await;
}

#[embassy_executor::task]
async fn control_task(mut ctrl: SystemController<Driver, Output<'static>>) -> ! {
    ctrl.run().await
}

/// Task to keep the station connected
#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>) {
    use esp_wifi::wifi::{ClientConfiguration, Configuration, WifiEvent, WifiState};
    loop {
        if esp_wifi::wifi::wifi_state() == WifiState::StaConnected {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            tracing::warn!("Wi-Fi disconnected, stopping wheels");
            ddr_core::utils::controllers::command::update(
                ddr_core::utils::math::kinematics::VelocityCommand::ZERO,
            );
            utils::Timer::after(utils::Duration::from_millis(5000)).await;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let client_config = Configuration::Client(ClientConfiguration {
                ssid: SSID.try_into().unwrap(),
                password: PASSWORD.try_into().unwrap(),
                ..Default::default()
            });
            controller.set_configuration(&client_config).unwrap();
            controller.start_async().await.unwrap();
            tracing::info!("Connecting to SSID: {}", SSID);
        }

        match controller.connect_async().await {
            Ok(_) => tracing::info!("Wi-Fi connected!"),
            Err(e) => {
                tracing::info!("Failed to connect: {e:?}");
                utils::Timer::after(utils::Duration::from_millis(5000)).await;
            }
        }
    }
}

/// Task to manage the network stack
#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, WifiDevice<'static, WifiStaDevice>>) {
    runner.run().await;
}

/// Helper function to wait for network connection
async fn wait_for_network(stack: &embassy_net::Stack<'static>) {
    loop {
        if stack.is_link_up() {
            break;
        }
        utils::Timer::after(utils::Duration::from_millis(500)).await;
    }

    tracing::info!("Waiting to get IP address...");
    loop {
        if let Some(config) = stack.config_v4() {
            tracing::info!("Got IP: {}", config.address);
            break;
        }
        utils::Timer::after(utils::Duration::from_millis(500)).await;
    }
}
