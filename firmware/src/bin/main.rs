#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::{error, info};
use defmt_rtt as _;
use embassy_embedded_hal::flash::partition::BlockingPartition;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{FLASH, USB};
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Delay, Timer};
use embassy_usb::class::cdc_acm::State;
use embassy_usb::{Builder, Config as UsbConfig};
use static_cell::StaticCell;
use tuffpad::{
    board, configure_usb_serial, CommandDispatcher, LinkConfig, LinkError, LinkStatus,
    NorFlashFs, ProtocolLink, StatusCell, StorageManager, StorageOptions, UsbSerial,
    UsbSerialError, FIRMWARE_VERSION,
};
use tuffpad_proto::{ReadError, WriteError};

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

type ConfigFlash = Flash<'static, FLASH, Blocking, { board::FLASH_SIZE }>;
type ConfigPartition = BlockingPartition<'static, CriticalSectionRawMutex, ConfigFlash>;
type ConfigDispatcher = CommandDispatcher<NorFlashFs<ConfigPartition>>;
type ConfigLink = ProtocolLink<UsbSerial<'static>, ConfigDispatcher>;

/// Status shown on the LED, written only by the config task.
static STATUS: StatusCell = StatusCell::new();

/// Flash shared through a mutex so the partition can borrow it.
static FLASH_MUTEX: StaticCell<Mutex<CriticalSectionRawMutex, RefCell<ConfigFlash>>> =
    StaticCell::new();

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// CDC-ACM state.
static CDC_STATE: StaticCell<State> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!(
        "tuffpad {}.{} starting...",
        FIRMWARE_VERSION.major, FIRMWARE_VERSION.minor
    );

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    // --- Storage Setup ---
    let flash = FLASH_MUTEX.init(Mutex::new(RefCell::new(Flash::new_blocking(p.FLASH))));
    let partition = BlockingPartition::new(
        flash,
        board::CONFIG_PARTITION_OFFSET,
        board::CONFIG_PARTITION_SIZE,
    );
    let dispatcher = init_dispatcher(partition);

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(board::USB_VID, board::USB_PID);
    usb_config.manufacturer = Some(board::USB_MANUFACTURER);
    usb_config.product = Some(board::USB_PRODUCT);
    usb_config.serial_number = Some(board::USB_SERIAL);
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    let config_descriptor = CONFIG_DESCRIPTOR.init([0; 256]);
    let bos_descriptor = BOS_DESCRIPTOR.init([0; 256]);
    let msos_descriptor = MSOS_DESCRIPTOR.init([0; 256]);
    let control_buf = CONTROL_BUF.init([0; 64]);

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );

    let cdc_state = CDC_STATE.init(State::new());
    let serial = configure_usb_serial(&mut builder, cdc_state);

    let usb_device = builder.build();

    let link = ProtocolLink::with_dtr(serial, dispatcher, LinkConfig::default());

    // On-board LED on Pico
    let led = Output::new(p.PIN_25, Level::Low);

    // Spawn tasks (unwrap the SpawnToken, then spawn)
    spawner.spawn(usb_task(usb_device).unwrap());
    spawner.spawn(config_task(link).unwrap());
    spawner.spawn(led_task(led).unwrap());

    info!("tuffpad initialized, waiting for host...");
}

/// Mount storage, falling back to a dispatcher that only answers the
/// commands that need no storage.
fn init_dispatcher(partition: ConfigPartition) -> ConfigDispatcher {
    let fs = match NorFlashFs::new(partition) {
        Ok(fs) => fs,
        Err(_) => {
            error!("config partition has unusable geometry");
            return CommandDispatcher::without_storage(FIRMWARE_VERSION);
        }
    };
    match StorageManager::new(fs, StorageOptions::default()) {
        Ok(storage) => CommandDispatcher::new(storage, FIRMWARE_VERSION),
        Err(e) => {
            error!("Storage init failed: {}", e);
            CommandDispatcher::without_storage(FIRMWARE_VERSION)
        }
    }
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    device.run().await;
}

/// Config task - owns the link, and through it the storage.
#[embassy_executor::task]
async fn config_task(mut link: ConfigLink) {
    let storage_ready = link.handler().storage().is_some();
    let mut delay = Delay;

    loop {
        STATUS.publish(LinkStatus::for_link(storage_ready, false));
        link.stream_mut().wait_connection().await;
        link.wait_for_host(&mut delay).await;
        STATUS.publish(LinkStatus::for_link(storage_ready, true));
        info!("host connected");

        loop {
            match link.process_one().await {
                Err(LinkError::Read(ReadError::Io(UsbSerialError::Disconnected)))
                | Err(LinkError::Write(WriteError::Io(UsbSerialError::Disconnected))) => {
                    info!("host disconnected");
                    break;
                }
                // Anything else was logged by the link and is skipped
                _ => {}
            }
        }
    }
}

/// LED task - blinks the pattern of the current link status.
#[embassy_executor::task]
async fn led_task(mut led: Output<'static>) {
    loop {
        let (on_ms, off_ms) = STATUS.get().blink_pattern();
        led.set_high();
        Timer::after_millis(on_ms).await;
        if off_ms > 0 {
            led.set_low();
            Timer::after_millis(off_ms).await;
        }
    }
}
