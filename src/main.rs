//! Pump Controller Firmware — Main Entry Point
//!
//! Hexagonal architecture with interrupt-deferred, polled execution.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  Mcp7940 (I2C)  ─▶  RetryingClock        LogEventSink          │
//! │  (ClockPort)        (ClockPort)          (EventSink)           │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              PumpController (pure logic)               │    │
//! │  │  store · resolver · alarm programmer · recovery        │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  MFP ISR / poll tick ─▶ PendingEvents ─▶ main loop             │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

mod pins;

use anyhow::Result;
use esp_idf_hal::delay::{Delay, FreeRtos};
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;
use esp_idf_svc::sys::*;
use log::{error, info, warn};

use pumpclock::adapters::log_sink::LogEventSink;
use pumpclock::adapters::mcp7940::Mcp7940;
use pumpclock::app::service::{PumpController, WateringState};
use pumpclock::config::ControllerConfig;
use pumpclock::events::{Event, PendingEvents};

static PENDING: PendingEvents = PendingEvents::new();

/// Main-loop sleep granularity; bounds the latency of an MFP edge.
const LOOP_SLICE_MS: u32 = 50;

// ── ISR ───────────────────────────────────────────────────────

unsafe extern "C" fn rtc_mfp_isr(_arg: *mut core::ffi::c_void) {
    PENDING.raise(Event::AlarmAsserted);
}

// ── Board bring-up ────────────────────────────────────────────

fn init_pump_output() -> Result<()> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::PUMP_MOSFET_GPIO,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: called once from the main task before the loop starts.
    esp!(unsafe { gpio_config(&cfg) })?;
    set_pump(false);
    Ok(())
}

fn init_mfp_interrupt() -> Result<()> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::RTC_MFP_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
    };
    // SAFETY: the ISR only sets a bit in an atomic; it never touches the
    // I2C bus.  ESP_ERR_INVALID_STATE means the service is already installed.
    unsafe {
        esp!(gpio_config(&cfg))?;
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            esp!(ret)?;
        }
        esp!(gpio_isr_handler_add(
            pins::RTC_MFP_GPIO,
            Some(rtc_mfp_isr),
            core::ptr::null_mut()
        ))?;
        esp!(gpio_intr_enable(pins::RTC_MFP_GPIO))?;
    }
    info!("Board: MFP interrupt on GPIO{}", pins::RTC_MFP_GPIO);
    Ok(())
}

fn set_pump(on: bool) {
    // SAFETY: pin configured as output in init_pump_output(); main loop only.
    unsafe {
        gpio_set_level(pins::PUMP_MOSFET_GPIO, u32::from(on));
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  PumpClock v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = ControllerConfig::default();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config: {e}"))?;

    // ── 2. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    // SAFETY: the RTC pins are not claimed anywhere else.
    let (sda, scl) = unsafe {
        (
            AnyIOPin::new(pins::RTC_SDA_GPIO),
            AnyIOPin::new(pins::RTC_SCL_GPIO),
        )
    };
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        sda,
        scl,
        &I2cConfig::new().baudrate(Hertz(pins::RTC_I2C_HZ)),
    )?;
    init_pump_output()?;

    // ── 3. RTC ────────────────────────────────────────────────
    let mut rtc = Mcp7940::new(i2c);
    let mut delay = Delay::new_default();
    if let Err(e) = rtc.start_oscillator(&mut delay) {
        // Keep going: the controller reports bus faults on every poll.
        warn!("RTC: oscillator start failed ({}), continuing", e);
    }

    // ── 4. Controller + boot recovery ─────────────────────────
    let mut sink = LogEventSink::new();
    let mut controller = PumpController::new(rtc, delay, config.clone());
    match controller.startup(&mut sink) {
        Ok(report) => info!("Startup: {:?}", report),
        // `poll` re-runs startup until it succeeds.
        Err(e) => error!("Startup failed ({}), retrying from the main loop", e),
    }

    init_mfp_interrupt()?;
    info!("System ready. Entering event loop.");

    // ── 5. Event loop ─────────────────────────────────────────
    let mut since_tick_ms = 0u32;
    loop {
        FreeRtos::delay_ms(LOOP_SLICE_MS);
        since_tick_ms = since_tick_ms.saturating_add(LOOP_SLICE_MS);
        if since_tick_ms >= config.poll_interval_ms {
            since_tick_ms = 0;
            PENDING.raise(Event::PollTick);
        }

        // An MFP edge polls straight away instead of waiting for the tick.
        let pending = PENDING.take();
        if pending.is_empty() {
            continue;
        }
        if pending.contains(Event::AlarmAsserted) {
            info!("RTC: alarm asserted");
            since_tick_ms = 0;
        }

        match controller.poll(&mut sink) {
            Ok(WateringState::Running) => set_pump(true),
            Ok(WateringState::Idle | WateringState::Finished) => set_pump(false),
            // Leave the pump as it is; the next poll retries.
            Err(_) => {}
        }

        if controller.is_degraded() {
            // Alarm state unknown: fail safe with the pump off.
            set_pump(false);
        }
    }
}
