//  _____       ______   ____
// |_   _|     |  ____|/ ____|  Institute of Embedded Systems
//   | |  _ __ | |__  | (___    Zurich University of Applied Sciences
//   | | | '_ \|  __|  \___ \   8401 Winterthur, Switzerland
//  _| |_| | | | |____ ____) |
// |_____|_| |_|______|_____/
//
// Copyright 2025 Institute of Embedded Systems at Zurich University of Applied Sciences.
// All rights reserved.
// SPDX-License-Identifier: MIT

#![no_std]
#![no_main]

#[cfg(feature = "log-rtt")]
use defmt_rtt as _;

#[cfg(feature = "log-serial")]
use defmt_serial as _;

use embassy_executor::Spawner;
use panic_probe as _;

mod iv;
mod link;

#[allow(unused_imports)]
use defmt::{dbg, debug, error, info, panic, unwrap, warn};
use embassy_futures::select::{select, Either};
use embassy_stm32::adc::Adc;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{self, AnyPin, Pin};
use embassy_stm32::rng::{self, Rng};
use embassy_stm32::{bind_interrupts, peripherals, spi::Spi, time};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Delay, Duration, Instant, Timer};
use heapless::String;
use lora_phy::{
    mod_params::{Bandwidth, CodingRate, ModulationParams, SpreadingFactor, *},
    mod_traits::RadioKind,
    sx126x::{self, Stm32wl, Sx126x},
    LoRa, RxMode,
};

use embassy_stm32::{
    dma::NoDma,
    usart::{self, Uart},
};
#[cfg(feature = "log-serial")]
use static_cell::StaticCell;

use dual_motes::{
    bus::{BusReader, BusWriter, Edge},
    EnergestMeter, Node, Observer, ObserverConfig, ProcessorState, RadioConfig, RadioState, Relay,
    RelayConfig, Sender, SenderConfig, Sink, SinkConfig, SinkKind, ENERGEST_SINK_ID,
    OBSERVATION_SINK_ID, RELAY_ID,
};
use experiment_api::*;

/// The first 32bits of the UID64 is a unique (among stm32wl5x devices) device number
const DEVNUM_PTR: *const u32 = 0x1FFF_7580 as *const u32;

const LORA_SPREADING_FACTOR: SpreadingFactor = SpreadingFactor::_7;
const LORA_BANDWIDTH: Bandwidth = Bandwidth::_125KHz;
const LORA_CODING_RATE: CodingRate = CodingRate::_4_5;
const LORA_PREAMBLE_LEN: u16 = 8;
const LORA_IMPLICIT_HEADER: bool = false;
const LORA_CRC_ON: bool = true;
const LORA_IQ_INVERTED: bool = false;
const LORA_RX_BOOST: bool = false;
const LORA_USE_HIGH_POWER_PA: bool = false;
/// All roles share one frequency, the experiment channel travels in the link header
const LORA_FREQUENCY: u32 = 868_100_000;

/// Output power range of the low power PA
const LORA_TX_POWER_DBM: core::ops::RangeInclusive<i8> = -17..=15;

const MAX_RECORD_LINE: usize = 96;

bind_interrupts!(struct Irqs{
    SUBGHZ_RADIO => iv::InterruptHandler;
    // for log-serial
    USART1 => usart::InterruptHandler<peripherals::USART1>;
    LPUART1 => usart::InterruptHandler<peripherals::LPUART1>;
    RNG => rng::InterruptHandler<peripherals::RNG>;
});

/// Role selected by the strap pins, a pin tied to ground reads as 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
enum Strap {
    Sender,
    Relay,
    Observer,
    ObservationSink,
    EnergestSink,
    BlackRelay,
    BlackObserver,
}

impl Strap {
    fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0 => Strap::Sender,
            1 => Strap::Relay,
            2 => Strap::Observer,
            3 => Strap::ObservationSink,
            4 => Strap::EnergestSink,
            5 => Strap::BlackRelay,
            6 => Strap::BlackObserver,
            _ => return None,
        })
    }
}

/// Observing end of the parallel bus
struct Tap {
    reader: BusReader<gpio::Input<'static, AnyPin>>,
    strobe: ExtiInput<'static, peripherals::PB0>,
    edge: Edge,
}

impl Tap {
    /// Waits for the next strobe edge, returns the value on the data lines
    async fn strobed(&mut self) -> u16 {
        match self.edge {
            Edge::Any => self.strobe.wait_for_any_edge().await,
            Edge::Rising => self.strobe.wait_for_rising_edge().await,
        }
        match self.reader.read() {
            Ok(value) => value,
            Err(e) => {
                error!("could not read bus: {}", e);
                0
            }
        }
    }
}

/// Latest value read on a strobe edge, a newer value replaces one the main loop did not take yet
static STROBE: Signal<CriticalSectionRawMutex, u16> = Signal::new();

#[embassy_executor::task]
async fn watch_strobe(mut tap: Tap) {
    loop {
        let value = tap.strobed().await;
        debug!("strobe with {}", value);
        STROBE.signal(value);
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut config = embassy_stm32::Config::default();
    {
        use embassy_stm32::rcc::*;
        config.rcc.hse = Some(Hse {
            freq: time::Hertz(32_000_000),
            mode: HseMode::Bypass,
            prescaler: HsePrescaler::DIV1,
        });
        config.rcc.mux = ClockSrc::PLL1_R;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSE,
            prediv: PllPreDiv::DIV2,
            mul: PllMul::MUL6,
            divp: None,
            divq: Some(PllQDiv::DIV2), // PLL1_Q clock (32 / 2 * 6 / 2), used for RNG
            divr: Some(PllRDiv::DIV2), // sysclk 48Mhz clock (32 / 2 * 6 / 2)
        });
    }
    let p = embassy_stm32::init(config);

    // init pins early so they're stable when read
    let strap_pins = [
        gpio::Input::new(p.PB3, gpio::Pull::Up),
        gpio::Input::new(p.PB4, gpio::Pull::Up),
        gpio::Input::new(p.PB5, gpio::Pull::Up),
    ];

    #[cfg(feature = "log-serial")]
    {
        let mut uart_config = usart::Config::default();
        uart_config.baudrate = 115200;
        static UART: StaticCell<Uart<'static, peripherals::USART1, peripherals::DMA2_CH1>> =
            StaticCell::new();
        let uart = UART.init(unwrap!(Uart::new(
            p.USART1,
            p.PB7,
            p.PB6,
            Irqs,
            p.DMA2_CH1,
            NoDma,
            uart_config
        )));
        defmt_serial::defmt_serial(uart);
    }

    // sink records go to the virtual COM port
    let mut console = {
        let mut uart_config = usart::Config::default();
        uart_config.baudrate = 115200;
        unwrap!(Uart::new(
            p.LPUART1,
            p.PA3,
            p.PA2,
            Irqs,
            p.DMA1_CH3,
            NoDma,
            uart_config
        ))
    };

    // Nucleo rf switch
    let _rf_ctrl1 = gpio::Output::new(p.PC4, gpio::Level::High, gpio::Speed::High);
    let rf_ctrl2 = gpio::Output::new(p.PC5, gpio::Level::High, gpio::Speed::High);
    let _rf_ctrl3 = gpio::Output::new(p.PC3, gpio::Level::High, gpio::Speed::High);

    let lora_spi = Spi::new_subghz(p.SUBGHZSPI, p.DMA1_CH1, p.DMA1_CH2);
    let lora_spi = iv::SubghzSpiDevice(lora_spi);

    let strap_bits = strap_pins
        .iter()
        .enumerate()
        .fold(0, |bits, (i, pin)| bits | (pin.is_low() as u8) << i);
    let Some(strap) = Strap::from_bits(strap_bits) else {
        panic!("invalid strap {}", strap_bits);
    };

    // last byte of the device number, the sinks print it as the source address
    let device_id = unsafe { DEVNUM_PTR.read() } as u8;
    info!("device {:x} strapped as {}", device_id, strap);

    // data lines of the parallel bus, least significant bit first
    let data_pins: [AnyPin; 11] = [
        p.PA0.degrade(),
        p.PA1.degrade(),
        p.PA4.degrade(),
        p.PA5.degrade(),
        p.PA6.degrade(),
        p.PA7.degrade(),
        p.PA8.degrade(),
        p.PA9.degrade(),
        p.PB8.degrade(),
        p.PB12.degrade(),
        p.PB13.degrade(),
    ];

    let mut bus = None;
    let mut node: Node = match strap {
        Strap::Sender | Strap::Relay | Strap::BlackRelay => {
            let (node, io_width, strobe): (Node, _, _) = match strap {
                Strap::Sender => {
                    let config = SenderConfig::default();
                    let (w, s) = (config.io_width, config.strobe);
                    (unwrap!(Sender::new(device_id, config)).into(), w, s)
                }
                Strap::Relay => {
                    let config = RelayConfig::default();
                    let (w, s) = (config.io_width, config.strobe);
                    (unwrap!(Relay::new(RELAY_ID, config)).into(), w, s)
                }
                _ => {
                    let config = RelayConfig::black();
                    let (w, s) = (config.io_width, config.strobe);
                    (unwrap!(Relay::new(RELAY_ID, config)).into(), w, s)
                }
            };
            let data = data_pins
                .into_iter()
                .take(io_width as usize)
                .map(|pin| gpio::Output::new(pin, gpio::Level::Low, gpio::Speed::VeryHigh));
            let strobe_pin = gpio::Output::new(p.PB0, gpio::Level::Low, gpio::Speed::VeryHigh);
            bus = Some(unwrap!(BusWriter::new(data, strobe_pin, strobe)));
            node
        }
        Strap::Observer | Strap::BlackObserver => {
            let config = match strap {
                Strap::Observer => ObserverConfig::default(),
                _ => ObserverConfig {
                    io_width: 6,
                    edge: Edge::Rising,
                    ..Default::default()
                },
            };
            let data = data_pins
                .into_iter()
                .take(config.io_width as usize)
                .map(|pin| gpio::Input::new(pin, gpio::Pull::Down));
            unwrap!(spawner.spawn(watch_strobe(Tap {
                reader: unwrap!(BusReader::new(data)),
                strobe: ExtiInput::new(gpio::Input::new(p.PB0, gpio::Pull::Down), p.EXTI0),
                edge: config.edge,
            })));
            unwrap!(Observer::new(device_id, config)).into()
        }
        Strap::ObservationSink => Sink::new(
            OBSERVATION_SINK_ID,
            SinkConfig::new(SinkKind::Observation),
        )
        .into(),
        Strap::EnergestSink => {
            Sink::new(ENERGEST_SINK_ID, SinkConfig::new(SinkKind::Energest)).into()
        }
    };
    let node_id = node.id();

    let mut adc = Adc::new(p.ADC, &mut Delay);
    let mut adc_pin = p.PB1;

    let mut rng = Rng::new(p.RNG, Irqs);
    let mut meter = EnergestMeter::new(Instant::now().as_millis());

    let config = sx126x::Config {
        chip: Stm32wl {
            use_high_power_pa: LORA_USE_HIGH_POWER_PA,
        },
        tcxo_ctrl: Some(sx126x::TcxoCtrlVoltage::Ctrl1V7),
        use_dcdc: true,
        rx_boost: LORA_RX_BOOST,
    };

    let iv = unwrap!(iv::Stm32wlInterfaceVariant::new(Irqs, None, Some(rf_ctrl2)));

    let mut lora = unwrap!(LoRa::new(Sx126x::new(lora_spi, iv, config), false, Delay).await);

    let modulation_params = unwrap!(lora.create_modulation_params(
        LORA_SPREADING_FACTOR,
        LORA_BANDWIDTH,
        LORA_CODING_RATE,
        LORA_FREQUENCY,
    ));

    let mut tx_pkt_params = unwrap!(lora.create_tx_packet_params(
        LORA_PREAMBLE_LEN,
        LORA_IMPLICIT_HEADER,
        LORA_CRC_ON,
        LORA_IQ_INVERTED,
        &modulation_params,
    ));

    let mut receive_buffer = [0u8; link::MAX_LINK_FRAME_SIZE];

    let rx_pkt_params = unwrap!(lora.create_rx_packet_params(
        LORA_PREAMBLE_LEN,
        LORA_IMPLICIT_HEADER,
        receive_buffer.len() as u8,
        LORA_CRC_ON,
        LORA_IQ_INVERTED,
        &modulation_params,
    ));

    let radio = node.radio();
    if !LORA_TX_POWER_DBM.contains(&radio.tx_power_dbm) {
        panic!("tx power {} dBm out of range", radio.tx_power_dbm);
    }
    let output_power = radio.tx_power_dbm as i32;

    let mut input = None;
    loop {
        let now = Instant::now().as_millis();
        let (action, record) = node.progress(now, input.take(), &mut rng);

        if let Some(record) = record {
            let mut line: String<MAX_RECORD_LINE> = String::new();
            match record.write_line(&mut line) {
                Ok(()) => {
                    if let Err(e) = console.write(line.as_bytes()).await {
                        error!("could not print record: {}", e);
                    }
                }
                Err(_) => error!("record does not fit a line: {}", record),
            }
        }

        match action {
            Action::None => {}
            Action::Wait { end } => {
                meter.set_processor(ProcessorState::Lpm, now);
                let result = select(Timer::at(Instant::from_millis(end)), STROBE.wait()).await;
                if let Either::Second(value) = result {
                    input = Some(Input::Strobe { value });
                }
                meter.set_processor(ProcessorState::Cpu, Instant::now().as_millis());
            }
            Action::Receive { end } => {
                meter.set_processor(ProcessorState::Lpm, now);
                meter.set_radio(RadioState::Listen, now);
                loop {
                    let timeout = end.map(|end| {
                        Duration::from_millis(end.saturating_sub(Instant::now().as_millis()))
                    });
                    let result = select(
                        lora_receive(
                            &mut lora,
                            &rx_pkt_params,
                            &modulation_params,
                            &mut receive_buffer,
                            timeout,
                            &radio,
                        ),
                        STROBE.wait(),
                    )
                    .await;
                    match result {
                        Either::First(Ok(len)) => {
                            let link_timestamp = Instant::now().as_millis() as u16;
                            if let Some(packet) =
                                link::decode(&receive_buffer[..len], node_id, link_timestamp)
                            {
                                input = Some(packet);
                                break;
                            }
                            debug!("ignoring frame for another node");
                        }
                        Either::First(Err(ReceiveError::InsufficientSignalStrength)) => {
                            info!("ignoring frame with low RSSI");
                        }
                        Either::First(Err(ReceiveError::RadioError | ReceiveError::Timeout)) => {
                            break;
                        }
                        Either::Second(value) => {
                            input = Some(Input::Strobe { value });
                            break;
                        }
                    }
                }

                if let Err(err) = lora.enter_standby().await {
                    error!("radio could not enter standby: {}", err);
                };
                let now = Instant::now().as_millis();
                meter.set_radio(RadioState::Off, now);
                meter.set_processor(ProcessorState::Cpu, now);
            }
            Action::Signal { value } => match bus.as_mut() {
                Some(bus) => {
                    if let Err(e) = bus.write(value, &mut Delay) {
                        error!("could not signal {}: {}", value, e);
                    }
                }
                None => warn!("no bus to signal {} on", value),
            },
            Action::Sample => {
                input = Some(Input::Sample {
                    value: adc.read(&mut adc_pin),
                });
            }
            Action::ReadEnergest => {
                input = Some(Input::Energest(meter.snapshot(now)));
            }
            Action::Transmit {
                channel,
                destination,
                frame,
            } => {
                let link_frame = match link::encode(node_id, destination, channel, &frame) {
                    Ok(link_frame) => link_frame,
                    Err(e) => {
                        error!("could not frame payload: {}", e);
                        continue;
                    }
                };
                meter.set_radio(RadioState::Transmit, now);
                lora_transmit(
                    &mut lora,
                    &mut tx_pkt_params,
                    &modulation_params,
                    output_power,
                    &link_frame,
                )
                .await;
                meter.set_radio(RadioState::Off, Instant::now().as_millis());
            }
        }
    }
}

async fn lora_transmit<RK, DLY>(
    lora: &mut LoRa<RK, DLY>,
    tx_pkt_params: &mut PacketParams,
    modulation_params: &ModulationParams,
    output_power: i32,
    buffer: &[u8],
) where
    RK: RadioKind,
    DLY: lora_phy::DelayNs,
{
    if let Err(err) = lora
        .prepare_for_tx(modulation_params, tx_pkt_params, output_power, buffer)
        .await
    {
        error!("radio error = {}", err);
        return;
    };

    if let Err(err) = lora.tx().await {
        error!("radio error = {}", err);
    };
}

/// Receives one frame, returns its length
async fn lora_receive<RK, DLY>(
    lora: &mut LoRa<RK, DLY>,
    rx_pkt_params: &PacketParams,
    modulation_params: &ModulationParams,
    buffer: &mut [u8; link::MAX_LINK_FRAME_SIZE],
    timeout: Option<Duration>,
    radio: &RadioConfig,
) -> Result<usize, ReceiveError>
where
    RK: RadioKind,
    DLY: lora_phy::DelayNs,
{
    if let Err(err) = lora
        .prepare_for_rx(RxMode::Continuous, modulation_params, rx_pkt_params)
        .await
    {
        error!("radio error: {}", err);
        return Err(ReceiveError::RadioError);
    }

    let rx = match timeout {
        Some(timeout) => embassy_time::with_timeout(timeout, lora.rx(rx_pkt_params, buffer))
            .await
            .map_err(|_| ReceiveError::Timeout)?,
        None => lora.rx(rx_pkt_params, buffer).await,
    };

    match rx {
        Ok((received_len, rx_pkt_status)) => {
            debug!(
                "received frame (rssi: {} dBm, snr: {} dB)",
                rx_pkt_status.rssi, rx_pkt_status.snr,
            );
            if !radio.accepts(rx_pkt_status.rssi) {
                return Err(ReceiveError::InsufficientSignalStrength);
            }
            Ok(received_len as usize)
        }
        Err(err) => {
            info!("rx unsuccessful: {}", err);
            Err(ReceiveError::RadioError)
        }
    }
}

enum ReceiveError {
    InsufficientSignalStrength,
    RadioError,
    Timeout,
}

// prevent panic messages from being printed twice when `defmt::panic` is invoked
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
