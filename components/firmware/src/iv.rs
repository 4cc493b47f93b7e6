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

//! Glue between lora-phy and the STM32WL's integrated sub-GHz radio

use embassy_stm32::interrupt::{self, typelevel, InterruptExt};
use embassy_stm32::pac;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::{ErrorType, Operation, SpiBus, SpiDevice};
use lora_phy::mod_params::RadioError;
use lora_phy::mod_traits::InterfaceVariant;

static IRQ_SIGNAL: Signal<CriticalSectionRawMutex, ()> = Signal::new();

pub struct InterruptHandler;

impl typelevel::Handler<typelevel::SUBGHZ_RADIO> for InterruptHandler {
    unsafe fn on_interrupt() {
        interrupt::SUBGHZ_RADIO.disable();
        IRQ_SIGNAL.signal(());
    }
}

/// The radio sits on an internal SPI whose chip select is a power controller register
pub struct SubghzSpiDevice<T>(pub T);

impl<T: SpiBus> ErrorType for SubghzSpiDevice<T> {
    type Error = T::Error;
}

impl<T: SpiBus> SpiDevice for SubghzSpiDevice<T> {
    async fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), T::Error> {
        pac::PWR.subghzspicr().modify(|w| w.set_nss(false));

        for op in operations {
            match op {
                Operation::Read(buf) => self.0.read(buf).await?,
                Operation::Write(buf) => self.0.write(buf).await?,
                Operation::Transfer(read, write) => self.0.transfer(read, write).await?,
                Operation::TransferInPlace(buf) => self.0.transfer_in_place(buf).await?,
                Operation::DelayNs(_) => {}
            }
        }

        self.0.flush().await?;
        pac::PWR.subghzspicr().modify(|w| w.set_nss(true));
        Ok(())
    }
}

pub struct Stm32wlInterfaceVariant<CTRL> {
    rf_switch_rx: Option<CTRL>,
    rf_switch_tx: Option<CTRL>,
}

impl<CTRL: OutputPin> Stm32wlInterfaceVariant<CTRL> {
    pub fn new(
        _irq: impl typelevel::Binding<typelevel::SUBGHZ_RADIO, InterruptHandler>,
        rf_switch_rx: Option<CTRL>,
        rf_switch_tx: Option<CTRL>,
    ) -> Result<Self, RadioError> {
        interrupt::SUBGHZ_RADIO.disable();
        Ok(Self {
            rf_switch_rx,
            rf_switch_tx,
        })
    }
}

impl<CTRL: OutputPin> InterfaceVariant for Stm32wlInterfaceVariant<CTRL> {
    async fn reset(&mut self, _delay: &mut impl DelayNs) -> Result<(), RadioError> {
        pac::RCC.csr().modify(|w| w.set_rfrst(true));
        pac::RCC.csr().modify(|w| w.set_rfrst(false));
        Ok(())
    }

    async fn wait_on_busy(&mut self) -> Result<(), RadioError> {
        while pac::PWR.sr2().read().rfbusys() {}
        Ok(())
    }

    async fn await_irq(&mut self) -> Result<(), RadioError> {
        unsafe { interrupt::SUBGHZ_RADIO.enable() };
        IRQ_SIGNAL.wait().await;
        Ok(())
    }

    async fn enable_rf_switch_rx(&mut self) -> Result<(), RadioError> {
        if let Some(pin) = self.rf_switch_tx.as_mut() {
            pin.set_low().map_err(|_| RadioError::RfSwitchTx)?;
        }
        if let Some(pin) = self.rf_switch_rx.as_mut() {
            pin.set_high().map_err(|_| RadioError::RfSwitchRx)?;
        }
        Ok(())
    }

    async fn enable_rf_switch_tx(&mut self) -> Result<(), RadioError> {
        if let Some(pin) = self.rf_switch_rx.as_mut() {
            pin.set_low().map_err(|_| RadioError::RfSwitchRx)?;
        }
        if let Some(pin) = self.rf_switch_tx.as_mut() {
            pin.set_high().map_err(|_| RadioError::RfSwitchTx)?;
        }
        Ok(())
    }

    async fn disable_rf_switch(&mut self) -> Result<(), RadioError> {
        if let Some(pin) = self.rf_switch_rx.as_mut() {
            pin.set_low().map_err(|_| RadioError::RfSwitchRx)?;
        }
        if let Some(pin) = self.rf_switch_tx.as_mut() {
            pin.set_low().map_err(|_| RadioError::RfSwitchTx)?;
        }
        Ok(())
    }
}
