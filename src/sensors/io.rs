//! IO service: lets a client drive the LEDs and buzzer, or read back the
//! power-on self-test result.
//!
//! | CONF | Mode   | DATA semantics                              |
//! |------|--------|---------------------------------------------|
//! | 0    | local  | ignored; the application owns the outputs   |
//! | 1    | remote | bit 0 LED1, bit 1 LED2, bit 2 buzzer        |
//! | 2    | test   | self-test bitmap, published by the device   |

use log::debug;

use super::{DriverCtx, ParamId, RawSample, SensorDriver, ServiceId};
use crate::app::ports::Led;
use crate::bus::{BusArbiter, BusTransport};
use crate::error::BusError;

pub const OUT_LED1: u8 = 0x01;
pub const OUT_LED2: u8 = 0x02;
pub const OUT_BUZZER: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoMode {
    #[default]
    Local,
    Remote,
    Test,
}

impl IoMode {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Local),
            1 => Some(Self::Remote),
            2 => Some(Self::Test),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct IoService {
    mode: IoMode,
    outputs: u8,
}

impl IoService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> IoMode {
        self.mode
    }

    fn apply<T: BusTransport>(&self, ctx: &mut DriverCtx<'_, T>) {
        ctx.indicators.set_led(Led::Led1, self.outputs & OUT_LED1 != 0);
        ctx.indicators.set_led(Led::Led2, self.outputs & OUT_LED2 != 0);
        ctx.indicators.set_buzzer(self.outputs & OUT_BUZZER != 0);
    }
}

impl<T: BusTransport> SensorDriver<T> for IoService {
    fn service(&self) -> ServiceId {
        ServiceId::Io
    }

    fn name(&self) -> &'static str {
        "io"
    }

    fn init(&mut self, _ctx: &mut DriverCtx<'_, T>) -> bool {
        true
    }

    fn reset(&mut self, ctx: &mut DriverCtx<'_, T>) {
        if self.mode == IoMode::Remote {
            ctx.indicators.all_off();
        }
        self.mode = IoMode::Local;
        self.outputs = 0;
        ctx.publish(ServiceId::Io, ParamId::Config, &[0]);
        ctx.publish(ServiceId::Io, ParamId::Data, &[0]);
    }

    fn read(&mut self, _bus: &BusArbiter<T>) -> Result<RawSample, BusError> {
        Ok(RawSample::from_slice(&[self.outputs]).unwrap_or_default())
    }

    fn process_char_change(
        &mut self,
        param: ParamId,
        ctx: &mut DriverCtx<'_, T>,
    ) -> Result<(), BusError> {
        let value = ctx
            .written(ServiceId::Io, param)
            .and_then(|v| v.first().copied())
            .unwrap_or(0);

        match param {
            ParamId::Config => {
                let Some(mode) = IoMode::from_code(value) else {
                    return Ok(());
                };
                debug!("IO: mode {:?} -> {:?}", self.mode, mode);
                let was_remote = self.mode == IoMode::Remote;
                self.mode = mode;
                match mode {
                    IoMode::Remote => self.apply(ctx),
                    IoMode::Test => {
                        let result = ctx.self_test.bits();
                        ctx.publish(ServiceId::Io, ParamId::Data, &[result]);
                    }
                    IoMode::Local if was_remote => ctx.indicators.all_off(),
                    IoMode::Local => {}
                }
            }
            ParamId::Data => {
                self.outputs = value & (OUT_LED1 | OUT_LED2 | OUT_BUZZER);
                if self.mode == IoMode::Remote {
                    self.apply(ctx);
                }
            }
            ParamId::Period => {}
        }
        Ok(())
    }
}
