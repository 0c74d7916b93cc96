//! The clocked engine: request pipeline + register bank, advanced one tick at a time.

use crate::config::{ConfigError, XhciBarConfig};
use crate::controller::RegisterBank;
use crate::map::PortId;
use crate::pipeline::{BankOp, ReadResponse, RequestPipeline, TickInputs, TickOutputs};

/// Emulated xHCI BAR.
///
/// The caller owns the clock: every call to [`XhciBar::tick`] is one rising edge. There is no
/// other way to mutate register state apart from the collaborator hooks
/// ([`XhciBar::raise_event`], [`XhciBar::attach_port`], [`XhciBar::detach_port`]).
#[derive(Debug, Clone)]
pub struct XhciBar {
    config: XhciBarConfig,
    pipeline: RequestPipeline,
    bank: RegisterBank,
    ticks: u64,
}

impl XhciBar {
    pub fn new(config: XhciBarConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ticks_per_microframe = config.ticks_per_microframe()?;
        let bank = RegisterBank::new(&config, ticks_per_microframe);
        tracing::debug!(
            clock_hz = config.clock_hz,
            ticks_per_microframe,
            "xhci bar engine created"
        );
        Ok(Self {
            config,
            pipeline: RequestPipeline::default(),
            bank,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &XhciBarConfig {
        &self.config
    }

    /// Advances the engine by one tick.
    pub fn tick(&mut self, inputs: TickInputs) -> TickOutputs {
        self.ticks = self.ticks.wrapping_add(1);

        if inputs.reset {
            self.reset();
            return TickOutputs::default();
        }

        let read_response = match self.pipeline.advance(&inputs) {
            Some(BankOp::Read { tag, offset }) => Some(ReadResponse {
                tag,
                data: self.bank.read(offset),
            }),
            Some(BankOp::Write {
                offset,
                data,
                byte_enable: _,
            }) => {
                self.bank.write(offset, data);
                None
            }
            None => None,
        };

        self.bank.tick();

        TickOutputs {
            read_response,
            need_interrupt: self.bank.irq_latched(),
        }
    }

    /// Synchronous reset: reinitialises every register and discards in-flight requests.
    pub fn reset(&mut self) {
        tracing::debug!("reset");
        self.pipeline.flush();
        self.bank.reset();
    }

    /// Ticks elapsed since construction (reset ticks included).
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn bank(&self) -> &RegisterBank {
        &self.bank
    }

    pub fn pipeline_idle(&self) -> bool {
        self.pipeline.is_idle()
    }

    pub fn need_interrupt(&self) -> bool {
        self.bank.irq_latched()
    }

    pub fn raise_event(&mut self) {
        self.bank.raise_event();
    }

    pub fn attach_port(&mut self, id: PortId, speed: u8) {
        self.bank.attach_port(id, speed);
    }

    pub fn detach_port(&mut self, id: PortId) {
        self.bank.detach_port(id);
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut RequestPipeline, &mut RegisterBank) {
        (&mut self.pipeline, &mut self.bank)
    }

    pub(crate) fn set_ticks(&mut self, ticks: u64) {
        self.ticks = ticks;
    }

    pub(crate) fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }
}
