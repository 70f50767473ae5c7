///! Device I/O

use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::{debug, error, trace, warn};

use crate::config::*;
use crate::errors::*;
use crate::frequency::*;
use crate::register::*;

/// 8T49N24x device.
///
/// Owns the bus, so at most one register sequence is in flight per device.
pub struct Idt8t49n24x<I2C> {
    i2c: I2C,
    address: u8,
    profile: ChipProfile,
    retries: u8,
}


impl<I2C, E> Idt8t49n24x<I2C>
where I2C: Write<Error = E> + WriteRead<Error = E>,
      E: core::fmt::Debug,
{
    /// Creates the device, no bus traffic.
    ///
    /// `address` - 7-bit I2C address
    /// `profile` - device limits and crystal frequency
    pub fn new(
        i2c: I2C,
        address: u8,
        profile: ChipProfile,
    ) -> Self {
        Idt8t49n24x { i2c, address, profile, retries: 0 }
    }

    /// Retry each failed register access up to `retries` more times.
    pub fn with_retries(self: Self, retries: u8) -> Self {
        Idt8t49n24x { retries, ..self }
    }

    /// Creates and initializes the device from board settings: default
    /// configuration, loss-of-lock GPIOs, then the initial rate if one is set.
    pub fn probe(i2c: I2C, board: &BoardConfig) -> Result<Self, Error<E>> {
        let mut dev = Idt8t49n24x::new(i2c, board.address, board.profile()).with_retries(board.retries);

        debug!("initialize 8T49N24x at {:#04x} with default values", board.address);
        dev.init()?;
        dev.enable_lol_gpio()?;

        if let Some(f_out) = board.clock_frequency {
            dev.set_rate(f_out)?;
        }
        Ok(dev)
    }

    /// Gives the bus back
    pub fn release(self: Self) -> I2C {
        self.i2c
    }

    pub fn profile(self: &Self) -> &ChipProfile {
        &self.profile
    }

    /// Reads one register.
    pub fn read_register(self: &mut Self, addr: u16) -> Result<u8, Error<E>> {
        let address = self.address;
        let mut buf = [0u8];
        self.retry(addr, |i2c| i2c.write_read(address, &addr.to_be_bytes(), &mut buf))?;
        trace!("read {:#06x} -> {:#04x}", addr, buf[0]);
        Ok(buf[0])
    }

    /// Writes one register.
    pub fn write_register(self: &mut Self, addr: u16, value: u8) -> Result<(), Error<E>> {
        let address = self.address;
        let [hi, lo] = addr.to_be_bytes();
        trace!("write {:#06x} <- {:#04x}", addr, value);
        self.retry(addr, |i2c| i2c.write(address, &[hi, lo, value]))
    }

    /// Read-modify-write of the `mask` bits.
    pub fn update_register(self: &mut Self, addr: u16, value: u8, mask: u8) -> Result<(), Error<E>> {
        let data = self.read_register(addr)?;
        self.write_register(addr, (data & !mask) | (value & mask))
    }

    /// Applies `ops` in order, stopping at the first failure.
    ///
    /// Nothing after a failed op is written, so a sequence that held off
    /// calibration leaves it held off.
    pub fn apply<I>(self: &mut Self, ops: I) -> Result<(), Error<E>>
    where I: IntoIterator<Item = RegisterOp>,
    {
        for op in ops {
            let res = match op {
                RegisterOp::Write { addr, value } => self.write_register(addr, value),
                RegisterOp::Update { addr, value, mask } => self.update_register(addr, value, mask),
            };
            if let Err(e) = res {
                error!("register sequence aborted at {:#06x}, calibration left as is", op.addr());
                return Err(e);
            }
        }
        Ok(())
    }

    /// Writes the default jitter attenuator configuration.
    pub fn init(self: &mut Self) -> Result<(), Error<E>> {
        self.apply(init_sequence())
    }

    /// Loss-of-lock status on the GPIO pins
    pub fn enable_lol_gpio(self: &mut Self) -> Result<(), Error<E>> {
        self.apply(LOL_GPIO_ENABLE)
    }

    /// Selects free running synthesizer or jitter attenuator operation.
    pub fn set_mode(self: &mut Self, mode: SynthMode) -> Result<(), Error<E>> {
        debug!("mode {:?}", mode);
        self.apply(mode_ops(mode))
    }

    pub fn set_ref_input(self: &mut Self, input: RefInput, enable: bool) -> Result<(), Error<E>> {
        self.apply([ref_input_op(input, enable)])
    }

    /// Plans and programs `request`. Nothing is written if planning fails.
    pub fn program(self: &mut Self, request: &FrequencyRequest) -> Result<SynthesizerSettings, Error<E>> {
        let settings = plan(&self.profile, request)?;
        self.apply(settings_sequence(&settings))?;
        debug!("{} Hz programmed", request.freq_out);
        Ok(settings)
    }

    /// Free running synthesizer producing `freq_out` on Q2/Q3 from `freq_in`.
    pub fn set_clock(self: &mut Self, freq_in: u32, freq_out: u32) -> Result<SynthesizerSettings, Error<E>> {
        self.program(&FrequencyRequest::new(freq_in, freq_out))
    }

    /// `set_clock` with the crystal as input
    pub fn set_rate(self: &mut Self, freq_out: u32) -> Result<SynthesizerSettings, Error<E>> {
        self.set_clock(self.profile.xtal_hz, freq_out)
    }

    fn retry<T, F>(self: &mut Self, addr: u16, mut f: F) -> Result<T, Error<E>>
    where F: FnMut(&mut I2C) -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            match f(&mut self.i2c) {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!("i2c access {:#06x} failed ({:?}), retry {}", addr, e, attempt);
                }
                Err(e) => {
                    debug!("i2c access {:#06x} failed: {:?}", addr, e);
                    return Err(Error::Transport(e));
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    #[derive(Debug, Copy, Clone, PartialEq)]
    struct Nak;

    /// Register file behind a fake bus
    struct FakeBus {
        address: u8,
        regs: [u8; 0x100],
        writes: Vec<(u16, u8)>,
        /// Accesses left before the bus starts failing
        fail_after: Option<usize>,
        /// Fail this many accesses, then recover
        flaky: usize,
        accesses: usize,
    }

    impl FakeBus {
        fn new() -> Self {
            FakeBus {
                address: I2C_ADDRESS,
                regs: [0; 0x100],
                writes: Vec::new(),
                fail_after: None,
                flaky: 0,
                accesses: 0,
            }
        }

        fn access(&mut self, address: u8) -> Result<(), Nak> {
            assert_eq!(address, self.address);
            self.accesses += 1;
            if self.flaky > 0 {
                self.flaky -= 1;
                return Err(Nak);
            }
            match self.fail_after {
                Some(n) if self.accesses > n => Err(Nak),
                _ => Ok(()),
            }
        }

        fn reg(&self, addr: u16) -> u8 {
            self.regs[addr as usize]
        }
    }

    impl Write for FakeBus {
        type Error = Nak;

        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Nak> {
            self.access(address)?;
            let addr = u16::from_be_bytes([bytes[0], bytes[1]]);
            self.regs[addr as usize] = bytes[2];
            self.writes.push((addr, bytes[2]));
            Ok(())
        }
    }

    impl WriteRead for FakeBus {
        type Error = Nak;

        fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Nak> {
            self.access(address)?;
            let addr = u16::from_be_bytes([bytes[0], bytes[1]]);
            buffer[0] = self.regs[addr as usize];
            Ok(())
        }
    }

    fn device(bus: FakeBus) -> Idt8t49n24x<FakeBus> {
        Idt8t49n24x::new(bus, I2C_ADDRESS, ChipProfile::IDT_8T49N24X)
    }

    #[test]
    fn set_rate_programs_dividers() {
        let mut dev = device(FakeBus::new());
        let s = dev.set_rate(148_500_000).unwrap();
        assert_eq!(s.vco.vco_freq, 3_564_000_000);

        let bus = dev.release();
        assert_eq!(bus.writes.first(), Some(&(CALIBRATION, CALIBRATION_HOLD)));
        assert_eq!(bus.writes.last(), Some(&(CALIBRATION, CALIBRATION_RUN)));

        // free run, both references off, synthesizer mode
        assert_eq!(bus.reg(DPLL_CTRL) & 0x33, 0x31);
        assert_eq!(bus.reg(APLL_CTRL) & 0x08, 0x08);
        // PRE0 = 320, DSM_INT = 44, N_Q3 = 12, LOS1 = 14
        assert_eq!([bus.reg(0x000b), bus.reg(0x000c), bus.reg(0x000d)], [0x00, 0x01, 0x40]);
        assert_eq!(bus.reg(0x0026), 44);
        assert_eq!(bus.reg(0x004a), 12);
        assert_eq!(bus.reg(0x0076), 14);
    }

    #[test]
    fn rejected_request_touches_nothing() {
        let mut dev = device(FakeBus::new());
        assert_eq!(
            dev.set_clock(XTAL_FREQ, FOUT_MAX + 1).unwrap_err(),
            Error::Plan(PlanError::OutOfRange { freq_in: XTAL_FREQ, freq_out: FOUT_MAX + 1 })
        );
        assert!(dev.release().writes.is_empty());
    }

    #[test]
    fn transport_failure_keeps_calibration_held() {
        let mut bus = FakeBus::new();
        bus.fail_after = Some(10);
        let mut dev = device(bus);

        assert_eq!(dev.set_rate(148_500_000).unwrap_err(), Error::Transport(Nak));
        let bus = dev.release();
        assert_eq!(bus.reg(CALIBRATION), CALIBRATION_HOLD);
        assert!(!bus.writes.contains(&(CALIBRATION, CALIBRATION_RUN)));
    }

    #[test]
    fn bounded_retries() {
        let mut bus = FakeBus::new();
        bus.flaky = 2;
        let mut dev = device(bus).with_retries(2);
        dev.write_register(0x0030, 0x0f).unwrap();
        assert_eq!(dev.read_register(0x0030).unwrap(), 0x0f);

        let mut bus = dev.release();
        bus.flaky = 3;
        let mut dev = device(bus).with_retries(2);
        assert_eq!(dev.write_register(0x0030, 0x00), Err(Error::Transport(Nak)));
    }

    #[test]
    fn update_keeps_other_bits() {
        let mut bus = FakeBus::new();
        bus.regs[DPLL_CTRL as usize] = 0xc4;
        let mut dev = device(bus);

        dev.set_ref_input(RefInput::Clk1, false).unwrap();
        dev.set_mode(SynthMode::JitterAttenuator).unwrap();
        assert_eq!(dev.read_register(DPLL_CTRL).unwrap(), 0xe4);

        dev.set_mode(SynthMode::FreeRun).unwrap();
        assert_eq!(dev.read_register(DPLL_CTRL).unwrap(), 0xf5);
        assert_eq!(dev.read_register(APLL_CTRL).unwrap(), 0x08);
    }

    #[test]
    fn probe_with_initial_rate() {
        let board = BoardConfig {
            clock_frequency: Some(297_000_000),
            ..BoardConfig::default()
        };
        let dev = Idt8t49n24x::probe(FakeBus::new(), &board).unwrap();
        let bus = dev.release();

        // default table, then LOL GPIOs, then the rate change
        assert_eq!(bus.writes[1], (DEFAULT_CONFIG_START, DEFAULT_CONFIG[8]));
        assert!(bus.writes.contains(&(0x0036, 0x0f)));
        assert_eq!(bus.reg(0x0047), 6);
        assert_eq!(bus.writes.last(), Some(&(CALIBRATION, CALIBRATION_RUN)));
    }
}
