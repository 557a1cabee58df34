use std::time::{
	Duration,
	Instant,
};

use crate::error::EepromError;

use super::{
	Address,
	Command,
	Hardware,
	LowLevel,
	Readiness,
	ADDRESS_LIMIT,
};

/// Limits for the READY/BUSY poll after write/erase instructions.
///
/// The poll gives up after `max_polls` clock cycles, or once `timeout` has
/// elapsed, whichever comes first.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ReadyPolling {
	pub max_polls: u32,
	pub timeout: Option<Duration>,
}

impl Default for ReadyPolling {
	fn default() -> Self {
		ReadyPolling {
			max_polls: 40_000,
			timeout: None,
		}
	}
}

/// Driver for a 93LC46B (64 x 16 bit) on a bit-banged Microwire bus.
///
/// Every operation is a complete instruction: CS is raised at the start and
/// dropped again before returning, and all outputs end up low.  The driver
/// itself doesn't track any device state.
pub struct Eeprom<H: Hardware> {
	hardware: H,
	polling: ReadyPolling,
}

impl<H: Hardware> Eeprom<H> {
	pub fn new(hardware: H) -> Self {
		let mut ee = Eeprom {
			hardware,
			polling: ReadyPolling::default(),
		};
		ee.initialize();
		ee
	}

	pub fn with_polling(mut self, polling: ReadyPolling) -> Self {
		self.polling = polling;
		self
	}

	pub fn polling(&self) -> ReadyPolling {
		self.polling
	}

	pub fn hardware(&mut self) -> &mut H {
		&mut self.hardware
	}

	/// Leave the bus idle and hand back the pins.
	pub fn release(mut self) -> H {
		self.initialize();
		self.hardware
	}

	pub fn initialize(&mut self) {
		self.hardware.idle();
	}

	fn simple_command(&mut self, command: Command) {
		trace!("EEPROM {}", command);
		let mut tx = self.hardware.start_transaction();
		tx.send_command(command);
	}

	/// EWEN: allow erase/write instructions until the next EWDS.
	pub fn write_enable(&mut self) {
		self.simple_command(Command::EraseWriteEnable);
	}

	/// EWDS: write protect the device.
	pub fn write_disable(&mut self) {
		self.simple_command(Command::EraseWriteDisable);
	}

	/// Reads the word at `address`.
	///
	/// There is no way to tell a missing/miswired chip from real data; verify
	/// by reading back written data if that matters.
	pub fn read(&mut self, address: Address) -> u16 {
		let mut tx = self.hardware.start_transaction();
		tx.send_command(Command::Read);
		tx.transmit_address(address);
		let word = tx.receive_word();
		trace!("EEPROM READ @{}: {:04x}", address, word);
		word
	}

	/// Reads every word with its own READ instruction.
	pub fn read_all(&mut self) -> [u16; ADDRESS_LIMIT] {
		let mut words = [0u16; ADDRESS_LIMIT];
		for address in Address::all() {
			words[address.index()] = self.read(address);
		}
		words
	}

	/// Sequential read starting at `start`; wraps around after the last word.
	///
	/// Uses a single READ instruction and keeps clocking; not verified on
	/// hardware.
	pub fn read_many(&mut self, start: Address, target: &mut [u16]) {
		if target.is_empty() {
			return;
		}
		debug!("EEPROM sequential READ of {} words @{}", target.len(), start);
		let mut tx = self.hardware.start_transaction();
		tx.send_command(Command::Read);
		tx.transmit_address(start);
		for word in target.iter_mut() {
			*word = tx.receive_word();
		}
	}

	/// Poll READY/BUSY until the device finished its internal write cycle.
	pub fn wait_ready(&mut self) -> Result<(), EepromError> {
		let deadline = self.polling.timeout.map(|timeout| Instant::now() + timeout);
		match self.hardware.poll_ready(self.polling.max_polls, deadline) {
			Readiness::Ready { polls } => {
				trace!("EEPROM ready after {} polls", polls);
				Ok(())
			},
			Readiness::Busy { polls } => {
				warn!("EEPROM still busy after {} polls", polls);
				Err(EepromError::Timeout { polls })
			},
		}
	}

	/// Single READY/BUSY sample without waiting.
	pub fn check_ready(&mut self) -> bool {
		self.hardware.check_ready()
	}

	/// EWEN now, EWDS when the returned guard is dropped.
	pub fn start_programming(&mut self) -> ProgrammingEnabled<'_, H> {
		self.write_enable();
		ProgrammingEnabled(self)
	}

	/// EWEN, WRITE, wait for READY, EWDS.
	///
	/// EWDS is sent even if the device didn't get ready; a `Timeout` means
	/// the word might not have been written.
	pub fn write(&mut self, address: Address, word: u16) -> Result<(), EepromError> {
		self.start_programming().write(address, word)
	}

	/// Writes consecutive words starting at `start` (wrapping after the last
	/// word) within a single EWEN/EWDS bracket; stops at the first timeout.
	pub fn write_many(&mut self, start: Address, words: &[u16]) -> Result<(), EepromError> {
		if words.len() > ADDRESS_LIMIT {
			return Err(EepromError::TooManyWords {
				count: words.len(),
				words: ADDRESS_LIMIT,
			});
		}
		debug!("EEPROM writing {} words @{}", words.len(), start);
		let mut prog = self.start_programming();
		for (offset, &word) in words.iter().enumerate() {
			prog.write(start.wrapping_add(offset), word)?;
		}
		Ok(())
	}

	/// ERASE: set the word at `address` to 0xffff.  Not verified on hardware.
	pub fn erase(&mut self, address: Address) -> Result<(), EepromError> {
		self.start_programming().erase(address)
	}

	/// ERAL: set all words to 0xffff.  Not verified on hardware.
	pub fn erase_all(&mut self) -> Result<(), EepromError> {
		self.start_programming().erase_all()
	}

	/// WRAL: write `word` to all addresses.  Not verified on hardware.
	pub fn write_all(&mut self, word: u16) -> Result<(), EepromError> {
		self.start_programming().write_all(word)
	}
}

/// Erase/write enabled device; sends EWDS on drop.
pub struct ProgrammingEnabled<'a, H: Hardware + 'a>(&'a mut Eeprom<H>);

impl<'a, H: Hardware + 'a> Drop for ProgrammingEnabled<'a, H> {
	fn drop(&mut self) {
		self.0.write_disable();
	}
}

impl<'a, H: Hardware + 'a> ProgrammingEnabled<'a, H> {
	fn program(&mut self, command: Command, address: Option<Address>, data: Option<u16>) {
		debug!("EEPROM {} (address: {:?}, data: {:04x?})", command, address, data);
		let mut tx = self.0.hardware.start_transaction();
		tx.send_command(command);
		if let Some(address) = address {
			tx.transmit_address(address);
		}
		if let Some(word) = data {
			tx.transmit_word(word);
		}
	}

	/// WRITE instruction only; the device is busy afterwards until
	/// `wait_ready` says otherwise.
	pub fn write_no_wait(&mut self, address: Address, word: u16) {
		self.program(Command::Write, Some(address), Some(word));
	}

	pub fn write(&mut self, address: Address, word: u16) -> Result<(), EepromError> {
		self.write_no_wait(address, word);
		self.wait_ready()
	}

	pub fn erase(&mut self, address: Address) -> Result<(), EepromError> {
		self.program(Command::Erase, Some(address), None);
		self.wait_ready()
	}

	pub fn erase_all(&mut self) -> Result<(), EepromError> {
		self.program(Command::EraseAll, None, None);
		self.wait_ready()
	}

	pub fn write_all(&mut self, word: u16) -> Result<(), EepromError> {
		self.program(Command::WriteAll, None, Some(word));
		self.wait_ready()
	}

	pub fn wait_ready(&mut self) -> Result<(), EepromError> {
		self.0.wait_ready()
	}

	pub fn read(&mut self, address: Address) -> u16 {
		self.0.read(address)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::sim::{
		Event,
		SimulatedEeprom,
	};

	fn addr(address: usize) -> Address {
		Address::new(address).unwrap()
	}

	fn zeroed() -> Eeprom<SimulatedEeprom> {
		Eeprom::new(SimulatedEeprom::with_memory([0u16; ADDRESS_LIMIT]).with_trace())
	}

	// every CS assert is matched by a deassert, and CS/CLK/DATA all end low
	fn assert_balanced(trace: &[Event]) {
		let mut selected = false;
		for event in trace {
			if let Event::ChipSelect(active) = *event {
				assert_ne!(selected, active, "CS set to {} twice in a row", active);
				selected = active;
			}
		}
		assert!(!selected, "CS still asserted at end of operation");
	}

	#[test]
	fn write_then_read_back() {
		let mut ee = zeroed();
		ee.write(addr(5), 0x1234).unwrap();
		assert_eq!(ee.read(addr(5)), 0x1234);
		assert_eq!(ee.read(addr(6)), 0x0000);
	}

	#[test]
	fn write_read_all_addresses() {
		let mut ee = zeroed();
		for &pattern in [0x0000u16, 0xffff, 0xa5a5, 0x0001, 0x8000].iter() {
			for address in Address::all() {
				let word = pattern ^ (address.value() as u16) << 4;
				ee.write(address, word).unwrap();
				assert_eq!(ee.read(address), word, "read back @{}", address);
			}
		}
		assert!(!ee.hardware().is_write_enabled());
	}

	#[test]
	fn every_operation_releases_chip_select() {
		let mut ee = zeroed();
		ee.hardware().take_trace();

		ee.write_enable();
		assert_balanced(&ee.hardware().take_trace());
		ee.write_disable();
		assert_balanced(&ee.hardware().take_trace());
		ee.read(addr(1));
		assert_balanced(&ee.hardware().take_trace());
		ee.write(addr(1), 0xbeef).unwrap();
		assert_balanced(&ee.hardware().take_trace());
		ee.wait_ready().unwrap();
		assert_balanced(&ee.hardware().take_trace());
		ee.check_ready();
		assert_balanced(&ee.hardware().take_trace());
		ee.erase(addr(1)).unwrap();
		assert_balanced(&ee.hardware().take_trace());
		ee.erase_all().unwrap();
		assert_balanced(&ee.hardware().take_trace());
		ee.write_all(0x0f0f).unwrap();
		assert_balanced(&ee.hardware().take_trace());
		let mut buf = [0u16; 3];
		ee.read_many(addr(62), &mut buf);
		assert_balanced(&ee.hardware().take_trace());

		let lines = ee.hardware().lines();
		assert!(!lines.chip_select && !lines.clock && !lines.data_in);
	}

	#[test]
	fn wait_ready_times_out_when_stuck_busy() {
		let sim = SimulatedEeprom::with_memory([0u16; ADDRESS_LIMIT]).stuck_busy().with_trace();
		let mut ee = Eeprom::new(sim).with_polling(ReadyPolling {
			max_polls: 100,
			timeout: None,
		});
		ee.hardware().take_trace();
		assert_eq!(ee.write(addr(3), 0x4242), Err(EepromError::Timeout { polls: 100 }));

		// EWEN, WRITE, poll, EWDS (which the busy device ignores, but it went out)
		let trace = ee.hardware().take_trace();
		let selects = trace.iter().filter(|&&e| e == Event::ChipSelect(true)).count();
		assert_eq!(selects, 4);
		assert_balanced(&trace);
		assert!(!ee.hardware().lines().chip_select);
	}

	#[test]
	fn wait_ready_honors_deadline() {
		let sim = SimulatedEeprom::new().stuck_busy();
		let mut ee = Eeprom::new(sim).with_polling(ReadyPolling {
			max_polls: u32::max_value(),
			timeout: Some(Duration::from_millis(5)),
		});
		ee.hardware().start_busy();
		match ee.wait_ready() {
			Err(EepromError::Timeout { polls }) => assert!(polls >= 1),
			other => panic!("expected timeout, got {:?}", other),
		}
	}

	#[test]
	fn wait_ready_returns_as_soon_as_ready() {
		for &busy_ticks in [0usize, 1, 2, 7, 100, 1_000].iter() {
			let sim = SimulatedEeprom::new().with_busy_ticks(busy_ticks).with_trace();
			let mut ee = Eeprom::new(sim);
			ee.hardware().start_busy();
			ee.hardware().take_trace();
			ee.wait_ready().unwrap();

			let trace = ee.hardware().take_trace();
			let samples: Vec<bool> = trace.iter().filter_map(|e| match *e {
				Event::Sample(level) => Some(level),
				_ => None,
			}).collect();
			// only the last sample saw READY
			assert_eq!(samples.last(), Some(&true), "busy for {} ticks", busy_ticks);
			assert!(samples[..samples.len() - 1].iter().all(|&s| !s), "busy for {} ticks", busy_ticks);
		}
	}

	#[test]
	fn write_uses_exactly_one_enable_bracket() {
		let mut ee = zeroed();
		ee.write_enable();
		ee.write(addr(9), 0x1111).unwrap();
		ee.write_disable();
		assert!(!ee.hardware().is_write_enabled());

		// WRITE instruction without EWEN must be ignored by the device
		{
			let mut tx = ee.hardware().start_transaction();
			tx.send_command(Command::Write);
			tx.transmit_address(addr(9));
			tx.transmit_word(0x2222);
		}
		ee.wait_ready().unwrap();
		assert_eq!(ee.hardware().rejected_programs(), 1);
		assert_eq!(ee.read(addr(9)), 0x1111);
	}

	#[test]
	fn write_no_wait_inside_bracket() {
		let mut ee = zeroed();
		{
			let mut prog = ee.start_programming();
			prog.write_no_wait(addr(2), 0xcafe);
			prog.wait_ready().unwrap();
			assert_eq!(prog.read(addr(2)), 0xcafe);
		}
		assert!(!ee.hardware().is_write_enabled());
	}

	#[test]
	fn erase_instructions() {
		let mut ee = zeroed();
		ee.write(addr(4), 0x0101).unwrap();
		ee.erase(addr(4)).unwrap();
		assert_eq!(ee.read(addr(4)), 0xffff);
		assert_eq!(ee.read(addr(5)), 0x0000);

		ee.write_all(0x3c3c).unwrap();
		assert!(ee.hardware().memory().iter().all(|&w| w == 0x3c3c));

		ee.erase_all().unwrap();
		assert!(ee.hardware().memory().iter().all(|&w| w == 0xffff));
		assert!(!ee.hardware().is_write_enabled());
	}

	#[test]
	fn sequential_read_wraps() {
		let mut memory = [0u16; ADDRESS_LIMIT];
		for (i, word) in memory.iter_mut().enumerate() {
			*word = 0x100 + i as u16;
		}
		let mut ee = Eeprom::new(SimulatedEeprom::with_memory(memory));
		let mut buf = [0u16; 4];
		ee.read_many(addr(62), &mut buf);
		assert_eq!(buf, [0x13e, 0x13f, 0x100, 0x101]);
	}

	#[test]
	fn read_all_uses_one_instruction_per_word() {
		let mut memory = [0u16; ADDRESS_LIMIT];
		for (i, word) in memory.iter_mut().enumerate() {
			*word = 0xa000 | i as u16;
		}
		let mut ee = Eeprom::new(SimulatedEeprom::with_memory(memory).with_trace());
		ee.hardware().take_trace();
		let words = ee.read_all();
		assert_eq!(&words[..], &memory[..]);

		let trace = ee.hardware().take_trace();
		let selects = trace.iter().filter(|&&e| e == Event::ChipSelect(true)).count();
		assert_eq!(selects, ADDRESS_LIMIT);
		assert_balanced(&trace);
	}

	#[test]
	fn borrowed_hardware_stays_with_caller() {
		let mut sim = SimulatedEeprom::with_memory([0u16; ADDRESS_LIMIT]);
		{
			let mut ee = Eeprom::new(&mut sim);
			ee.write(addr(12), 0x0c0c).unwrap();
			assert_eq!(ee.read(addr(12)), 0x0c0c);
		}
		assert_eq!(sim.memory()[12], 0x0c0c);
		assert!(!sim.is_write_enabled());
		assert!(!sim.lines().chip_select);
	}

	#[test]
	fn write_many_wraps_and_limits() {
		let mut ee = zeroed();
		ee.write_many(addr(63), &[0xaaaa, 0xbbbb]).unwrap();
		assert_eq!(ee.read(addr(63)), 0xaaaa);
		assert_eq!(ee.read(addr(0)), 0xbbbb);
		assert!(!ee.hardware().is_write_enabled());

		let too_many = [0u16; ADDRESS_LIMIT + 1];
		assert_eq!(
			ee.write_many(addr(0), &too_many),
			Err(EepromError::TooManyWords { count: 65, words: 64 })
		);
	}

	#[test]
	fn write_many_stops_at_first_timeout() {
		let sim = SimulatedEeprom::with_memory([0u16; ADDRESS_LIMIT]).stuck_busy();
		let mut ee = Eeprom::new(sim).with_polling(ReadyPolling {
			max_polls: 10,
			timeout: None,
		});
		assert!(ee.write_many(addr(0), &[1, 2, 3]).is_err());
		// the device stayed busy, so the following WRITEs never reached it
		assert_eq!(ee.hardware().memory()[0], 1);
		assert_eq!(ee.hardware().memory()[1], 0);
		assert!(!ee.hardware().lines().chip_select);
	}

	#[test]
	fn release_leaves_bus_idle() {
		let mut ee = zeroed();
		ee.write(addr(0), 0x5555).unwrap();
		let sim = ee.release();
		let lines = sim.lines();
		assert!(!lines.chip_select && !lines.clock && !lines.data_in);
	}
}
