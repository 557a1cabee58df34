//! Behavioral model of a 93LC46B sitting on the other end of the pins.
//!
//! Reacts to rising CLK edges while CS is up the way the chip does: start
//! bit, opcode, address, data; READ shifts out a dummy "0" followed by the
//! data (and continues with the next word if clocking goes on); programming
//! instructions run when CS drops, but only after EWEN.  The write cycle
//! keeps the chip BUSY for a number of `delay()` calls.

use crate::serial::{
	Command,
	Hardware,
	ADDRESS_LIMIT,
	ADDRESS_WIDTH,
	WORD_WIDTH,
};

/// One call into the `Hardware` interface.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Event {
	Clock(bool),
	DataIn(bool),
	ChipSelect(bool),
	// value returned from `read_data_out`
	Sample(bool),
	Delay,
}

/// Levels currently driven by the host.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Lines {
	pub clock: bool,
	pub data_in: bool,
	pub chip_select: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Program {
	Write(u8, u16),
	Erase(u8),
	EraseAll,
	WriteAll(u16),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	// waiting for start bit
	Idle,
	// opcode + address bits
	Instruction { bits: u8, count: usize },
	Data { command: Command, address: u8, bits: u16, count: usize },
	Output { address: u8, word: u16, count: usize },
	// run when CS drops
	Complete(Option<Program>),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Busy {
	Ready,
	For(usize),
	Forever,
}

pub struct SimulatedEeprom {
	memory: [u16; ADDRESS_LIMIT],
	write_enabled: bool,
	lines: Lines,
	data_out: bool,
	state: State,
	busy: Busy,
	busy_ticks: usize,
	stuck_busy: bool,
	rejected_programs: usize,
	trace: Option<Vec<Event>>,
}

impl Default for SimulatedEeprom {
	fn default() -> Self {
		SimulatedEeprom::new()
	}
}

impl SimulatedEeprom {
	/// Fresh chip: all words erased (0xffff), write protected.
	pub fn new() -> Self {
		SimulatedEeprom::with_memory([0xffff; ADDRESS_LIMIT])
	}

	pub fn with_memory(memory: [u16; ADDRESS_LIMIT]) -> Self {
		SimulatedEeprom {
			memory,
			write_enabled: false,
			lines: Lines::default(),
			data_out: true,
			state: State::Idle,
			busy: Busy::Ready,
			busy_ticks: 20,
			stuck_busy: false,
			rejected_programs: 0,
			trace: None,
		}
	}

	/// Number of `delay()` calls a write cycle keeps the chip busy.
	pub fn with_busy_ticks(mut self, ticks: usize) -> Self {
		self.busy_ticks = ticks;
		self
	}

	/// Write cycles never finish.
	pub fn stuck_busy(mut self) -> Self {
		self.stuck_busy = true;
		self
	}

	/// Record every call in a trace (see `take_trace`).
	pub fn with_trace(mut self) -> Self {
		self.trace = Some(Vec::new());
		self
	}

	pub fn memory(&self) -> &[u16; ADDRESS_LIMIT] {
		&self.memory
	}

	pub fn is_write_enabled(&self) -> bool {
		self.write_enabled
	}

	pub fn is_busy(&self) -> bool {
		self.busy != Busy::Ready
	}

	/// Programming instructions dropped because of write protection.
	pub fn rejected_programs(&self) -> usize {
		self.rejected_programs
	}

	pub fn lines(&self) -> Lines {
		self.lines
	}

	pub fn take_trace(&mut self) -> Vec<Event> {
		match self.trace {
			Some(ref mut trace) => std::mem::replace(trace, Vec::new()),
			None => Vec::new(),
		}
	}

	/// Enter a write cycle as if a programming instruction just finished.
	pub fn start_busy(&mut self) {
		self.busy = if self.stuck_busy {
			Busy::Forever
		} else if 0 == self.busy_ticks {
			Busy::Ready
		} else {
			Busy::For(self.busy_ticks)
		};
	}

	fn record(&mut self, event: Event) {
		if let Some(ref mut trace) = self.trace {
			trace.push(event);
		}
	}

	fn decode(&mut self, bits: u8) -> State {
		let address = bits & (ADDRESS_LIMIT as u8 - 1);
		let command = Command::decode(bits >> ADDRESS_WIDTH, address);
		match command {
			Command::Read => {
				// dummy zero
				self.data_out = false;
				State::Output {
					address,
					word: self.memory[address as usize],
					count: 0,
				}
			},
			Command::Write | Command::WriteAll => State::Data {
				command,
				address,
				bits: 0,
				count: 0,
			},
			Command::Erase => State::Complete(Some(Program::Erase(address))),
			Command::EraseAll => State::Complete(Some(Program::EraseAll)),
			Command::EraseWriteEnable => {
				self.write_enabled = true;
				State::Complete(None)
			},
			Command::EraseWriteDisable => {
				self.write_enabled = false;
				State::Complete(None)
			},
		}
	}

	// rising CLK with CS up
	fn clock_edge(&mut self) {
		let data_in = self.lines.data_in;
		self.state = match self.state {
			State::Idle => {
				if data_in && !self.is_busy() {
					State::Instruction { bits: 0, count: 0 }
				} else {
					State::Idle
				}
			},
			State::Instruction { bits, count } => {
				let bits = (bits << 1) | data_in as u8;
				let count = count + 1;
				if count < 2 + ADDRESS_WIDTH {
					State::Instruction { bits, count }
				} else {
					self.decode(bits)
				}
			},
			State::Data { command, address, bits, count } => {
				let bits = (bits << 1) | data_in as u16;
				let count = count + 1;
				if count < WORD_WIDTH {
					State::Data { command, address, bits, count }
				} else if command == Command::WriteAll {
					State::Complete(Some(Program::WriteAll(bits)))
				} else {
					State::Complete(Some(Program::Write(address, bits)))
				}
			},
			State::Output { address, word, count } => {
				let (address, word, count) = if count == WORD_WIDTH {
					let next = (address + 1) % ADDRESS_LIMIT as u8;
					(next, self.memory[next as usize], 0)
				} else {
					(address, word, count)
				};
				self.data_out = 0 != word & 0x8000;
				State::Output {
					address,
					word: word << 1,
					count: count + 1,
				}
			},
			State::Complete(program) => State::Complete(program),
		};
	}

	// CS dropped
	fn finish_instruction(&mut self) {
		if let State::Complete(Some(program)) = self.state {
			if self.write_enabled {
				match program {
					Program::Write(address, word) => self.memory[address as usize] = word,
					Program::Erase(address) => self.memory[address as usize] = 0xffff,
					Program::EraseAll => self.memory = [0xffff; ADDRESS_LIMIT],
					Program::WriteAll(word) => self.memory = [word; ADDRESS_LIMIT],
				}
				self.start_busy();
			} else {
				self.rejected_programs += 1;
			}
		}
		self.state = State::Idle;
	}
}

impl Hardware for SimulatedEeprom {
	fn set_clock(&mut self, active: bool) {
		self.record(Event::Clock(active));
		let rising = active && !self.lines.clock;
		self.lines.clock = active;
		if rising && self.lines.chip_select {
			self.clock_edge();
		}
	}

	fn set_data_in(&mut self, active: bool) {
		self.record(Event::DataIn(active));
		self.lines.data_in = active;
	}

	fn set_chip_select(&mut self, active: bool) {
		self.record(Event::ChipSelect(active));
		if active && !self.lines.chip_select {
			self.state = State::Idle;
		} else if !active && self.lines.chip_select {
			self.finish_instruction();
		}
		self.lines.chip_select = active;
	}

	fn read_data_out(&mut self) -> bool {
		let level = if !self.lines.chip_select {
			// high impedance, pulled up
			true
		} else {
			match self.state {
				State::Idle => !self.is_busy(),
				State::Output { .. } => self.data_out,
				_ => true,
			}
		};
		self.record(Event::Sample(level));
		level
	}

	fn delay(&mut self) {
		self.record(Event::Delay);
		if let Busy::For(ticks) = self.busy {
			self.busy = if ticks <= 1 { Busy::Ready } else { Busy::For(ticks - 1) };
		}
	}
}
