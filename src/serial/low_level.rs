use std::ops::{
	Deref,
	DerefMut,
};
use std::time::Instant;

use super::{
	Address,
	Command,
	Hardware,
	ADDRESS_WIDTH,
	WORD_WIDTH,
};

/// Outcome of polling DO after a write/erase instruction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Readiness {
	Ready { polls: u32 },
	Busy { polls: u32 },
}

/// Keeps CS up; dropping it ends the instruction (CS down, then DATA down).
pub struct Transaction<'a, H: ?Sized + LowLevel + 'a>(&'a mut H);

impl<'a, H: ?Sized + LowLevel> Drop for Transaction<'a, H> {
	fn drop(&mut self) {
		self.0._finish_transaction();
	}
}

impl<'a, H: ?Sized + LowLevel> Deref for Transaction<'a, H> {
	type Target = H;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<'a, H: ?Sized + LowLevel> DerefMut for Transaction<'a, H> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

trait InternalLowLevel: Hardware {
	// CLK must be low before CS goes up
	fn _start_transaction(&mut self) {
		self.set_clock(false);
		self.delay();
		self.set_chip_select(true);
		self.delay();
	}

	fn _finish_transaction(&mut self) {
		self.set_chip_select(false);
		self.delay();
		self.set_data_in(false);
		self.delay();
	}

	// with DATA low there is no start bit; the device shows READY/BUSY on DO
	// as long as CS is up
	fn _select_for_status(&mut self) {
		self.set_data_in(false);
		self.set_clock(false);
		self.delay();
		self.set_chip_select(true);
		self.delay();
	}
}

impl<H: Hardware + ?Sized> InternalLowLevel for H {
}

pub trait LowLevel: Hardware {
	// safe idle state: nothing selected, all outputs low
	fn idle(&mut self) {
		self.set_chip_select(false);
		self.set_clock(false);
		self.set_data_in(false);
	}

	// send `count` lowest bits from `value`, starting with highest bit.
	//
	// DATA only changes while CLK is low; the device latches it on the rising
	// CLK edge.
	fn transmit_bits(&mut self, value: u32, count: usize) {
		debug_assert!(count <= 32);
		if 0 == count {
			return;
		}
		for bit in (0..count).rev() {
			self.set_clock(false);
			self.delay();
			self.set_data_in(0 != value & (1u32 << bit));
			self.delay();
			self.set_clock(true);
			self.delay();
		}
		self.set_clock(false);
		self.delay();
	}

	fn transmit_address(&mut self, address: Address) {
		self.transmit_bits(address.value().into(), ADDRESS_WIDTH);
	}

	fn transmit_word(&mut self, word: u16) {
		self.transmit_bits(word.into(), WORD_WIDTH);
	}

	// read 16-bit word, starting with highest bit.
	//
	// the device shifts out the next bit on the rising CLK edge; sample it
	// after CLK went down again.
	fn receive_word(&mut self) -> u16 {
		self.set_data_in(false);
		let mut result = 0u16;
		for _ in 0..WORD_WIDTH {
			self.set_clock(true);
			self.delay();
			self.set_clock(false);
			self.delay();
			result = (result << 1) | (self.read_data_out() as u16);
		}
		result
	}

	// start bit, opcode and (for opcode 0b00) function code + don't care bits
	fn send_command(&mut self, command: Command) {
		self.transmit_bits(0b1, 1);
		self.transmit_bits(command.opcode().into(), 2);
		if let Some(function) = command.function() {
			self.transmit_bits(function.into(), 2);
			self.transmit_bits(0b0000, ADDRESS_WIDTH - 2);
		}
	}

	fn start_transaction(&mut self) -> Transaction<'_, Self> {
		self._start_transaction();

		Transaction(self)
	}

	// single status sample; no clocking
	fn check_ready(&mut self) -> bool {
		self._select_for_status();
		let ready = self.read_data_out();
		self.set_chip_select(false);
		self.delay();
		ready
	}

	// pulse CLK with CS up until DO goes HIGH, or `max_polls` cycles (or the
	// deadline) passed.  CS is down again in both cases.
	fn poll_ready(&mut self, max_polls: u32, deadline: Option<Instant>) -> Readiness {
		self._select_for_status();

		let mut polls = 0u32;
		while polls < max_polls {
			polls += 1;
			self.set_clock(true);
			self.delay();
			if self.read_data_out() {
				self.set_clock(false);
				self.delay();
				self.set_chip_select(false);
				self.delay();
				return Readiness::Ready { polls };
			}
			self.set_clock(false);
			self.delay();

			if let Some(deadline) = deadline {
				if Instant::now() >= deadline {
					break;
				}
			}
		}

		self.set_chip_select(false);
		self.delay();
		Readiness::Busy { polls }
	}
}

impl<H: Hardware + ?Sized> LowLevel for H {
}
