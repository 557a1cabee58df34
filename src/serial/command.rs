use std::fmt;
use std::str;

use crate::error::EepromError;

pub const ADDRESS_WIDTH: usize = 6;
pub const ADDRESS_LIMIT: usize = 1usize << ADDRESS_WIDTH;
pub const WORD_WIDTH: usize = 16;

/// Word address on the 64 x 16 bit device (0..=63).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Address(u8);

impl Address {
	pub fn new(address: usize) -> Result<Self, EepromError> {
		if address >= ADDRESS_LIMIT {
			return Err(EepromError::AddressOutOfRange {
				address,
				words: ADDRESS_LIMIT,
			});
		}
		Ok(Address(address as u8))
	}

	/// Keep only the low 6 bits, silently dropping everything above.
	pub fn truncate(address: usize) -> Self {
		Address((address & (ADDRESS_LIMIT - 1)) as u8)
	}

	pub fn value(self) -> u8 {
		self.0
	}

	pub fn index(self) -> usize {
		self.0 as usize
	}

	// the device wraps around after the last word during sequential access
	pub fn wrapping_add(self, offset: usize) -> Self {
		Address::truncate(self.index().wrapping_add(offset))
	}

	pub fn all() -> impl Iterator<Item = Address> {
		(0..ADDRESS_LIMIT as u8).map(Address)
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:02x}", self.0)
	}
}

impl str::FromStr for Address {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let address = crate::parse_number(s)?;
		Ok(Address::new(address as usize)?)
	}
}

/// Instructions of the 93LC46B (x16 organization).
///
/// Every instruction starts with a "1" start bit followed by a 2-bit opcode.
/// Opcode 0b00 selects a "function" through the top two address bits; the
/// remaining four address bits are don't-care.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Command {
	Read,
	Write,
	Erase,
	EraseAll,
	WriteAll,
	EraseWriteEnable,
	EraseWriteDisable,
}

impl Command {
	pub fn opcode(self) -> u8 {
		match self {
			Command::Read => 0b10,
			Command::Write => 0b01,
			Command::Erase => 0b11,
			Command::EraseAll
			| Command::WriteAll
			| Command::EraseWriteEnable
			| Command::EraseWriteDisable => 0b00,
		}
	}

	pub fn function(self) -> Option<u8> {
		match self {
			Command::EraseWriteDisable => Some(0b00),
			Command::WriteAll => Some(0b01),
			Command::EraseAll => Some(0b10),
			Command::EraseWriteEnable => Some(0b11),
			Command::Read | Command::Write | Command::Erase => None,
		}
	}

	/// Bits preceding the address/data phase (in wire order, MSB first), and
	/// how many of them there are.
	///
	/// Commands with an address send only start bit + opcode here; function
	/// commands include the 4 don't-care bits (sent as zero).
	pub fn code(self) -> (u16, usize) {
		let head = 0b100 | self.opcode() as u16;
		match self.function() {
			Some(function) => (head << 6 | (function as u16) << 4, 3 + ADDRESS_WIDTH),
			None => (head, 3),
		}
	}

	/// Inverse of the encoding: `opcode` and the 6 address bits following it.
	pub fn decode(opcode: u8, address_bits: u8) -> Command {
		match (opcode & 0b11, (address_bits >> 4) & 0b11) {
			(0b10, _) => Command::Read,
			(0b01, _) => Command::Write,
			(0b11, _) => Command::Erase,
			(_, 0b00) => Command::EraseWriteDisable,
			(_, 0b01) => Command::WriteAll,
			(_, 0b10) => Command::EraseAll,
			(_, _) => Command::EraseWriteEnable,
		}
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let name = match self {
			Command::Read => "READ",
			Command::Write => "WRITE",
			Command::Erase => "ERASE",
			Command::EraseAll => "ERAL",
			Command::WriteAll => "WRAL",
			Command::EraseWriteEnable => "EWEN",
			Command::EraseWriteDisable => "EWDS",
		};
		f.write_str(name)
	}
}
