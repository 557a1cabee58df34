use failure::Fail;

/// Protocol level failures.
///
/// Everything else (mapping the register file, parsing parameters) is
/// reported as plain `failure::Error` with context.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum EepromError {
	/// DO never went HIGH while polling; the write cycle might not have
	/// finished (or not even started).
	#[fail(display = "EEPROM Timeout error - still busy after {} polls", polls)]
	Timeout {
		polls: u32,
	},

	#[fail(display = "address 0x{:x} out of range (device has {} words)", address, words)]
	AddressOutOfRange {
		address: usize,
		words: usize,
	},

	#[fail(display = "{} words don't fit into the device ({} words)", count, words)]
	TooManyWords {
		count: usize,
		words: usize,
	},
}
