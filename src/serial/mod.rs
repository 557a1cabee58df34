/// Protocol for Microchip 93LC46B, a 1-kbit EEPROM (organized as 64 x 16bit)
///
/// Microwire: separate pins for data IN and OUT, a CLOCK driven by us, and a
/// CHIP SELECT framing each instruction.  All values go out MSB first.
///
/// Instructions:
/// - Startbit: "1"
/// - 2-bit Opcode
/// - 6-bit Address
///
/// Some instructions have a DATA phase following (either send or recv) for 16
/// bits.
///
/// Opcodes: (@ address)
/// - 0b11: ERASE at address (set all bits to "1")
/// - 0b00 @ 0b00????: EWDS (erase/write disable), no DATA
/// - 0b00 @ 0b01????: WRAL (write all), DATA
/// - 0b00 @ 0b10????: ERAL (erase all), no DATA
/// - 0b00 @ 0b11????: EWEN (erase/write enable), no DATA
/// - 0b10: READ 16-bits from address, recv DATA (after a dummy "0" bit)
/// - 0b01: WRITE 16-bits to address, send DATA
///
/// After WRITE/ERASE/ERAL/WRAL the chip is BUSY; raising CS again shows the
/// status on DO: LOW while busy, HIGH once ready.

mod command;
mod hardware;
mod low_level;
mod operations;

pub use self::command::{
	Address,
	Command,
	ADDRESS_LIMIT,
	ADDRESS_WIDTH,
	WORD_WIDTH,
};

pub use self::hardware::{
	reliable_sleep,
	Hardware,
	CLOCK_EDGE,
};

pub use self::low_level::{
	LowLevel,
	Readiness,
	Transaction,
};

pub use self::operations::{
	Eeprom,
	ProgrammingEnabled,
	ReadyPolling,
};
