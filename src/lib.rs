#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

macro_rules! with_context {
	(( $fmt:tt $($t:tt)* ), $e:expr) => {{
		use failure::Error;

		match (|| { $e })() {
			Ok(v) => Ok(v),
			Err(e) => {
				let e: Error = e;
				let msg = format!(concat!($fmt, ": {}") $($t)*, e);
				Err(Error::from(e.context(msg)))
			}
		}
	}};

	($msg:expr, $e:expr) => {
		with_context!(("{}", $msg), $e)
	};
}

pub type AResult<T> = Result<T, failure::Error>;

pub mod error;
pub mod gpio;
pub mod serial;
pub mod sim;

pub use self::error::EepromError;
pub use self::serial::{
	Address,
	Eeprom,
	Hardware,
	ReadyPolling,
};

/// Parses decimal or `0x`-prefixed hexadecimal numbers.
pub fn parse_number(s: &str) -> AResult<u32> {
	let s = s.trim();
	let (digits, radix) = if s.starts_with("0x") || s.starts_with("0X") {
		(&s[2..], 16)
	} else {
		(s, 10)
	};
	with_context!(("invalid number {:?}", s), {
		Ok(u32::from_str_radix(digits, radix)?)
	})
}
