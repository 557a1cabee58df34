use std::thread;
use std::time::{
	Duration,
	Instant,
};

/// Setup/hold time the 93LC46B needs around each clock edge (2 MHz max clock).
pub const CLOCK_EDGE: Duration = Duration::from_nanos(250);

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// The four lines of a Microwire bus plus the settle delay.
///
/// `true` always means "active": clock high, chip select asserted, data line
/// high.  Implementations only move pins; all protocol framing happens on top
/// of this trait.
pub trait Hardware {
	fn set_clock(&mut self, active: bool);
	fn set_data_in(&mut self, active: bool);
	fn set_chip_select(&mut self, active: bool);

	// sample DO (driven by the device)
	fn read_data_out(&mut self) -> bool;

	// delay for (at least) one clock edge
	fn delay(&mut self) {
		reliable_sleep(CLOCK_EDGE);
	}
}

impl<'a, H: ?Sized + Hardware> Hardware for &'a mut H {
	fn set_clock(&mut self, active: bool) {
		H::set_clock(*self, active)
	}
	fn set_data_in(&mut self, active: bool) {
		H::set_data_in(*self, active)
	}
	fn set_chip_select(&mut self, active: bool) {
		H::set_chip_select(*self, active)
	}
	fn read_data_out(&mut self) -> bool {
		H::read_data_out(*self)
	}
	fn delay(&mut self) {
		H::delay(*self)
	}
}
