use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::FromRawFd;
use std::path::Path;
use std::ptr;
use std::time::Duration;

use libc::{
	MAP_FAILED,
	MAP_SHARED,
	O_CLOEXEC,
	O_RDWR,
	O_SYNC,
	PROT_READ,
	PROT_WRITE,
	_SC_PAGESIZE,
	c_void,
	mmap,
	munmap,
	open,
	sysconf,
};

use crate::serial::{
	reliable_sleep,
	Hardware,
	CLOCK_EDGE,
};

/// Where the Microwire lines live in an 8-bit control register.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PinMap {
	pub offset: usize,
	pub clock: u8,
	pub chip_select: u8,
	pub data_in: u8,
	pub data_out: u8,
}

impl Default for PinMap {
	// OX16PCI954 local configuration registers (BAR 3): EEPROM control at 0x03
	fn default() -> Self {
		PinMap {
			offset: 3,
			clock: 0x01,
			chip_select: 0x02,
			data_in: 0x04,
			data_out: 0x08,
		}
	}
}

impl PinMap {
	pub fn validate(&self) -> crate::AResult<()> {
		let pins = [
			("clock", self.clock),
			("chip select", self.chip_select),
			("data in", self.data_in),
			("data out", self.data_out),
		];
		for (i, &(name, mask)) in pins.iter().enumerate() {
			ensure!(mask.count_ones() == 1, "{} pin mask 0x{:02x} must have exactly one bit set", name, mask);
			for &(other, other_mask) in pins[..i].iter() {
				ensure!(mask != other_mask, "{} and {} pins both use bit mask 0x{:02x}", other, name, mask);
			}
		}
		Ok(())
	}

	fn pin_bits(&self) -> u8 {
		self.clock | self.chip_select | self.data_in | self.data_out
	}
}

/// Microwire lines as bits of a memory mapped register (PCI resource file,
/// `/dev/gpiomem`, ...).
///
/// Output levels are kept in a shadow byte; every line change writes the
/// whole register.
#[derive(Debug)]
pub struct MappedRegister {
	ptr: ptr::NonNull<u8>,
	len: usize,
	pins: PinMap,
	output: u8,
	edge: Duration,
}

impl Drop for MappedRegister {
	fn drop(&mut self) {
		let res = unsafe {
			munmap(
				self.ptr.as_ptr() as *mut c_void,
				self.len,
			)
		};
		if 0 != res {
			error!("munmap failed: {}", io::Error::last_os_error());
		}
	}
}

impl MappedRegister {
	pub fn open<P: AsRef<Path>>(path: P, pins: PinMap) -> crate::AResult<Self> {
		let path = path.as_ref();
		with_context!(("couldn't map EEPROM control register from {}", path.display()), {
			pins.validate()?;
			let (ptr, len) = map_file(path)?;
			let mut reg = MappedRegister {
				ptr,
				len,
				pins,
				output: 0,
				edge: CLOCK_EDGE,
			};
			ensure!(pins.offset < len, "register offset 0x{:x} beyond mapped size 0x{:x}", pins.offset, len);

			// keep whatever else lives in the register
			reg.output = reg.read_register() & !pins.pin_bits();
			debug!("mapped {} ({} bytes), control register at 0x{:x}: {:02x}", path.display(), len, pins.offset, reg.output);
			Ok(reg)
		})
	}

	/// Settle time after each line change (default: `CLOCK_EDGE`).
	pub fn with_edge_delay(mut self, edge: Duration) -> Self {
		self.edge = edge;
		self
	}

	pub fn len(&self) -> usize {
		self.len
	}

	fn read_register(&self) -> u8 {
		unsafe { ptr::read_volatile(self.ptr.as_ptr().add(self.pins.offset)) }
	}

	fn write_register(&mut self, value: u8) {
		unsafe { ptr::write_volatile(self.ptr.as_ptr().add(self.pins.offset), value) }
	}

	fn drive(&mut self, mask: u8, active: bool) {
		if active {
			self.output |= mask;
		} else {
			self.output &= !mask;
		}
		let output = self.output;
		self.write_register(output);
	}
}

impl Hardware for MappedRegister {
	fn set_clock(&mut self, active: bool) {
		let mask = self.pins.clock;
		self.drive(mask, active);
	}

	fn set_data_in(&mut self, active: bool) {
		let mask = self.pins.data_in;
		self.drive(mask, active);
	}

	fn set_chip_select(&mut self, active: bool) {
		let mask = self.pins.chip_select;
		self.drive(mask, active);
	}

	fn read_data_out(&mut self) -> bool {
		0 != self.read_register() & self.pins.data_out
	}

	fn delay(&mut self) {
		reliable_sleep(self.edge);
	}
}

fn page_size() -> usize {
	let size = unsafe { sysconf(_SC_PAGESIZE) };
	if size <= 0 { 4096 } else { size as usize }
}

// TODO: exclusive open / file locking?
fn map_file(path: &Path) -> io::Result<(ptr::NonNull<u8>, usize)> {
	let c_path = CString::new(path.as_os_str().as_bytes())?;

	let fd = unsafe { open(c_path.as_ptr(), O_RDWR | O_CLOEXEC | O_SYNC) };
	if -1 == fd {
		return Err(io::Error::last_os_error());
	}
	// now get fd managed to prevent resource leak
	let f = unsafe { fs::File::from_raw_fd(fd) };

	// character devices (like /dev/gpiomem) report size 0; map a single page.
	// an empty regular file has nothing to map (accessing it would SIGBUS)
	let meta = f.metadata()?;
	let len = if meta.file_type().is_char_device() {
		page_size()
	} else if 0 == meta.len() {
		return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty file, no register to map"));
	} else {
		meta.len() as usize
	};

	let area = unsafe {
		mmap(
			ptr::null_mut(),
			len,
			PROT_READ | PROT_WRITE,
			MAP_SHARED,
			fd,
			0,
		)
	};
	if area == MAP_FAILED {
		return Err(io::Error::last_os_error());
	}

	match ptr::NonNull::new(area as *mut u8) {
		None => Err(io::Error::new(io::ErrorKind::Other, "mmap returned NULL")),
		Some(area) => Ok((area, len)),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::path::PathBuf;

	fn scratch_file(name: &str, contents: &[u8]) -> PathBuf {
		let path = std::env::temp_dir().join(format!("eeprom-93lc46-{}-{}", std::process::id(), name));
		fs::write(&path, contents).unwrap();
		path
	}

	#[test]
	fn drives_lines_in_register() {
		let path = scratch_file("drive", &[0xf0, 0x00, 0x00, 0x48, 0x00, 0x00, 0x00, 0x00]);
		{
			let mut reg = MappedRegister::open(&path, PinMap::default()).unwrap();
			assert_eq!(reg.len(), 8);
			assert!(reg.read_data_out());

			reg.set_chip_select(true);
			reg.set_clock(true);
			assert_eq!(reg.read_register(), 0x43);
			assert!(!reg.read_data_out());

			reg.set_clock(false);
			reg.set_data_in(true);
			assert_eq!(reg.read_register(), 0x46);
		}
		let contents = fs::read(&path).unwrap();
		fs::remove_file(&path).unwrap();
		assert_eq!(contents[3], 0x46);
		assert_eq!(contents[0], 0xf0);
	}

	#[test]
	fn custom_pin_layout() {
		let path = scratch_file("layout", &[0x00, 0x80]);
		let pins = PinMap {
			offset: 1,
			clock: 0x10,
			chip_select: 0x20,
			data_in: 0x40,
			data_out: 0x80,
		};
		{
			let mut reg = MappedRegister::open(&path, pins).unwrap();
			assert!(reg.read_data_out());
			reg.set_data_in(true);
			reg.set_chip_select(true);
			assert_eq!(reg.read_register(), 0x60);
		}
		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn rejects_bad_pin_maps() {
		let shared = PinMap {
			data_in: 0x01,
			..PinMap::default()
		};
		assert!(shared.validate().is_err());

		let wide = PinMap {
			clock: 0x03,
			..PinMap::default()
		};
		assert!(wide.validate().is_err());

		assert!(PinMap::default().validate().is_ok());
	}

	#[test]
	fn rejects_offset_beyond_file() {
		let path = scratch_file("offset", &[0x00; 4]);
		let pins = PinMap {
			offset: 4,
			..PinMap::default()
		};
		let res = MappedRegister::open(&path, pins);
		fs::remove_file(&path).unwrap();
		assert!(res.is_err());
	}

	#[test]
	fn rejects_empty_file() {
		let path = scratch_file("empty", &[]);
		let res = MappedRegister::open(&path, PinMap::default());
		fs::remove_file(&path).unwrap();
		assert!(res.is_err());
	}

	#[test]
	fn missing_file() {
		assert!(MappedRegister::open("/nonexistent/eeprom-93lc46", PinMap::default()).is_err());
	}
}
