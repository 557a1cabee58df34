// Pin backends for `serial::Hardware`. Linux only for now.

mod mmio;

pub use self::mmio::{
	MappedRegister,
	PinMap,
};
